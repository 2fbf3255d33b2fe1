//! The writer/reader handoff.
//!
//! Exactly two actors ever touch a trace: the instrumented
//! program's hook path appends (strictly sequentially, even though
//! the program itself is parallel), and one background aggregation
//! thread consumes, single-pass, in append order. A lock-free
//! segment queue carries the elements; consumed storage is recycled
//! by the queue's own segment reuse, so the writer's hot path never
//! takes a lock and never frees what the reader might still see.

use crate::helpe::*;

pub struct TraceStream<T> {
    queue:  SegQueue<T>,
    done:   AtomicBool,
}

impl<T> TraceStream<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queue: SegQueue::new(),
            done:  AtomicBool::new(false),
        })
    }

    /// Writer side. Elements become visible to the reader in push
    /// order.
    #[inline(always)]
    pub fn push(&self, value: T) {
        self.queue.push(value);
    }

    /// Writer side: nothing will ever be pushed again. Published
    /// with release ordering so a reader that observes it also
    /// observes every prior push.
    pub fn finish(&self) {
        self.done.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Reader side: the next element in append order, or `None`
    /// once the writer has finished *and* everything is drained.
    /// Blocks with a capped poll sleep otherwise; the reader trades
    /// a little CPU for never contending with the writer.
    pub fn next_blocking(&self, poll: Duration) -> Option<T> {
        loop {
            if let Some(v) = self.queue.pop() {
                return Some(v);
            }
            if self.is_finished() {
                // The writer may have pushed between our pop and
                // the flag load; one more pop settles it.
                return self.queue.pop();
            }
            thread::sleep(poll);
        }
    }
}
