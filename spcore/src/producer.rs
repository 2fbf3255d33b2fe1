//! Sequential readers over the trace streams.
//!
//! Each producer hands out trace elements in exactly the order the
//! writer appended them, blocking while the writer is still ahead.
//! Consumption is single-pass: a returned element is never
//! revisited, which is what lets its storage go straight back to
//! the queue.

use crate::full::FullSpEdge;
use crate::helpe::*;
use crate::stream::TraceStream;

/// Reader over the full-graph edge stream.
pub struct FullEdgeProducer {
    stream: Arc<TraceStream<FullSpEdge>>,
    poll:   Duration,
}

impl FullEdgeProducer {
    pub fn new(stream: Arc<TraceStream<FullSpEdge>>, poll: Duration) -> Self {
        Self { stream, poll }
    }

    /// The next edge, or `None` once the trace is complete and
    /// drained.
    pub fn next(&mut self) -> Option<FullSpEdge> {
        self.stream.next_blocking(self.poll)
    }

    /// The next edge's payload; the trace must still have one.
    pub fn next_data(&mut self) -> SpEdgeData {
        self.next()
            .expect("edge stream ended inside an open region")
            .data
    }

    pub fn is_complete(&self) -> bool {
        self.stream.is_finished()
    }
}

/// Reader over the barebone edge-data stream.
pub struct BareboneEdgeProducer {
    stream: Arc<TraceStream<SpEdgeData>>,
    poll:   Duration,
}

impl BareboneEdgeProducer {
    pub fn new(stream: Arc<TraceStream<SpEdgeData>>, poll: Duration) -> Self {
        Self { stream, poll }
    }

    pub fn next(&mut self) -> Option<SpEdgeData> {
        self.stream.next_blocking(self.poll)
    }

    pub fn next_data(&mut self) -> SpEdgeData {
        self.next().expect("edge stream ended inside an open region")
    }

    pub fn is_complete(&self) -> bool {
        self.stream.is_finished()
    }
}

/// Reader over the barebone event stream. Stays in lockstep with
/// the edge producer by construction: the writer appends exactly
/// one event per edge, and the aggregators consume them pairwise.
pub struct SpEventProducer {
    stream: Arc<TraceStream<SpEvent>>,
    poll:   Duration,
    ahead:  Option<SpEvent>,
}

impl SpEventProducer {
    pub fn new(stream: Arc<TraceStream<SpEvent>>, poll: Duration) -> Self {
        Self {
            stream,
            poll,
            ahead: None,
        }
    }

    /// The next event. The caller must know one is owed (the SP
    /// grammar guarantees it); running dry here means the trace is
    /// malformed.
    pub fn next(&mut self) -> SpEvent {
        if let Some(ev) = self.ahead.take() {
            return ev;
        }
        self.stream
            .next_blocking(self.poll)
            .expect("event stream ended inside an open region")
    }

    /// Whether another event exists. Blocks until that is decided,
    /// buffering any event it had to pull forward.
    pub fn has_next(&mut self) -> bool {
        if self.ahead.is_some() {
            return true;
        }
        match self.stream.next_blocking(self.poll) {
            Some(ev) => {
                self.ahead = Some(ev);
                true
            }
            None => false,
        }
    }

    /// Releases the lookahead slot. The queue recycles everything
    /// else on its own.
    pub fn free_last(&mut self) {
        self.ahead = None;
    }
}
