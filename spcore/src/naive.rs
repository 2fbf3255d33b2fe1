//! The p-processor generalization of the component algebra.
//!
//! Every scalar of [`SpComponent`] becomes an array indexed by "how
//! many processors are assumed busy inside this sub-trace", 0..=p.
//! Series composition offsets elementwise; parallel composition is
//! a max-plus convolution ("the best split of i processors between
//! the two sides"). `max_pos` tracks the highest defined index so
//! the convolution can skip pairs that are bottom by construction —
//! an optimization only, the result equals the unrestricted
//! convolution.

use crate::helpe::*;

/// A free-list of `p + 1`-sized Nullable arrays. Components churn
/// through thousands of short-lived arrays during aggregation, so
/// they are taken from and given back to this pool instead of the
/// global allocator. Exhaustion just grows the pool.
#[derive(Debug, Default)]
pub struct ArrayPool {
    free:   Vec<Box<[Nullable]>>,
    width:  usize,
}

impl ArrayPool {
    pub fn new(width: usize) -> Self {
        Self { free: vec![], width }
    }

    pub fn take(&mut self) -> Box<[Nullable]> {
        match self.free.pop() {
            Some(mut arr) => {
                arr.fill(Nullable::NONE);
                arr
            }
            None => vec![Nullable::NONE; self.width].into_boxed_slice(),
        }
    }

    pub fn reclaim(&mut self, arr: Box<[Nullable]>) {
        debug_assert_eq!(arr.len(), self.width);
        self.free.push(arr);
    }
}

/// Everything the p-processor aggregation threads around: the
/// processor count and the array pool.
#[derive(Debug)]
pub struct NaiveCtx {
    pub p:  usize,
    pool:   ArrayPool,
}

impl NaiveCtx {
    pub fn new(p: usize) -> Self {
        assert!(p >= 1, "the processor count must be at least 1");
        Self {
            p,
            pool: ArrayPool::new(p + 1),
        }
    }
}

/// `r[i]` is the best known high-water-mark bound when at most `i`
/// of the `p` processors are simultaneously busy in this sub-trace.
/// `r[0]` is the committed total, clamped at zero. Entries are
/// defined densely up to `max_pos` and bottom beyond it.
#[derive(Debug)]
pub struct SpNaiveComponent {
    pub r:          Box<[Nullable]>,
    pub max_pos:    usize,
    pub p:          usize,
    pub mem_total:  i64,
    pub trivial:    bool,
}

impl SpNaiveComponent {
    pub fn identity(ctx: &mut NaiveCtx) -> Self {
        let mut r = ctx.pool.take();
        r[0] = Nullable::from(0);
        Self {
            r,
            max_pos:    0,
            p:          ctx.p,
            mem_total:  0,
            trivial:    true,
        }
    }

    pub fn from_edge(edge: &SpEdgeData, ctx: &mut NaiveCtx) -> Self {
        let mut r = ctx.pool.take();
        r[0] = Nullable::from(0.max(edge.mem_allocated));
        r[1] = Nullable::from(edge.max_mem_allocated);
        Self {
            r,
            max_pos:    1,
            p:          ctx.p,
            mem_total:  edge.mem_allocated,
            trivial:    edge.is_trivial(),
        }
    }

    /// Self happens, then `other`, on one strand: `other`'s bounds
    /// are offset by the total self had already committed.
    pub fn combine_series(&mut self, other: SpNaiveComponent, ctx: &mut NaiveCtx) {
        debug_assert_eq!(self.p, other.p);
        let committed = self.mem_total;
        let reach = self.max_pos.max(other.max_pos);

        self.r[0] = Nullable::from(0.max(committed + other.mem_total));
        for i in 1..=reach {
            self.r[i] = self.r[i].max(other.r[i] + committed);
        }
        self.max_pos = reach;
        self.mem_total += other.mem_total;
        self.trivial = self.trivial && other.trivial;
        ctx.pool.reclaim(other.r);
    }

    /// The two sides run concurrently: a discrete max-plus
    /// convolution over every way of splitting the busy processors.
    pub fn combine_parallel(&mut self, other: SpNaiveComponent, ctx: &mut NaiveCtx) {
        debug_assert_eq!(self.p, other.p);
        let reach = self.p.min(self.max_pos + other.max_pos);
        let mut out = ctx.pool.take();

        for i in 0..=reach {
            let lo = i.saturating_sub(other.max_pos);
            let hi = i.min(self.max_pos);
            for j in lo..=hi {
                out[i] = out[i].max(self.r[j] + other.r[i - j]);
            }
        }

        let old = std::mem::replace(&mut self.r, out);
        ctx.pool.reclaim(old);
        ctx.pool.reclaim(other.r);
        self.max_pos = reach;
        self.mem_total += other.mem_total;
        self.trivial = self.trivial && other.trivial;
    }

    /// The bound under at most `watermark_p` busy processors.
    pub fn get_watermark(&self, watermark_p: usize) -> i64 {
        let mut best = Nullable::NONE;
        for i in 0..=watermark_p.min(self.p) {
            best = best.max(self.r[i]);
        }
        best.value().expect("a component always defines r[0]")
    }

    pub fn release(self, ctx: &mut NaiveCtx) {
        ctx.pool.reclaim(self.r);
    }
}

/// The multispawn accumulator, arrays throughout. `partial` is the
/// running fold of the spine seen so far (spine offsets plus the
/// convolutions of every spawn branch passed); each continuation
/// snapshots `partial ⊗ continuation` into `ignore_end`, each spawn
/// branch snapshots `partial ⊗ branch` into `suspend_end`, which
/// then keeps absorbing the region's later totals.
#[derive(Debug)]
pub struct SpNaiveMultispawnComponent {
    pub partial:        Box<[Nullable]>,
    pub suspend_end:    Box<[Nullable]>,
    pub ignore_end:     Box<[Nullable]>,
    pub max_pos:        usize,
    pub p:              usize,
    pub mem_total:      i64,
}

fn convolve(
    a: &[Nullable],
    a_reach: usize,
    b: &[Nullable],
    b_reach: usize,
    p: usize,
    out: &mut [Nullable],
) -> usize {
    let reach = p.min(a_reach + b_reach);
    for i in 0..=reach {
        let lo = i.saturating_sub(b_reach);
        let hi = i.min(a_reach);
        for j in lo..=hi {
            out[i] = out[i].max(a[j] + b[i - j]);
        }
    }
    reach
}

impl SpNaiveMultispawnComponent {
    pub fn new(ctx: &mut NaiveCtx) -> Self {
        let mut partial = ctx.pool.take();
        partial[0] = Nullable::from(0);
        Self {
            partial,
            suspend_end:    ctx.pool.take(),
            ignore_end:     ctx.pool.take(),
            max_pos:        0,
            p:              ctx.p,
            mem_total:      0,
        }
    }

    pub fn increment_on_continuation(
        &mut self,
        continuation: SpNaiveComponent,
        ctx: &mut NaiveCtx,
    ) {
        let mut snapshot = ctx.pool.take();
        let reach = convolve(
            &self.partial,
            self.max_pos,
            &continuation.r,
            continuation.max_pos,
            self.p,
            &mut snapshot,
        );
        for i in 0..=reach {
            self.ignore_end[i] = self.ignore_end[i].max(snapshot[i]);
        }
        ctx.pool.reclaim(snapshot);

        for slot in self.suspend_end.iter_mut() {
            *slot = *slot + continuation.mem_total;
        }
        for slot in self.partial.iter_mut() {
            *slot = *slot + continuation.mem_total;
        }
        self.partial[0] = self.partial[0].max(Nullable::from(0));
        self.mem_total += continuation.mem_total;
        ctx.pool.reclaim(continuation.r);
    }

    pub fn increment_on_spawn(&mut self, spawn: SpNaiveComponent, ctx: &mut NaiveCtx) {
        let mut folded = ctx.pool.take();
        let reach = convolve(
            &self.partial,
            self.max_pos,
            &spawn.r,
            spawn.max_pos,
            self.p,
            &mut folded,
        );

        for i in 0..self.suspend_end.len() {
            self.suspend_end[i] = (self.suspend_end[i] + spawn.mem_total).max(folded[i]);
        }

        let old = std::mem::replace(&mut self.partial, folded);
        ctx.pool.reclaim(old);
        self.max_pos = reach;
        self.mem_total += spawn.mem_total;
        ctx.pool.reclaim(spawn.r);
    }

    pub fn to_component(self, ctx: &mut NaiveCtx) -> SpNaiveComponent {
        let mut r = ctx.pool.take();
        let mut max_pos = 0;
        for i in 0..r.len() {
            r[i] = self.suspend_end[i].max(self.ignore_end[i]);
            if r[i].has_value() {
                max_pos = i;
            }
        }
        assert!(
            r[0].has_value(),
            "multispawn accumulator collapsed before any continuation"
        );
        ctx.pool.reclaim(self.partial);
        ctx.pool.reclaim(self.suspend_end);
        ctx.pool.reclaim(self.ignore_end);
        SpNaiveComponent {
            r,
            max_pos,
            p:          self.p,
            mem_total:  self.mem_total,
            trivial:    false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(delta: i64, peak: i64) -> SpEdgeData {
        SpEdgeData {
            mem_allocated: delta,
            max_mem_allocated: peak,
            ..Default::default()
        }
    }

    /// For p = 1 the array algebra must collapse onto the scalar
    /// one: r[0] is the clamped total, r[1] is maxSingle.
    #[test]
    fn p1_matches_the_scalar_algebra() {
        let mut ctx = NaiveCtx::new(1);

        let mut scalar = SpComponent::from_edge(&edge(100, 150));
        scalar.combine_series(&SpComponent::from_edge(&edge(-50, 20)));
        let mut arr = SpNaiveComponent::from_edge(&edge(100, 150), &mut ctx);
        arr.combine_series(SpNaiveComponent::from_edge(&edge(-50, 20), &mut ctx), &mut ctx);
        assert_eq!(arr.r[0], Nullable::from(0.max(scalar.mem_total)));
        assert_eq!(arr.r[1], Nullable::from(scalar.max_single));
        assert_eq!(arr.get_watermark(1), scalar.max_single.max(0));

        let mut scalar = SpComponent::from_edge(&edge(200, 200));
        scalar.combine_parallel(&SpComponent::from_edge(&edge(300, 300)), i64::MAX);
        let mut arr = SpNaiveComponent::from_edge(&edge(200, 200), &mut ctx);
        arr.combine_parallel(SpNaiveComponent::from_edge(&edge(300, 300), &mut ctx), &mut ctx);
        assert_eq!(arr.r[1], Nullable::from(scalar.max_single));
        assert_eq!(arr.get_watermark(1), 500);
    }

    #[test]
    fn parallel_convolution_at_p2() {
        let mut ctx = NaiveCtx::new(2);
        // One side allocates 40 and frees it all; with a second
        // processor its peak can coincide with the sibling's.
        let mut a = SpNaiveComponent::from_edge(&edge(0, 40), &mut ctx);
        a.combine_parallel(SpNaiveComponent::from_edge(&edge(20, 20), &mut ctx), &mut ctx);
        assert_eq!(a.r[0], Nullable::from(20));
        assert_eq!(a.r[1], Nullable::from(60));
        assert_eq!(a.r[2], Nullable::from(60));
        assert_eq!(a.max_pos, 2);
        assert_eq!(a.get_watermark(1), 60);
        assert_eq!(a.get_watermark(2), 60);
    }

    #[test]
    fn series_keeps_arrays_dense() {
        let mut ctx = NaiveCtx::new(3);
        let mut a = SpNaiveComponent::from_edge(&edge(10, 10), &mut ctx);
        let mut par = SpNaiveComponent::from_edge(&edge(5, 5), &mut ctx);
        par.combine_parallel(SpNaiveComponent::from_edge(&edge(7, 7), &mut ctx), &mut ctx);
        a.combine_series(par, &mut ctx);
        assert_eq!(a.max_pos, 2);
        for i in 0..=a.max_pos {
            assert!(a.r[i].has_value());
        }
        assert_eq!(a.r[3], Nullable::NONE);
        assert_eq!(a.mem_total, 22);
    }

    /// The accumulator must agree with the explicitly nested
    /// convolution fold on an alternating spawn/continuation run.
    #[test]
    fn naive_multispawn_matches_nested_fold() {
        let mut ctx = NaiveCtx::new(2);

        // binary: series(c0, par(s1, series(c1, par(s2, c2))))
        let mut inner = SpNaiveComponent::from_edge(&edge(7, 9), &mut ctx);
        inner.combine_parallel(SpNaiveComponent::from_edge(&edge(2, 2), &mut ctx), &mut ctx);
        let mut mid = SpNaiveComponent::from_edge(&edge(3, 4), &mut ctx);
        mid.combine_series(inner, &mut ctx);
        let mut outer = SpNaiveComponent::from_edge(&edge(10, 12), &mut ctx);
        outer.combine_parallel(mid, &mut ctx);
        let mut binary = SpNaiveComponent::from_edge(&edge(5, 5), &mut ctx);
        binary.combine_series(outer, &mut ctx);

        let mut ms = SpNaiveMultispawnComponent::new(&mut ctx);
        ms.increment_on_continuation(SpNaiveComponent::from_edge(&edge(5, 5), &mut ctx), &mut ctx);
        ms.increment_on_spawn(SpNaiveComponent::from_edge(&edge(10, 12), &mut ctx), &mut ctx);
        ms.increment_on_continuation(SpNaiveComponent::from_edge(&edge(3, 4), &mut ctx), &mut ctx);
        ms.increment_on_spawn(SpNaiveComponent::from_edge(&edge(7, 9), &mut ctx), &mut ctx);
        ms.increment_on_continuation(SpNaiveComponent::from_edge(&edge(2, 2), &mut ctx), &mut ctx);
        let folded = ms.to_component(&mut ctx);

        assert_eq!(folded.mem_total, binary.mem_total);
        for i in 0..=2 {
            assert_eq!(folded.r[i], binary.r[i], "index {i} diverged");
        }
    }
}
