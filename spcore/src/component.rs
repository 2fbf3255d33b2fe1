use crate::helpe::*;

/// Gates a strand peak at the admission threshold: peaks that never
/// cross it cannot act as a second concurrent contributor.
#[inline(always)]
fn bar(peak: i64, threshold: i64) -> Nullable {
    if peak > threshold {
        Nullable::from(peak)
    } else {
        Nullable::NONE
    }
}

impl SpComponent {
    /// The zero-effect element. Combining with it changes nothing.
    pub fn identity() -> Self {
        Self {
            mem_total:      0,
            max_single:     0,
            multi_robust:   Nullable::NONE,
            trivial:        true,
        }
    }

    pub fn from_edge(edge: &SpEdgeData) -> Self {
        Self {
            mem_total:      edge.mem_allocated,
            max_single:     edge.max_mem_allocated,
            multi_robust:   Nullable::NONE,
            trivial:        edge.is_trivial(),
        }
    }

    /// Self happens, then `other` happens, on the same strand.
    ///
    /// `other`'s peak and robust bound are offset by the total self
    /// had already committed when `other` started, i.e. by the
    /// *pre-combination* total.
    pub fn combine_series(&mut self, other: &SpComponent) {
        if self.trivial && other.trivial {
            return;
        }

        let committed = self.mem_total;
        self.max_single = self.max_single.max(committed + other.max_single);
        self.multi_robust = self.multi_robust.max(other.multi_robust + committed);
        self.mem_total += other.mem_total;
        self.trivial = self.trivial && other.trivial;
    }

    /// Self and `other` run concurrently and meet at a join point.
    ///
    /// The serial peak takes whichever side's own peak survives the
    /// other side's net contribution; a concurrent sibling can add
    /// memory but never remove any from the attacker's point of
    /// view, hence the clamps at zero. The robust bound pairs the
    /// two peaks once both cross the threshold; a side that stays
    /// below it is folded through the opposite side's robust/total
    /// path instead.
    pub fn combine_parallel(&mut self, other: &SpComponent, threshold: i64) {
        let t1 = self.mem_total;
        let t2 = other.mem_total;
        let c1 = bar(self.max_single, threshold);
        let c2 = bar(other.max_single, threshold);

        self.max_single = (self.max_single + 0.max(t2)).max(other.max_single + 0.max(t1));
        self.multi_robust = (c1 + c2)
            .max(
                c1.max(self.multi_robust)
                    .max(Nullable::from(t1))
                    .max(Nullable::from(0))
                    + other.multi_robust,
            )
            .max(
                c2.max(other.multi_robust)
                    .max(Nullable::from(t2))
                    .max(Nullable::from(0))
                    + self.multi_robust,
            );
        self.mem_total = t1 + t2;
        self.trivial = self.trivial && other.trivial;
    }

    /// The final answer for this sub-trace: the worst of the serial
    /// peak and the robust multi-strand bound, never below zero.
    pub fn get_watermark(&self) -> i64 {
        let w = Nullable::from(self.max_single)
            .max(self.multi_robust)
            .max(Nullable::from(0));
        debug_assert!(w.has_value());
        w.value().unwrap_or(0)
    }

    pub fn print(&self) {
        println!(
            "Component - memTotal: {}, maxSingle: {}, multiRobust: {:?}",
            self.mem_total, self.max_single, self.multi_robust.value()
        );
    }
}

impl SpMultispawnComponent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extends the spine by one continuation strand.
    ///
    /// The strand's own peak lands at the current spine offset and
    /// is final from here on. Every quantity that was left hanging
    /// by an earlier spawn (suspended peaks, the open robust
    /// obligation, the suspend-end robust family) absorbs the
    /// strand's net total instead.
    pub fn increment_on_continuation(&mut self, continuation: &SpComponent, threshold: i64) {
        let open = self.robust_unfinished + self.robust_unfinished_tail;

        self.single_ignore_end = self
            .single_ignore_end
            .max(Nullable::from(self.empty_tail + continuation.max_single));
        self.single_suspend_end = self.single_suspend_end + continuation.mem_total;

        // A continuation peak can close an obligation opened by an
        // earlier spawn, and the continuation's own robust bound
        // enters either at the plain spine offset or on top of that
        // open obligation.
        self.multi_robust_ignore_end = self
            .multi_robust_ignore_end
            .max(open + bar(continuation.max_single, threshold))
            .max(continuation.multi_robust + self.empty_tail)
            .max(open + continuation.multi_robust);
        self.multi_robust_suspend_end =
            self.multi_robust_suspend_end + continuation.mem_total;

        if self.robust_unfinished.has_value() {
            self.robust_unfinished_tail += continuation.mem_total;
        }
        self.empty_tail += continuation.mem_total;
        self.running_mem_total += continuation.mem_total;
    }

    /// Folds in one spawn branch.
    ///
    /// The branch's peak may be charged right away (it is a valid
    /// serial peak at the current offset) or held suspended until
    /// the region ends, which is what `single_suspend_end` tracks.
    /// If the gated peak beats the obligation currently open, it is
    /// promoted into `robust_unfinished` and the tail restarts;
    /// otherwise the branch merely extends the tail.
    pub fn increment_on_spawn(&mut self, spawn: &SpComponent, threshold: i64) {
        let open = self.robust_unfinished + self.robust_unfinished_tail;
        let at_offset = Nullable::from(self.empty_tail + spawn.max_single);

        self.single_ignore_end = self.single_ignore_end.max(at_offset);
        self.single_suspend_end = (self.single_suspend_end + spawn.mem_total).max(at_offset);

        // Pairing a spawn peak with an earlier obligation keeps
        // absorbing the region's totals until the join, so it lives
        // in the suspend-end family together with the branch's own
        // robust bound.
        self.multi_robust_suspend_end = (self.multi_robust_suspend_end + spawn.mem_total)
            .max(spawn.multi_robust + self.empty_tail)
            .max(open + spawn.multi_robust)
            .max(open + bar(spawn.max_single, threshold));

        let candidate = bar(spawn.max_single, threshold) + self.empty_tail;
        if candidate.exceeds(open) {
            self.robust_unfinished = candidate;
            self.robust_unfinished_tail = 0;
        } else if self.robust_unfinished.has_value() {
            self.robust_unfinished_tail += spawn.mem_total;
        }

        self.empty_tail += spawn.mem_total.max(0);
        self.running_mem_total += spawn.mem_total;
    }

    /// Collapses the accumulator. Panics if no continuation was
    /// ever folded in: a multispawn region without a spine is not a
    /// region.
    pub fn to_component(&self) -> SpComponent {
        let max_single = self
            .single_ignore_end
            .max(self.single_suspend_end)
            .value()
            .expect("multispawn accumulator collapsed before any continuation");
        SpComponent {
            mem_total:      self.running_mem_total,
            max_single,
            multi_robust:   self
                .multi_robust_suspend_end
                .max(self.multi_robust_ignore_end),
            trivial:        false,
        }
    }

    pub fn print(&self) {
        println!(
            "Multispawn - running: {}, singles: {:?}/{:?}, robust: {:?}/{:?}, open: {:?}+{}",
            self.running_mem_total,
            self.single_ignore_end.value(),
            self.single_suspend_end.value(),
            self.multi_robust_ignore_end.value(),
            self.multi_robust_suspend_end.value(),
            self.robust_unfinished.value(),
            self.robust_unfinished_tail,
        );
    }
}
