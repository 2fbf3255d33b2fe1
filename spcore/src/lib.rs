//! Welcome to `spcore`!

mod component;
mod naive;

pub mod barebone;
pub mod context;
pub mod dot;
pub mod full;
pub mod helpe;
pub mod nullable;
pub mod producer;
pub mod stream;

pub use crate::helpe::*;
pub use crate::naive::{ArrayPool, NaiveCtx, SpNaiveComponent, SpNaiveMultispawnComponent};

/// The memory activity observed on a single *strand*, that is,
/// between two consecutive spawn/sync events on one control-flow
/// path of the traced program.
///
/// 1. [`mem_allocated`](SpEdgeData::mem_allocated) is the *net* byte
///    delta over the strand. It can be negative: a strand may free
///    more than it allocates.
/// 2. [`max_mem_allocated`](SpEdgeData::max_mem_allocated) is the
///    running peak of that delta, measured from the strand's start.
///    It is never below zero (before the first allocation the
///    running sum is zero).
///
/// > ***ATTENTION:*** the peak is *relative* to the strand start.
/// > Whoever folds an [`SpEdgeData`] into a larger summary is
/// > responsible for offsetting it by whatever memory was already
/// > committed when the strand began. The combinators in
/// > [`SpComponent`] do exactly that.
///
/// The remaining fields are diagnostics: the biggest single
/// allocation seen on the strand, and an optional per-call-site
/// attribution of the net delta, kept in insertion order so that
/// dumps are reproducible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpEdgeData {
    pub mem_allocated:      i64,
    pub max_mem_allocated:  i64,
    pub biggest_allocation: u64,
    pub attribution:        Option<IndexMap<String, i64>>,
}

/// The algebraic summary of a sub-trace under single-processor
/// semantics. This is the value the whole engine exists to compute.
///
/// - [`mem_total`](SpComponent::mem_total): net byte delta of the
///   sub-trace.
/// - [`max_single`](SpComponent::max_single): worst peak over any
///   serial execution of the sub-trace.
/// - [`multi_robust`](SpComponent::multi_robust): a bound that stays
///   valid when this sub-trace runs next to a concurrent sibling
///   which may itself be split in two. Bottom until some strand's
///   peak crosses the admission threshold.
/// - [`trivial`](SpComponent::trivial): marks an all-zero identity,
///   so chains of empty strands short-circuit.
///
/// Components are only ever built from a single edge, or by the
/// series/parallel combinators in `component.rs`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpComponent {
    pub mem_total:      i64,
    pub max_single:     i64,
    pub multi_robust:   Nullable,
    pub trivial:        bool,
}

/// Accumulator for folding a whole multispawn region (a spine of
/// continuation strands with any number of spawn branches hanging
/// off it, all meeting at one join point) into a single
/// [`SpComponent`] without materializing the nested binary tree.
///
/// Must be fed strictly alternatingly: the incoming strand via
/// `increment_on_continuation`, then spawn branch / continuation /
/// spawn branch / ... until the continuation that reaches the join
/// point. Collapse with `to_component`.
#[derive(Debug, Clone, Default)]
pub struct SpMultispawnComponent {
    pub multi_robust_suspend_end:   Nullable,
    pub multi_robust_ignore_end:    Nullable,
    pub single_suspend_end:         Nullable,
    pub single_ignore_end:          Nullable,
    pub robust_unfinished:          Nullable,
    pub robust_unfinished_tail:     i64,
    pub running_mem_total:          i64,
    pub empty_tail:                 i64,
}

impl SpEdgeData {
    /// `true` if the strand saw no memory activity at all.
    #[inline(always)]
    pub fn is_trivial(&self) -> bool {
        self.mem_allocated == 0 && self.max_mem_allocated == 0
    }

    /// Folds one allocation into the strand. `site`, when known,
    /// feeds the attribution map.
    pub fn record_alloc(&mut self, size: u64, site: Option<&str>) {
        self.mem_allocated += size as i64;
        if self.mem_allocated > self.max_mem_allocated {
            self.max_mem_allocated = self.mem_allocated;
        }
        if size > self.biggest_allocation {
            self.biggest_allocation = size;
        }
        if let Some(name) = site {
            let map = self.attribution.get_or_insert_with(IndexMap::new);
            *map.entry(name.to_string()).or_insert(0) += size as i64;
        }
    }

    /// Folds one deallocation into the strand.
    pub fn record_free(&mut self, size: u64) {
        self.mem_allocated -= size as i64;
    }
}
