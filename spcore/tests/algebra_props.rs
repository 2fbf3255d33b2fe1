//! Property-based checks of the component algebra.
//!
//! Three categories:
//! 1. Nullable laws: bottom absorbs addition, is the max identity,
//!    and both operators commute/associate.
//! 2. Component laws: the trivial element is a series identity,
//!    series composition associates, parallel composition commutes.
//! 3. Threshold behavior: a parallel combination's watermark never
//!    grows when the admission threshold does.

use proptest::prelude::*;
use spcore::nullable::Nullable;
use spcore::{SpComponent, SpEdgeData};

fn any_nullable() -> impl Strategy<Value = Nullable> {
    prop_oneof![
        1 => Just(Nullable::NONE),
        4 => (-1_000i64..1_000).prop_map(Nullable::from),
    ]
}

fn edge(mem: i64, headroom: i64) -> SpComponent {
    SpComponent::from_edge(&SpEdgeData {
        mem_allocated: mem,
        max_mem_allocated: 0.max(mem) + headroom,
        ..Default::default()
    })
}

/// A component folded from a handful of edges with a random mix of
/// series and parallel steps.
fn any_component() -> impl Strategy<Value = SpComponent> {
    (
        (-100i64..100, 0i64..100),
        prop::collection::vec(((-100i64..100, 0i64..100), any::<bool>(), 0i64..80), 0..4),
    )
        .prop_map(|((mem, headroom), rest)| {
            let mut acc = edge(mem, headroom);
            for ((mem, headroom), series, threshold) in rest {
                let next = edge(mem, headroom);
                if series {
                    acc.combine_series(&next);
                } else {
                    acc.combine_parallel(&next, threshold);
                }
            }
            acc
        })
}

proptest! {
    #[test]
    fn add_commutes(a in any_nullable(), b in any_nullable()) {
        prop_assert_eq!(a + b, b + a);
    }

    #[test]
    fn add_associates(a in any_nullable(), b in any_nullable(), c in any_nullable()) {
        prop_assert_eq!((a + b) + c, a + (b + c));
    }

    #[test]
    fn max_commutes(a in any_nullable(), b in any_nullable()) {
        prop_assert_eq!(a.max(b), b.max(a));
    }

    #[test]
    fn max_associates(a in any_nullable(), b in any_nullable(), c in any_nullable()) {
        prop_assert_eq!(a.max(b).max(c), a.max(b.max(c)));
    }

    #[test]
    fn bottom_laws(a in any_nullable()) {
        prop_assert_eq!(Nullable::NONE + a, Nullable::NONE);
        prop_assert_eq!(Nullable::NONE.max(a), a);
    }

    #[test]
    fn trivial_is_a_series_identity(c in any_component()) {
        let mut combined = c.clone();
        combined.combine_series(&SpComponent::identity());
        prop_assert_eq!(combined.mem_total, c.mem_total);
        prop_assert_eq!(combined.max_single, c.max_single);
        prop_assert_eq!(combined.multi_robust, c.multi_robust);

        let mut flipped = SpComponent::identity();
        flipped.combine_series(&c);
        prop_assert_eq!(flipped.mem_total, c.mem_total);
        prop_assert_eq!(flipped.max_single, c.max_single);
        prop_assert_eq!(flipped.multi_robust, c.multi_robust);
    }

    #[test]
    fn series_associates(
        a in any_component(),
        b in any_component(),
        c in any_component(),
    ) {
        let mut left = a.clone();
        left.combine_series(&b);
        left.combine_series(&c);

        let mut bc = b.clone();
        bc.combine_series(&c);
        let mut right = a.clone();
        right.combine_series(&bc);

        prop_assert_eq!(left.mem_total, right.mem_total);
        prop_assert_eq!(left.max_single, right.max_single);
        prop_assert_eq!(left.multi_robust, right.multi_robust);
    }

    #[test]
    fn parallel_commutes(
        a in any_component(),
        b in any_component(),
        threshold in 0i64..200,
    ) {
        let mut left = a.clone();
        left.combine_parallel(&b, threshold);
        let mut right = b.clone();
        right.combine_parallel(&a, threshold);

        prop_assert_eq!(left.mem_total, right.mem_total);
        prop_assert_eq!(left.max_single, right.max_single);
        prop_assert_eq!(left.multi_robust, right.multi_robust);
    }

    #[test]
    fn parallel_watermark_is_monotone_in_the_threshold(
        a in any_component(),
        b in any_component(),
    ) {
        let mut last = i64::MAX;
        for threshold in [0, 10, 50, 100, 400, 10_000] {
            let mut combined = a.clone();
            combined.combine_parallel(&b, threshold);
            let w = combined.get_watermark();
            prop_assert!(w <= last, "watermark grew to {} at threshold {}", w, threshold);
            last = w;
        }
    }

    /// For p = 1 the array algebra tracks the scalar one through
    /// any series/parallel mix.
    #[test]
    fn p1_arrays_track_the_scalar_algebra(
        (m1, h1) in (-100i64..100, 0i64..100),
        (m2, h2) in (-100i64..100, 0i64..100),
        series in any::<bool>(),
    ) {
        use spcore::{NaiveCtx, SpNaiveComponent};

        let e1 = SpEdgeData { mem_allocated: m1, max_mem_allocated: 0.max(m1) + h1, ..Default::default() };
        let e2 = SpEdgeData { mem_allocated: m2, max_mem_allocated: 0.max(m2) + h2, ..Default::default() };

        let mut scalar = SpComponent::from_edge(&e1);
        let mut ctx = NaiveCtx::new(1);
        let mut arrays = SpNaiveComponent::from_edge(&e1, &mut ctx);
        let other = SpNaiveComponent::from_edge(&e2, &mut ctx);
        if series {
            scalar.combine_series(&SpComponent::from_edge(&e2));
            arrays.combine_series(other, &mut ctx);
            // A series step re-derives r[0] from the true running
            // total.
            prop_assert_eq!(arrays.r[0], Nullable::from(0.max(scalar.mem_total)));
        } else {
            scalar.combine_parallel(&SpComponent::from_edge(&e2), i64::MAX);
            arrays.combine_parallel(other, &mut ctx);
            // A bare parallel step sums the two clamped totals
            // instead; the next series step collapses it again.
            prop_assert_eq!(arrays.r[0], Nullable::from(0.max(m1) + 0.max(m2)));
        }

        prop_assert_eq!(arrays.mem_total, scalar.mem_total);
        prop_assert_eq!(arrays.r[1], Nullable::from(scalar.max_single));
    }
}
