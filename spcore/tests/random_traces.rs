//! Round-trip checks over randomly generated, well-formed fork-join
//! traces: both encodings must reconstruct the same series-parallel
//! structure, and the p = 1 array algebra must collapse onto the
//! scalar one. Seeded, so failures reproduce.

mod common;

use common::{run_barebone, run_barebone_naive, run_full, run_full_naive, Op};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use spcore::nullable::Nullable;

fn edge(rng: &mut StdRng) -> (i64, i64) {
    let mem = rng.gen_range(-20..=50);
    let peak = 0.max(mem) + rng.gen_range(0..=30);
    (mem, peak)
}

/// One task body: a run of sibling spawns sharing a region, each
/// child possibly spawning again, with the occasional region opened
/// one call level deeper on the spine.
fn gen_task(rng: &mut StdRng, depth: usize, next_region: &mut usize, ops: &mut Vec<Op>) {
    let region = *next_region;
    *next_region += 1;

    let siblings = rng.gen_range(1..=3);
    for _ in 0..siblings {
        let (mem, peak) = edge(rng);
        ops.push(Op::Spawn(region, mem, peak));

        // The spawned child may fork again before it exits.
        if depth < 3 && rng.gen_bool(0.4) {
            gen_task(rng, depth + 1, next_region, ops);
        }
        let (mem, peak) = edge(rng);
        ops.push(Op::Sync(0, mem, peak));

        // Back on the spine: sometimes a whole region runs before
        // the next sibling, inside a deeper function call or at
        // this very depth (which forces a fresh join point on the
        // open level).
        if depth < 3 && rng.gen_bool(0.2) {
            ops.push(Op::Call);
            gen_task(rng, depth + 1, next_region, ops);
            ops.push(Op::Return);
        } else if depth < 3 && rng.gen_bool(0.15) {
            gen_task(rng, depth + 1, next_region, ops);
        }
    }
    let (mem, peak) = edge(rng);
    ops.push(Op::Sync(region, mem, peak));
}

fn gen_program(seed: u64) -> Vec<Op> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ops = vec![];
    let mut next_region = 1;
    for _ in 0..rng.gen_range(1..=2) {
        gen_task(&mut rng, 0, &mut next_region, &mut ops);
    }
    let (mem, peak) = edge(&mut rng);
    ops.push(Op::Exit(mem, peak));
    ops
}

#[test]
fn encodings_agree_on_random_traces() {
    for seed in 0..40 {
        let ops = gen_program(seed);
        for threshold in [0, 30, 500] {
            let full = run_full(&ops, threshold, false, None);
            let barebone = run_barebone(&ops, threshold, false, None);
            assert_eq!(full, barebone, "naive walk diverged on seed {seed}");

            let full = run_full(&ops, threshold, true, None);
            let barebone = run_barebone(&ops, threshold, true, None);
            assert_eq!(full, barebone, "multispawn walk diverged on seed {seed}");
        }
    }
}

/// The multispawn accumulator approximates only the robust bound;
/// totals and serial peaks must match the edge-at-a-time walk
/// exactly, and so must the watermark whenever no strand crosses
/// the threshold.
#[test]
fn strategies_agree_on_totals_and_serial_peaks() {
    for seed in 0..40 {
        let ops = gen_program(seed);
        let naive = run_full(&ops, 25, false, None);
        let efficient = run_full(&ops, 25, true, None);
        assert_eq!(naive.mem_total, efficient.mem_total, "seed {seed}");
        assert_eq!(naive.max_single, efficient.max_single, "seed {seed}");

        let above_everything = 1_000_000;
        let naive = run_full(&ops, above_everything, false, None);
        let efficient = run_full(&ops, above_everything, true, None);
        assert_eq!(naive.multi_robust, Nullable::NONE, "seed {seed}");
        assert_eq!(efficient.multi_robust, Nullable::NONE, "seed {seed}");
        assert_eq!(naive.get_watermark(), efficient.get_watermark(), "seed {seed}");
    }
}

#[test]
fn p1_arrays_collapse_onto_the_scalar_algebra() {
    for seed in 0..25 {
        let ops = gen_program(seed);
        let scalar = run_full(&ops, 100, false, None);
        let arrays = run_full_naive(&ops, 1, false);
        assert_eq!(arrays.mem_total, scalar.mem_total, "seed {seed}");
        assert_eq!(
            arrays.r[0],
            Nullable::from(0.max(scalar.mem_total)),
            "seed {seed}"
        );
        assert_eq!(arrays.r[1], Nullable::from(scalar.max_single), "seed {seed}");
    }
}

#[test]
fn p3_arrays_round_trip_between_encodings() {
    for seed in 0..25 {
        let ops = gen_program(seed);
        let full = run_full_naive(&ops, 3, false);
        let barebone = run_barebone_naive(&ops, 3, false);
        assert_eq!(full.mem_total, barebone.mem_total, "seed {seed}");
        assert_eq!(full.max_pos, barebone.max_pos, "seed {seed}");
        for i in 0..=3 {
            assert_eq!(full.r[i], barebone.r[i], "seed {seed}, index {i}");
        }
        assert_eq!(full.get_watermark(3), barebone.get_watermark(3), "seed {seed}");
    }
}
