//! Shared plumbing for the aggregation tests: a tiny op language
//! for traced programs, replayed into a writer on its own thread
//! while the test thread aggregates concurrently.

use spcore::barebone::{self, BareboneSpDag};
use spcore::full::{self, FullSpDag};
use spcore::producer::{BareboneEdgeProducer, FullEdgeProducer, SpEventProducer};
use spcore::{NaiveCtx, SpNaiveComponent};
use spcore::*;

#[derive(Debug, Clone, Copy)]
pub enum Op {
    /// region, net delta, strand peak
    Spawn(usize, i64, i64),
    /// region (0 = task exit), net delta, strand peak
    Sync(usize, i64, i64),
    Call,
    Return,
    /// the synthetic final sync: net delta, strand peak
    Exit(i64, i64),
}

pub fn data(mem: i64, peak: i64) -> SpEdgeData {
    assert!(peak >= 0 && peak >= mem, "bad strand: peak {peak} below max(0, {mem})");
    SpEdgeData {
        mem_allocated: mem,
        max_mem_allocated: peak,
        ..Default::default()
    }
}

fn poll() -> Duration {
    Duration::from_micros(200)
}

fn replay_full(mut dag: FullSpDag, ops: Vec<Op>, delay: Option<Duration>) {
    for op in ops {
        if let Some(d) = delay {
            thread::sleep(d);
        }
        match op {
            Op::Spawn(region, mem, peak) => dag.spawn(data(mem, peak), region),
            Op::Sync(region, mem, peak) => dag.sync(data(mem, peak), region),
            Op::Call => dag.increment_level(),
            Op::Return => dag.decrement_level(),
            Op::Exit(mem, peak) => dag.sync(data(mem, peak), 0),
        }
    }
}

fn replay_barebone(mut dag: BareboneSpDag, ops: Vec<Op>, delay: Option<Duration>) {
    for op in ops {
        if let Some(d) = delay {
            thread::sleep(d);
        }
        match op {
            Op::Spawn(region, mem, peak) => dag.spawn(data(mem, peak), region),
            Op::Sync(region, mem, peak) => dag.sync(data(mem, peak), region),
            Op::Call => dag.increment_level(),
            Op::Return => dag.decrement_level(),
            Op::Exit(mem, peak) => dag.sync(data(mem, peak), 0),
        }
    }
}

/// Writer on its own thread, aggregation on this one.
pub fn run_full(ops: &[Op], threshold: i64, efficient: bool, delay: Option<Duration>) -> SpComponent {
    let dag = FullSpDag::new(TraceLog::new(false), false);
    let stream = dag.edge_stream();
    let ops = ops.to_vec();
    let writer = thread::spawn(move || replay_full(dag, ops, delay));

    let mut prod = FullEdgeProducer::new(stream, poll());
    let comp = if efficient {
        full::aggregate_components_efficient(&mut prod, threshold)
    } else {
        full::aggregate_components(&mut prod, threshold)
    };
    writer.join().unwrap();
    comp
}

pub fn run_barebone(
    ops: &[Op],
    threshold: i64,
    efficient: bool,
    delay: Option<Duration>,
) -> SpComponent {
    let dag = BareboneSpDag::new(TraceLog::new(false));
    let edge_stream = dag.edge_stream();
    let event_stream = dag.event_stream();
    let ops = ops.to_vec();
    let writer = thread::spawn(move || replay_barebone(dag, ops, delay));

    let mut edges = BareboneEdgeProducer::new(edge_stream, poll());
    let mut events = SpEventProducer::new(event_stream, poll());
    let comp = if efficient {
        barebone::aggregate_components_efficient(&mut edges, &mut events, threshold)
    } else {
        barebone::aggregate_components(&mut edges, &mut events, threshold)
    };
    writer.join().unwrap();
    comp
}

pub fn run_full_naive(ops: &[Op], p: usize, efficient: bool) -> SpNaiveComponent {
    let dag = FullSpDag::new(TraceLog::new(false), false);
    let stream = dag.edge_stream();
    let ops = ops.to_vec();
    let writer = thread::spawn(move || replay_full(dag, ops, None));

    let mut prod = FullEdgeProducer::new(stream, poll());
    let mut ctx = NaiveCtx::new(p);
    let comp = if efficient {
        full::aggregate_components_naive_efficient(&mut prod, &mut ctx)
    } else {
        full::aggregate_components_naive(&mut prod, &mut ctx)
    };
    writer.join().unwrap();
    comp
}

pub fn run_barebone_naive(ops: &[Op], p: usize, efficient: bool) -> SpNaiveComponent {
    let dag = BareboneSpDag::new(TraceLog::new(false));
    let edge_stream = dag.edge_stream();
    let event_stream = dag.event_stream();
    let ops = ops.to_vec();
    let writer = thread::spawn(move || replay_barebone(dag, ops, None));

    let mut edges = BareboneEdgeProducer::new(edge_stream, poll());
    let mut events = SpEventProducer::new(event_stream, poll());
    let mut ctx = NaiveCtx::new(p);
    let comp = if efficient {
        barebone::aggregate_components_naive_efficient(&mut edges, &mut events, &mut ctx)
    } else {
        barebone::aggregate_components_naive(&mut edges, &mut events, &mut ctx)
    };
    writer.join().unwrap();
    comp
}
