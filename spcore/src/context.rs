//! The writer-side surface: one explicit context object per traced
//! process, no module-level state anywhere. The instrumentation
//! callbacks of the parallel runtime funnel into the hook methods
//! here; the background aggregation thread is spawned from here as
//! well.

use crate::barebone::{self, BareboneSpDag};
use crate::full::{self, FullSpDag};
use crate::helpe::*;
use crate::naive::NaiveCtx;
use crate::producer::{BareboneEdgeProducer, FullEdgeProducer, SpEventProducer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TraceEncoding {
    /// Explicit node/edge graph; supports the diagnostic dumps.
    Full,
    /// 2-bit events plus strand data; minimal footprint.
    Barebone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    /// Edge-at-a-time binary compositions.
    Naive,
    /// Multispawn-batched accumulation.
    Efficient,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Worker count p. The admission threshold and the p-processor
    /// arrays are sized from it.
    pub workers:        usize,
    /// The memory limit L the program is being admitted against.
    pub mem_limit:      i64,
    pub encoding:       TraceEncoding,
    pub strategy:       Strategy,
    /// When set, run the p-processor ("naive component") model
    /// instead of the single-processor one.
    pub multiprocessor: bool,
    /// How long the reader sleeps per poll while the writer is
    /// ahead of it.
    pub poll_interval:  Duration,
    /// Stack size of the aggregation thread. The descent mirrors
    /// the trace's nesting depth, so this errs large.
    pub aggregator_stack_bytes: usize,
    /// Progress chatter on stdout.
    pub chatty:         bool,
    /// Keep a writer-side mirror of the full graph for
    /// `write_dot_file`/`print_graph`. Full encoding only.
    pub retain_graph:   bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers:        1,
            mem_limit:      0,
            encoding:       TraceEncoding::Full,
            strategy:       Strategy::Naive,
            multiprocessor: false,
            poll_interval:  Duration::from_millis(1),
            aggregator_stack_bytes: 512 * 1024 * 1024,
            chatty:         false,
            retain_graph:   false,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("the worker count must be at least 1")]
    NoWorkers,
    #[error("the memory limit cannot be negative (got {0})")]
    NegativeLimit(i64),
    #[error("the reader poll interval cannot be zero")]
    ZeroPollInterval,
}

impl Config {
    /// Malformed configuration is a startup error; nothing may be
    /// traced before this passes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.mem_limit < 0 {
            return Err(ConfigError::NegativeLimit(self.mem_limit));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }

    /// The admission threshold L / (2p): strand peaks at or below
    /// it never count as a second concurrent contributor.
    pub fn threshold(&self) -> i64 {
        self.mem_limit / (2 * self.workers as i64)
    }
}

enum TraceDag {
    Full(FullSpDag),
    Barebone(BareboneSpDag),
}

/// What the aggregation thread hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkReport {
    pub watermark:  i64,
    pub mem_total:  i64,
}

pub struct AggregatorHandle {
    handle: thread::JoinHandle<WatermarkReport>,
}

impl AggregatorHandle {
    /// Blocks until the trace completes and the bound is out.
    pub fn join(self) -> WatermarkReport {
        self.handle
            .join()
            .expect("the aggregation thread died; the trace was malformed")
    }
}

pub struct TracerContext {
    cfg:        Config,
    dag:        TraceDag,
    current:    SpEdgeData,
    started:    bool,
}

impl TracerContext {
    pub fn new(cfg: Config) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let out = TraceLog::new(cfg.chatty);
        let dag = match cfg.encoding {
            TraceEncoding::Full => TraceDag::Full(FullSpDag::new(out, cfg.retain_graph)),
            TraceEncoding::Barebone => TraceDag::Barebone(BareboneSpDag::new(out)),
        };
        Ok(Self {
            cfg,
            dag,
            current: SpEdgeData::default(),
            started: false,
        })
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Opens the gate: allocations before this (runtime warm-up,
    /// interposition bootstrapping) are ignored.
    pub fn start(&mut self) {
        self.started = true;
    }

    pub fn record_alloc(&mut self, size: u64, site: Option<&str>) {
        if self.started {
            self.current.record_alloc(size, site);
        }
    }

    pub fn record_free(&mut self, size: u64) {
        if self.started {
            self.current.record_free(size);
        }
    }

    /// Function-entry hook; call depth disambiguates horizontal
    /// spawns from nested ones.
    pub fn enter_call(&mut self) {
        match &mut self.dag {
            TraceDag::Full(dag) => dag.increment_level(),
            TraceDag::Barebone(dag) => dag.increment_level(),
        }
    }

    pub fn leave_call(&mut self) {
        match &mut self.dag {
            TraceDag::Full(dag) => dag.decrement_level(),
            TraceDag::Barebone(dag) => dag.decrement_level(),
        }
    }

    pub fn on_spawn(&mut self, region_id: usize) {
        let data = std::mem::take(&mut self.current);
        match &mut self.dag {
            TraceDag::Full(dag) => dag.spawn(data, region_id),
            TraceDag::Barebone(dag) => dag.spawn(data, region_id),
        }
    }

    pub fn on_sync(&mut self, region_id: usize) {
        let data = std::mem::take(&mut self.current);
        match &mut self.dag {
            TraceDag::Full(dag) => dag.sync(data, region_id),
            TraceDag::Barebone(dag) => dag.sync(data, region_id),
        }
    }

    /// A spawned task ran off its end. Task exits carry no region.
    pub fn on_task_exit(&mut self) {
        self.on_sync(0);
    }

    /// The final synthetic sync, issued when the traced program
    /// exits its entry point.
    pub fn program_exit(&mut self) {
        self.on_sync(0);
    }

    pub fn set_last_node_location(&mut self, name: &str, line: i32) {
        if let TraceDag::Full(dag) = &mut self.dag {
            dag.set_last_node_location(name, line);
        }
    }

    pub fn is_complete(&self) -> bool {
        match &self.dag {
            TraceDag::Full(dag) => dag.is_complete(),
            TraceDag::Barebone(dag) => dag.is_complete(),
        }
    }

    /// Graph summary on stdout. Full encoding with `retain_graph`
    /// only.
    pub fn print_graph(&self) {
        if let TraceDag::Full(dag) = &self.dag {
            if let Some(mirror) = dag.mirror() {
                mirror.print();
            }
        }
    }

    /// DOT dump plus the allocation-source sidecar. Full encoding
    /// with `retain_graph` only; `None` otherwise.
    pub fn write_dot_file(&self, path: &std::path::Path) -> Option<std::io::Result<()>> {
        match &self.dag {
            TraceDag::Full(dag) => dag.mirror().map(|m| m.write_dot_file(path)),
            TraceDag::Barebone(_) => None,
        }
    }

    /// Launches the one background aggregation thread. It consumes
    /// the trace concurrently with the instrumented program and
    /// parks (capped poll sleep) whenever it catches up.
    pub fn spawn_aggregator(&self) -> AggregatorHandle {
        let cfg = self.cfg.clone();
        let threshold = cfg.threshold();
        let p = cfg.workers;
        let poll = cfg.poll_interval;

        let builder = thread::Builder::new()
            .name("sp-aggregator".into())
            // The descent is as deep as the program's fork-join
            // nesting; give it room.
            .stack_size(cfg.aggregator_stack_bytes);

        let handle = match &self.dag {
            TraceDag::Full(dag) => {
                let stream = dag.edge_stream();
                builder.spawn(move || {
                    let mut prod = FullEdgeProducer::new(stream, poll);
                    if cfg.multiprocessor {
                        let mut ctx = NaiveCtx::new(p);
                        let comp = match cfg.strategy {
                            Strategy::Naive => full::aggregate_components_naive(&mut prod, &mut ctx),
                            Strategy::Efficient => {
                                full::aggregate_components_naive_efficient(&mut prod, &mut ctx)
                            }
                        };
                        WatermarkReport {
                            watermark: comp.get_watermark(p),
                            mem_total: comp.mem_total,
                        }
                    } else {
                        let comp = match cfg.strategy {
                            Strategy::Naive => full::aggregate_components(&mut prod, threshold),
                            Strategy::Efficient => {
                                full::aggregate_components_efficient(&mut prod, threshold)
                            }
                        };
                        WatermarkReport {
                            watermark: comp.get_watermark(),
                            mem_total: comp.mem_total,
                        }
                    }
                })
            }
            TraceDag::Barebone(dag) => {
                let edge_stream = dag.edge_stream();
                let event_stream = dag.event_stream();
                builder.spawn(move || {
                    let mut edges = BareboneEdgeProducer::new(edge_stream, poll);
                    let mut events = SpEventProducer::new(event_stream, poll);
                    if cfg.multiprocessor {
                        let mut ctx = NaiveCtx::new(p);
                        let comp = match cfg.strategy {
                            Strategy::Naive => {
                                barebone::aggregate_components_naive(&mut edges, &mut events, &mut ctx)
                            }
                            Strategy::Efficient => barebone::aggregate_components_naive_efficient(
                                &mut edges,
                                &mut events,
                                &mut ctx,
                            ),
                        };
                        WatermarkReport {
                            watermark: comp.get_watermark(p),
                            mem_total: comp.mem_total,
                        }
                    } else {
                        let comp = match cfg.strategy {
                            Strategy::Naive => {
                                barebone::aggregate_components(&mut edges, &mut events, threshold)
                            }
                            Strategy::Efficient => barebone::aggregate_components_efficient(
                                &mut edges,
                                &mut events,
                                threshold,
                            ),
                        };
                        WatermarkReport {
                            watermark: comp.get_watermark(),
                            mem_total: comp.mem_total,
                        }
                    }
                })
            }
        }
        .expect("could not spawn the aggregation thread");

        AggregatorHandle { handle }
    }
}
