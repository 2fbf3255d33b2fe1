//! The barebone trace encoding: no graph at all, just a stream of
//! 2-bit events paired positionally with a stream of strand data.
//! The series-parallel structure is reconstructed from the bit
//! pattern alone, which keeps the writer's footprint minimal.

use crate::helpe::*;
use crate::naive::{NaiveCtx, SpNaiveComponent, SpNaiveMultispawnComponent};
use crate::producer::{BareboneEdgeProducer, SpEventProducer};
use crate::stream::TraceStream;
use crate::tracelog;

/// One open region: which region id opened it, at which function
/// depth, and how many strands still have to reach its join point.
#[derive(Debug)]
struct BareboneLevel {
    region_id:  usize,
    level:      usize,
    remaining:  usize,
}

pub struct BareboneSpDag {
    events:     Arc<TraceStream<SpEvent>>,
    edges:      Arc<TraceStream<SpEdgeData>>,
    stack:      Vec<BareboneLevel>,
    after_spawn:            bool,
    spawned_at_least_once:  bool,
    current_level:  usize,
    out:        TraceLog,
}

impl BareboneSpDag {
    pub fn new(out: TraceLog) -> Self {
        Self {
            events:     TraceStream::new(),
            edges:      TraceStream::new(),
            stack:      vec![],
            after_spawn:            false,
            spawned_at_least_once:  false,
            current_level:  0,
            out,
        }
    }

    pub fn event_stream(&self) -> Arc<TraceStream<SpEvent>> {
        Arc::clone(&self.events)
    }

    pub fn edge_stream(&self) -> Arc<TraceStream<SpEdgeData>> {
        Arc::clone(&self.edges)
    }

    pub fn is_complete(&self) -> bool {
        self.events.is_finished()
    }

    pub fn increment_level(&mut self) {
        self.current_level += 1;
    }

    pub fn decrement_level(&mut self) {
        self.current_level -= 1;
    }

    fn complete(&mut self) {
        self.edges.finish();
        self.events.finish();
    }

    pub fn spawn(&mut self, data: SpEdgeData, region_id: usize) {
        let new_sync = match self.stack.last() {
            Some(top) => {
                self.after_spawn
                    || top.region_id != region_id
                    || top.level != self.current_level
            }
            None => true,
        };

        if new_sync {
            self.stack.push(BareboneLevel {
                region_id,
                level: self.current_level,
                remaining: 2,
            });
        } else {
            // Horizontal spawn: re-arm the join point already open
            // for this region.
            self.stack.last_mut().unwrap().remaining = 2;
        }

        tracelog!(
            self.out,
            "Spawn region: {region_id} - level: {}",
            self.current_level
        );

        self.edges.push(data);
        self.events.push(SpEvent { spawn: true, new_sync });
        self.after_spawn = true;
        self.spawned_at_least_once = true;
    }

    pub fn sync(&mut self, data: SpEdgeData, region_id: usize) {
        if !self.spawned_at_least_once {
            // No spawn ever happened: this is the synthetic final
            // sync of a serial program.
            self.complete();
            return;
        }

        assert!(
            !self.is_complete(),
            "sync arrived after the trace already completed"
        );

        if self.stack.is_empty() {
            // The program is exiting. The final strand is published
            // before the completion flag so the reader cannot miss
            // it.
            assert_eq!(region_id, 0, "a real sync arrived with no region open");
            self.edges.push(data);
            self.events.push(SpEvent { spawn: false, new_sync: false });
            self.after_spawn = false;
            self.complete();
            return;
        } else {
            let top = self.stack.last().unwrap();
            assert!(
                region_id == 0 || top.region_id == region_id,
                "sync region does not match the innermost open region"
            );
            assert_eq!(
                top.level, self.current_level,
                "sync arrived at the wrong function depth"
            );

            if top.remaining == 1 {
                self.stack.pop();
            } else {
                self.stack.last_mut().unwrap().remaining -= 1;
            }
            tracelog!(self.out, "Sync at level {}", self.current_level);
        }

        self.edges.push(data);
        self.events.push(SpEvent { spawn: false, new_sync: false });
        self.after_spawn = false;
    }
}

// ---- reader side -------------------------------------------------

/// Edge-at-a-time aggregation over the event stream.
pub fn aggregate_components(
    edges: &mut BareboneEdgeProducer,
    events: &mut SpEventProducer,
    threshold: i64,
) -> SpComponent {
    let Some(first) = edges.next() else {
        // The program never spawned.
        assert!(edges.is_complete(), "edge stream broke before completion");
        return SpComponent::identity();
    };

    let mut start = SpComponent::from_edge(&first);
    let event = events.next();
    assert!(event.spawn, "the trace does not begin with a spawn");

    start.combine_series(&aggregate_components_spawn(edges, events, threshold));
    start.combine_series(&SpComponent::from_edge(&edges.next_data()));

    let event = events.next();
    assert!(!event.spawn, "the trace does not end with a sync");

    assert!(edges.next().is_none(), "edges remain after aggregation finished");
    assert!(!events.has_next(), "events remain after aggregation finished");
    assert!(edges.is_complete(), "aggregation finished on an incomplete trace");
    events.free_last();

    start
}

fn aggregate_components_spawn(
    edges: &mut BareboneEdgeProducer,
    events: &mut SpEventProducer,
    threshold: i64,
) -> SpComponent {
    let mut spawn_path = aggregate_until_sync(edges, events, false, threshold);
    let continuation = aggregate_until_sync(edges, events, true, threshold);
    spawn_path.combine_parallel(&continuation, threshold);
    spawn_path
}

fn aggregate_until_sync(
    edges: &mut BareboneEdgeProducer,
    events: &mut SpEventProducer,
    continuation: bool,
    threshold: i64,
) -> SpComponent {
    let mut event = events.next();

    if !event.spawn {
        // Single-edge sub-component.
        return SpComponent::from_edge(&edges.next_data());
    }

    let mut path = SpComponent::identity();
    let mut delegated = false;

    while !delegated && event.spawn {
        // The edge going into the nested spawn, then the nested
        // region itself.
        path.combine_series(&SpComponent::from_edge(&edges.next_data()));
        path.combine_series(&aggregate_components_spawn(edges, events, threshold));

        if !event.new_sync {
            // The nested spawn reused our join point: it is a
            // sibling of this multispawn region and its walk
            // already consumed the joining edge. Only the
            // continuation strand can ever see this.
            assert!(continuation, "a sibling spawn appeared on a spawn branch");
            delegated = true;
        }

        if !delegated {
            event = events.next();
        }
    }

    if !delegated {
        assert!(!event.spawn, "expected the joining sync event");
        path.combine_series(&SpComponent::from_edge(&edges.next_data()));
    }

    path
}

/// Multispawn-batched aggregation over the event stream.
pub fn aggregate_components_efficient(
    edges: &mut BareboneEdgeProducer,
    events: &mut SpEventProducer,
    threshold: i64,
) -> SpComponent {
    let Some(first) = edges.next() else {
        assert!(edges.is_complete(), "edge stream broke before completion");
        return SpComponent::identity();
    };

    let event = events.next();
    assert!(
        event.spawn && event.new_sync,
        "the trace does not begin with a region-opening spawn"
    );

    let mut result =
        aggregate_multispawn(edges, events, SpComponent::from_edge(&first), threshold);

    loop {
        let event = events.next();
        if event.spawn {
            assert!(event.new_sync, "a top-level spawn reused a closed join point");
            let incoming = SpComponent::from_edge(&edges.next_data());
            result.combine_series(&aggregate_multispawn(edges, events, incoming, threshold));
        } else {
            result.combine_series(&SpComponent::from_edge(&edges.next_data()));
            break;
        }
    }

    assert!(edges.next().is_none(), "edges remain after aggregation finished");
    assert!(!events.has_next(), "events remain after aggregation finished");
    assert!(edges.is_complete(), "aggregation finished on an incomplete trace");
    events.free_last();

    result
}

/// Folds one whole region. The opening spawn event has been
/// consumed by the caller; `incoming` is the strand that led here.
fn aggregate_multispawn(
    edges: &mut BareboneEdgeProducer,
    events: &mut SpEventProducer,
    incoming: SpComponent,
    threshold: i64,
) -> SpComponent {
    let mut multispawn = SpMultispawnComponent::new();
    multispawn.increment_on_continuation(&incoming, threshold);

    loop {
        // One spawn branch, down to its own join.
        let mut spawn = SpComponent::identity();
        loop {
            let event = events.next();
            if event.spawn {
                assert!(event.new_sync, "a sibling spawn appeared on a spawn branch");
                let nested = SpComponent::from_edge(&edges.next_data());
                spawn.combine_series(&aggregate_multispawn(edges, events, nested, threshold));
            } else {
                spawn.combine_series(&SpComponent::from_edge(&edges.next_data()));
                break;
            }
        }
        multispawn.increment_on_spawn(&spawn, threshold);

        // The continuation strand after that branch.
        let mut cont = SpComponent::identity();
        loop {
            let event = events.next();
            if event.spawn {
                if event.new_sync {
                    let nested = SpComponent::from_edge(&edges.next_data());
                    cont.combine_series(&aggregate_multispawn(edges, events, nested, threshold));
                } else {
                    // A sibling spawn of this same region: the
                    // continuation strand ends here and the region
                    // goes on.
                    cont.combine_series(&SpComponent::from_edge(&edges.next_data()));
                    multispawn.increment_on_continuation(&cont, threshold);
                    break;
                }
            } else {
                // Our join point: the final continuation.
                cont.combine_series(&SpComponent::from_edge(&edges.next_data()));
                multispawn.increment_on_continuation(&cont, threshold);
                return multispawn.to_component();
            }
        }
    }
}

/// The p-processor variant of [`aggregate_components`].
pub fn aggregate_components_naive(
    edges: &mut BareboneEdgeProducer,
    events: &mut SpEventProducer,
    ctx: &mut NaiveCtx,
) -> SpNaiveComponent {
    let Some(first) = edges.next() else {
        assert!(edges.is_complete(), "edge stream broke before completion");
        return SpNaiveComponent::identity(ctx);
    };

    let mut start = SpNaiveComponent::from_edge(&first, ctx);
    let event = events.next();
    assert!(event.spawn, "the trace does not begin with a spawn");

    let folded = aggregate_components_spawn_naive(edges, events, ctx);
    start.combine_series(folded, ctx);
    let last = SpNaiveComponent::from_edge(&edges.next_data(), ctx);
    start.combine_series(last, ctx);

    let event = events.next();
    assert!(!event.spawn, "the trace does not end with a sync");

    assert!(edges.next().is_none(), "edges remain after aggregation finished");
    assert!(!events.has_next(), "events remain after aggregation finished");
    assert!(edges.is_complete(), "aggregation finished on an incomplete trace");
    events.free_last();

    start
}

fn aggregate_components_spawn_naive(
    edges: &mut BareboneEdgeProducer,
    events: &mut SpEventProducer,
    ctx: &mut NaiveCtx,
) -> SpNaiveComponent {
    let mut spawn_path = aggregate_until_sync_naive(edges, events, false, ctx);
    let continuation = aggregate_until_sync_naive(edges, events, true, ctx);
    spawn_path.combine_parallel(continuation, ctx);
    spawn_path
}

fn aggregate_until_sync_naive(
    edges: &mut BareboneEdgeProducer,
    events: &mut SpEventProducer,
    continuation: bool,
    ctx: &mut NaiveCtx,
) -> SpNaiveComponent {
    let mut event = events.next();

    if !event.spawn {
        return SpNaiveComponent::from_edge(&edges.next_data(), ctx);
    }

    let mut path = SpNaiveComponent::identity(ctx);
    let mut delegated = false;

    while !delegated && event.spawn {
        let edge = SpNaiveComponent::from_edge(&edges.next_data(), ctx);
        path.combine_series(edge, ctx);
        let region = aggregate_components_spawn_naive(edges, events, ctx);
        path.combine_series(region, ctx);

        if !event.new_sync {
            assert!(continuation, "a sibling spawn appeared on a spawn branch");
            delegated = true;
        }

        if !delegated {
            event = events.next();
        }
    }

    if !delegated {
        assert!(!event.spawn, "expected the joining sync event");
        let edge = SpNaiveComponent::from_edge(&edges.next_data(), ctx);
        path.combine_series(edge, ctx);
    }

    path
}

/// The p-processor variant of [`aggregate_components_efficient`].
pub fn aggregate_components_naive_efficient(
    edges: &mut BareboneEdgeProducer,
    events: &mut SpEventProducer,
    ctx: &mut NaiveCtx,
) -> SpNaiveComponent {
    let Some(first) = edges.next() else {
        assert!(edges.is_complete(), "edge stream broke before completion");
        return SpNaiveComponent::identity(ctx);
    };

    let event = events.next();
    assert!(
        event.spawn && event.new_sync,
        "the trace does not begin with a region-opening spawn"
    );

    let incoming = SpNaiveComponent::from_edge(&first, ctx);
    let mut result = aggregate_multispawn_naive(edges, events, incoming, ctx);

    loop {
        let event = events.next();
        if event.spawn {
            assert!(event.new_sync, "a top-level spawn reused a closed join point");
            let incoming = SpNaiveComponent::from_edge(&edges.next_data(), ctx);
            let region = aggregate_multispawn_naive(edges, events, incoming, ctx);
            result.combine_series(region, ctx);
        } else {
            let last = SpNaiveComponent::from_edge(&edges.next_data(), ctx);
            result.combine_series(last, ctx);
            break;
        }
    }

    assert!(edges.next().is_none(), "edges remain after aggregation finished");
    assert!(!events.has_next(), "events remain after aggregation finished");
    assert!(edges.is_complete(), "aggregation finished on an incomplete trace");
    events.free_last();

    result
}

fn aggregate_multispawn_naive(
    edges: &mut BareboneEdgeProducer,
    events: &mut SpEventProducer,
    incoming: SpNaiveComponent,
    ctx: &mut NaiveCtx,
) -> SpNaiveComponent {
    let mut multispawn = SpNaiveMultispawnComponent::new(ctx);
    multispawn.increment_on_continuation(incoming, ctx);

    loop {
        let mut spawn = SpNaiveComponent::identity(ctx);
        loop {
            let event = events.next();
            if event.spawn {
                assert!(event.new_sync, "a sibling spawn appeared on a spawn branch");
                let nested = SpNaiveComponent::from_edge(&edges.next_data(), ctx);
                let region = aggregate_multispawn_naive(edges, events, nested, ctx);
                spawn.combine_series(region, ctx);
            } else {
                let edge = SpNaiveComponent::from_edge(&edges.next_data(), ctx);
                spawn.combine_series(edge, ctx);
                break;
            }
        }
        multispawn.increment_on_spawn(spawn, ctx);

        let mut cont = SpNaiveComponent::identity(ctx);
        loop {
            let event = events.next();
            if event.spawn {
                if event.new_sync {
                    let nested = SpNaiveComponent::from_edge(&edges.next_data(), ctx);
                    let region = aggregate_multispawn_naive(edges, events, nested, ctx);
                    cont.combine_series(region, ctx);
                } else {
                    let edge = SpNaiveComponent::from_edge(&edges.next_data(), ctx);
                    cont.combine_series(edge, ctx);
                    multispawn.increment_on_continuation(cont, ctx);
                    break;
                }
            } else {
                let edge = SpNaiveComponent::from_edge(&edges.next_data(), ctx);
                cont.combine_series(edge, ctx);
                multispawn.increment_on_continuation(cont, ctx);
                return multispawn.to_component(ctx);
            }
        }
    }
}
