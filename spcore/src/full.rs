//! The full trace encoding: an explicit series-parallel graph of
//! the program's spawn tree, built incrementally as events arrive,
//! plus the aggregators that walk it back down to a single
//! component.
//!
//! Nodes live in a writer-owned arena and are addressed by index.
//! The reader never touches the arena: every published edge carries
//! a snapshot of its target's sync association, which is legal
//! because the writer finalizes the association before the edge
//! becomes visible.

use crate::dot::GraphMirror;
use crate::helpe::*;
use crate::naive::{NaiveCtx, SpNaiveComponent, SpNaiveMultispawnComponent};
use crate::producer::FullEdgeProducer;
use crate::stream::TraceStream;
use crate::tracelog;

/// One edge of the spawn-tree graph, as seen by the reader.
#[derive(Debug, Clone)]
pub struct FullSpEdge {
    pub from:       NodeId,
    pub to:         NodeId,
    /// The join point associated with `to`, when `to` is a spawn
    /// node. Final before the edge is published.
    pub to_sync:    Option<NodeId>,
    /// First strand out of a spawn.
    pub spawn:      bool,
    pub data:       SpEdgeData,
}

#[derive(Debug)]
struct SpNode {
    associated_sync:    Option<NodeId>,
    num_strands_left:   usize,
}

/// One open join point of a level: which sync node, at which
/// function-call depth, for which region.
#[derive(Debug)]
struct SyncFrame {
    sync_node:      NodeId,
    function_level: usize,
    region_id:      usize,
}

/// One open spawn level. `current_node` is where the spine of this
/// level currently stands; the frames stack covers nested regions
/// opened at deeper function levels (or other regions) that have
/// not joined yet.
#[derive(Debug)]
struct SpLevel {
    current_node:   NodeId,
    frames:         Vec<SyncFrame>,
}

pub struct FullSpDag {
    nodes:      Vec<SpNode>,
    edges:      Arc<TraceStream<FullSpEdge>>,
    stack:      Vec<SpLevel>,
    last_node:  NodeId,
    after_spawn:    bool,
    current_level:  usize,
    out:        TraceLog,
    mirror:     Option<GraphMirror>,
}

impl FullSpDag {
    pub fn new(out: TraceLog, retain_graph: bool) -> Self {
        Self {
            nodes:          vec![],
            edges:          TraceStream::new(),
            stack:          vec![],
            last_node:      0,
            after_spawn:    false,
            current_level:  0,
            out,
            mirror:         retain_graph.then(GraphMirror::default),
        }
    }

    pub fn edge_stream(&self) -> Arc<TraceStream<FullSpEdge>> {
        Arc::clone(&self.edges)
    }

    pub fn is_complete(&self) -> bool {
        self.edges.is_finished()
    }

    pub fn increment_level(&mut self) {
        self.current_level += 1;
    }

    pub fn decrement_level(&mut self) {
        self.current_level -= 1;
    }

    /// Tags the most recently created node with a source location,
    /// for the diagnostic dumps.
    pub fn set_last_node_location(&mut self, name: &str, line: i32) {
        if let Some(mirror) = &mut self.mirror {
            mirror.set_location(self.last_node, name, line);
        }
    }

    pub fn mirror(&self) -> Option<&GraphMirror> {
        self.mirror.as_ref()
    }

    fn add_node(&mut self) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(SpNode {
            associated_sync:    None,
            num_strands_left:   2,
        });
        if let Some(mirror) = &mut self.mirror {
            mirror.add_node(id);
        }
        id
    }

    fn add_edge(&mut self, from: NodeId, to: NodeId, data: SpEdgeData, spawn: bool) {
        tracelog!(self.out, "Adding edge {from} --> {to}");
        if let Some(mirror) = &mut self.mirror {
            mirror.add_edge(from, to, &data, spawn, self.nodes[from].associated_sync);
        }
        self.edges.push(FullSpEdge {
            from,
            to,
            to_sync: self.nodes[to].associated_sync,
            spawn,
            data,
        });
    }

    /// A new strand has been forked off the current one.
    pub fn spawn(&mut self, data: SpEdgeData, region_id: usize) {
        let spawn_node = self.add_node();
        tracelog!(self.out, "Adding spawn node (id: {spawn_node})");

        if self.stack.is_empty() || self.after_spawn {
            // A deeper level: this spawn nests inside the strand we
            // just forked (or it is the very first one).
            let sync_node = self.add_node();
            tracelog!(self.out, "Adding sync node (id: {sync_node})");
            self.nodes[spawn_node].associated_sync = Some(sync_node);

            let parent_node = self.stack.last().map(|l| l.current_node);
            self.stack.push(SpLevel {
                current_node: spawn_node,
                frames: vec![SyncFrame {
                    sync_node,
                    function_level: self.current_level,
                    region_id,
                }],
            });

            match parent_node {
                Some(parent) => self.add_edge(parent, spawn_node, data, true),
                None => {
                    // Beginning of the program.
                    let start_node = self.add_node();
                    tracelog!(self.out, "Adding start node (id: {start_node})");
                    self.add_edge(start_node, spawn_node, data, false);
                }
            }
        } else {
            // Same level. Reuse the open join point if we are still
            // in the same region at the same call depth; otherwise
            // open a fresh one on this level.
            let reuse = {
                let level = self
                    .stack
                    .last()
                    .expect("spawn arrived with no open level");
                match level.frames.last() {
                    Some(frame) => {
                        debug_assert!(frame.function_level <= self.current_level);
                        frame.function_level == self.current_level
                            && frame.region_id == region_id
                    }
                    None => false,
                }
            };

            if reuse {
                let sync_node = self.stack.last().unwrap().frames.last().unwrap().sync_node;
                self.nodes[sync_node].num_strands_left = 2;
                self.nodes[spawn_node].associated_sync = Some(sync_node);
            } else {
                let sync_node = self.add_node();
                tracelog!(self.out, "Adding sync node (id: {sync_node})");
                self.nodes[spawn_node].associated_sync = Some(sync_node);
                self.stack.last_mut().unwrap().frames.push(SyncFrame {
                    sync_node,
                    function_level: self.current_level,
                    region_id,
                });
            }

            let level = self.stack.last_mut().unwrap();
            let pred = level.current_node;
            level.current_node = spawn_node;
            self.add_edge(pred, spawn_node, data, false);
        }

        self.last_node = spawn_node;
        self.after_spawn = true;
    }

    /// A strand has reached a join point. Task exits carry region
    /// id 0; real syncs carry their region and must match the
    /// innermost open one.
    pub fn sync(&mut self, data: SpEdgeData, region_id: usize) {
        if self.nodes.is_empty() {
            // The program never spawned: this is the synthetic
            // terminal sync.
            self.edges.finish();
            return;
        }

        assert!(
            !self.stack.is_empty(),
            "sync arrived after the trace already completed"
        );
        tracelog!(self.out, "DAG sync: level {}", self.stack.len() - 1);

        if region_id != 0 {
            let level = self.stack.last().unwrap();
            let frame = level
                .frames
                .last()
                .unwrap_or_else(|| panic!("sync for region {region_id} found no open region"));
            assert_eq!(
                frame.region_id, region_id,
                "sync region does not match the innermost open region"
            );
        }

        let mut pred = self.last_node;

        if self.stack.last().unwrap().frames.is_empty() {
            // This level is fully joined; the sync is for the one
            // above it.
            self.stack.pop();
            tracelog!(self.out, "Finished level {}", self.stack.len());

            if self.stack.is_empty() {
                // The program is exiting.
                let exit_node = self.add_node();
                tracelog!(self.out, "Adding exit node (id: {exit_node})");
                self.add_edge(pred, exit_node, data, false);
                self.edges.finish();
                return;
            }

            let level = self.stack.last().unwrap();
            let frame = level
                .frames
                .last()
                .expect("the resumed level has no join point to settle");
            assert_eq!(
                self.nodes[frame.sync_node].num_strands_left, 2,
                "the resumed join point is in an inconsistent state"
            );
        }

        let sync_node = self.stack.last().unwrap().frames.last().unwrap().sync_node;

        if self.nodes[sync_node].num_strands_left == 1 {
            // Horizontal sync: the joining strand is the level's
            // spine, not the last spawned branch.
            pred = self.stack.last().unwrap().current_node;
        }

        let spawn_flag = self.nodes[sync_node].num_strands_left == 2 && self.after_spawn;
        self.nodes[sync_node].num_strands_left -= 1;

        if self.nodes[sync_node].num_strands_left == 0 {
            let level = self.stack.last_mut().unwrap();
            level.current_node = sync_node;
            level.frames.pop();
        }

        self.add_edge(pred, sync_node, data, spawn_flag);
        self.last_node = sync_node;
        self.after_spawn = false;
    }
}

// ---- reader side -------------------------------------------------

/// Edge-at-a-time aggregation: every spawn region is folded as a
/// binary parallel composition of its spawn path and continuation.
pub fn aggregate_components(prod: &mut FullEdgeProducer, threshold: i64) -> SpComponent {
    let Some(first) = prod.next() else {
        // The program never spawned.
        assert!(prod.is_complete(), "edge stream broke before completion");
        return SpComponent::identity();
    };

    let mut start = SpComponent::from_edge(&first.data);
    let sync = first.to_sync.expect("the first edge must enter a spawn node");
    start.combine_series(&aggregate_from_node(prod, sync, threshold));

    let mut next = prod.next().expect("trace ended inside an open region");
    while let Some(sync) = next.to_sync {
        start.combine_series(&SpComponent::from_edge(&next.data));
        start.combine_series(&aggregate_from_node(prod, sync, threshold));
        next = prod.next().expect("trace ended inside an open region");
    }
    start.combine_series(&SpComponent::from_edge(&next.data));

    assert!(prod.next().is_none(), "edges remain after aggregation finished");
    assert!(prod.is_complete(), "aggregation finished on an incomplete trace");
    start
}

fn aggregate_from_node(prod: &mut FullEdgeProducer, sync: NodeId, threshold: i64) -> SpComponent {
    let first = prod.next().expect("spawn region ended without joining");
    let mut spawn_path = aggregate_until_sync(prod, first, sync, threshold);

    let cont_first = prod.next().expect("spawn region ended without joining");
    let continuation = aggregate_until_sync(prod, cont_first, sync, threshold);

    spawn_path.combine_parallel(&continuation, threshold);
    spawn_path
}

fn aggregate_until_sync(
    prod: &mut FullEdgeProducer,
    start: FullSpEdge,
    sync: NodeId,
    threshold: i64,
) -> SpComponent {
    let mut sub = SpComponent::from_edge(&start.data);
    let mut current = start;

    while current.to != sync {
        let to = current.to;
        let to_sync = current
            .to_sync
            .unwrap_or_else(|| panic!("node {to} on an open path is not a spawn node"));

        // Another spawn on this path: resolve that region first.
        sub.combine_series(&aggregate_from_node(prod, to_sync, threshold));

        if to_sync != sync {
            current = prod.next().expect("trace ended inside an open region");
            sub.combine_series(&SpComponent::from_edge(&current.data));
        } else {
            // The nested region shares our join point; its own walk
            // already consumed the joining edge.
            break;
        }
    }

    sub
}

/// Multispawn-batched aggregation: a whole region (arbitrarily many
/// sibling spawns off one spine) is folded through the incremental
/// accumulator instead of nested binary compositions.
pub fn aggregate_components_efficient(
    prod: &mut FullEdgeProducer,
    threshold: i64,
) -> SpComponent {
    let Some(first) = prod.next() else {
        assert!(prod.is_complete(), "edge stream broke before completion");
        return SpComponent::identity();
    };

    let mut result = aggregate_multispawn(prod, first, threshold);

    let mut next = prod.next().expect("trace ended inside an open region");
    while next.to_sync.is_some() {
        result.combine_series(&aggregate_multispawn(prod, next, threshold));
        next = prod.next().expect("trace ended inside an open region");
    }
    result.combine_series(&SpComponent::from_edge(&next.data));

    assert!(prod.next().is_none(), "edges remain after aggregation finished");
    assert!(prod.is_complete(), "aggregation finished on an incomplete trace");
    result
}

fn aggregate_multispawn(
    prod: &mut FullEdgeProducer,
    incoming: FullSpEdge,
    threshold: i64,
) -> SpComponent {
    let sync = incoming
        .to_sync
        .expect("multispawn pivot has no join point");

    let mut multispawn = SpMultispawnComponent::new();
    multispawn.increment_on_continuation(&SpComponent::from_edge(&incoming.data), threshold);

    loop {
        // Walk one spawn branch down to the shared join point.
        let mut spawn = SpComponent::identity();
        let mut next = prod.next().expect("trace ended inside an open region");
        while next.to != sync {
            assert!(
                next.to_sync != Some(sync),
                "a sibling spawn appeared on a spawn branch"
            );
            spawn.combine_series(&aggregate_multispawn(prod, next, threshold));
            next = prod.next().expect("trace ended inside an open region");
        }
        spawn.combine_series(&SpComponent::from_edge(&next.data));
        multispawn.increment_on_spawn(&spawn, threshold);

        // Walk the next continuation strand.
        let mut continuation = SpComponent::identity();
        let mut next = prod.next().expect("trace ended inside an open region");
        while next.to != sync && next.to_sync != Some(sync) {
            continuation.combine_series(&aggregate_multispawn(prod, next, threshold));
            next = prod.next().expect("trace ended inside an open region");
        }
        let joined = next.to == sync;
        continuation.combine_series(&SpComponent::from_edge(&next.data));
        multispawn.increment_on_continuation(&continuation, threshold);

        if joined {
            return multispawn.to_component();
        }
        // Otherwise the edge we just folded enters a sibling spawn
        // of this same region: go around again.
    }
}

/// The p-processor variant of [`aggregate_components`].
pub fn aggregate_components_naive(
    prod: &mut FullEdgeProducer,
    ctx: &mut NaiveCtx,
) -> SpNaiveComponent {
    let Some(first) = prod.next() else {
        assert!(prod.is_complete(), "edge stream broke before completion");
        return SpNaiveComponent::identity(ctx);
    };

    let mut start = SpNaiveComponent::from_edge(&first.data, ctx);
    let sync = first.to_sync.expect("the first edge must enter a spawn node");
    let from_node = aggregate_from_node_naive(prod, sync, ctx);
    start.combine_series(from_node, ctx);

    let mut next = prod.next().expect("trace ended inside an open region");
    while let Some(sync) = next.to_sync {
        let edge = SpNaiveComponent::from_edge(&next.data, ctx);
        start.combine_series(edge, ctx);
        let region = aggregate_from_node_naive(prod, sync, ctx);
        start.combine_series(region, ctx);
        next = prod.next().expect("trace ended inside an open region");
    }
    let last = SpNaiveComponent::from_edge(&next.data, ctx);
    start.combine_series(last, ctx);

    assert!(prod.next().is_none(), "edges remain after aggregation finished");
    assert!(prod.is_complete(), "aggregation finished on an incomplete trace");
    start
}

fn aggregate_from_node_naive(
    prod: &mut FullEdgeProducer,
    sync: NodeId,
    ctx: &mut NaiveCtx,
) -> SpNaiveComponent {
    let first = prod.next().expect("spawn region ended without joining");
    let mut spawn_path = aggregate_until_sync_naive(prod, first, sync, ctx);

    let cont_first = prod.next().expect("spawn region ended without joining");
    let continuation = aggregate_until_sync_naive(prod, cont_first, sync, ctx);

    spawn_path.combine_parallel(continuation, ctx);
    spawn_path
}

fn aggregate_until_sync_naive(
    prod: &mut FullEdgeProducer,
    start: FullSpEdge,
    sync: NodeId,
    ctx: &mut NaiveCtx,
) -> SpNaiveComponent {
    let mut sub = SpNaiveComponent::from_edge(&start.data, ctx);
    let mut current = start;

    while current.to != sync {
        let to = current.to;
        let to_sync = current
            .to_sync
            .unwrap_or_else(|| panic!("node {to} on an open path is not a spawn node"));

        let region = aggregate_from_node_naive(prod, to_sync, ctx);
        sub.combine_series(region, ctx);

        if to_sync != sync {
            current = prod.next().expect("trace ended inside an open region");
            let edge = SpNaiveComponent::from_edge(&current.data, ctx);
            sub.combine_series(edge, ctx);
        } else {
            break;
        }
    }

    sub
}

/// The p-processor variant of [`aggregate_components_efficient`].
pub fn aggregate_components_naive_efficient(
    prod: &mut FullEdgeProducer,
    ctx: &mut NaiveCtx,
) -> SpNaiveComponent {
    let Some(first) = prod.next() else {
        assert!(prod.is_complete(), "edge stream broke before completion");
        return SpNaiveComponent::identity(ctx);
    };

    let mut result = aggregate_multispawn_naive(prod, first, ctx);

    let mut next = prod.next().expect("trace ended inside an open region");
    while next.to_sync.is_some() {
        let region = aggregate_multispawn_naive(prod, next, ctx);
        result.combine_series(region, ctx);
        next = prod.next().expect("trace ended inside an open region");
    }
    let last = SpNaiveComponent::from_edge(&next.data, ctx);
    result.combine_series(last, ctx);

    assert!(prod.next().is_none(), "edges remain after aggregation finished");
    assert!(prod.is_complete(), "aggregation finished on an incomplete trace");
    result
}

fn aggregate_multispawn_naive(
    prod: &mut FullEdgeProducer,
    incoming: FullSpEdge,
    ctx: &mut NaiveCtx,
) -> SpNaiveComponent {
    let sync = incoming
        .to_sync
        .expect("multispawn pivot has no join point");

    let mut multispawn = SpNaiveMultispawnComponent::new(ctx);
    let start = SpNaiveComponent::from_edge(&incoming.data, ctx);
    multispawn.increment_on_continuation(start, ctx);

    loop {
        let mut spawn = SpNaiveComponent::identity(ctx);
        let mut next = prod.next().expect("trace ended inside an open region");
        while next.to != sync {
            assert!(
                next.to_sync != Some(sync),
                "a sibling spawn appeared on a spawn branch"
            );
            let region = aggregate_multispawn_naive(prod, next, ctx);
            spawn.combine_series(region, ctx);
            next = prod.next().expect("trace ended inside an open region");
        }
        let edge = SpNaiveComponent::from_edge(&next.data, ctx);
        spawn.combine_series(edge, ctx);
        multispawn.increment_on_spawn(spawn, ctx);

        let mut continuation = SpNaiveComponent::identity(ctx);
        let mut next = prod.next().expect("trace ended inside an open region");
        while next.to != sync && next.to_sync != Some(sync) {
            let region = aggregate_multispawn_naive(prod, next, ctx);
            continuation.combine_series(region, ctx);
            next = prod.next().expect("trace ended inside an open region");
        }
        let joined = next.to == sync;
        let edge = SpNaiveComponent::from_edge(&next.data, ctx);
        continuation.combine_series(edge, ctx);
        multispawn.increment_on_continuation(continuation, ctx);

        if joined {
            return multispawn.to_component(ctx);
        }
    }
}
