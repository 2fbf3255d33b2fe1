//! Diagnostic dumps of the full trace graph.
//!
//! The aggregation path recycles edges as it consumes them, so the
//! dumps work off a writer-retained mirror instead: a flat record
//! of every node and edge, kept only when diagnostics are on.

use std::fs::File;
use std::io::{self, Write as _};
use std::path::Path;

use crate::helpe::*;

#[derive(Debug, Default)]
pub struct GraphMirror {
    nodes: Vec<MirrorNode>,
    edges: Vec<MirrorEdge>,
}

#[derive(Debug)]
struct MirrorNode {
    id:         NodeId,
    location:   Option<(String, i32)>,
}

#[derive(Debug)]
struct MirrorEdge {
    from:       NodeId,
    to:         NodeId,
    mem:        i64,
    peak:       i64,
    biggest:    u64,
    spawn:      bool,
    from_sync:  Option<NodeId>,
    attribution: Option<IndexMap<String, i64>>,
}

impl GraphMirror {
    pub fn add_node(&mut self, id: NodeId) {
        self.nodes.push(MirrorNode { id, location: None });
    }

    pub fn set_location(&mut self, id: NodeId, name: &str, line: i32) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
            node.location = Some((name.to_string(), line));
        }
    }

    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        data: &SpEdgeData,
        spawn: bool,
        from_sync: Option<NodeId>,
    ) {
        self.edges.push(MirrorEdge {
            from,
            to,
            mem: data.mem_allocated,
            peak: data.max_mem_allocated,
            biggest: data.biggest_allocation,
            spawn,
            from_sync,
            attribution: data.attribution.clone(),
        });
    }

    pub fn print(&self) {
        println!(
            "Series Parallel DAG - Node count: {} - Edge count: {}",
            self.nodes.len(),
            self.edges.len()
        );
        for (idx, edge) in self.edges.iter().enumerate() {
            print!(
                "({idx}) {} --> {} (max: {} - total: {})",
                edge.from, edge.to, edge.peak, edge.mem
            );
            if edge.spawn {
                if let Some(sync) = edge.from_sync {
                    print!(" [spawn] [sync node: {sync}]");
                } else {
                    print!(" [spawn]");
                }
            }
            println!();
        }
    }

    fn node_label(node: &MirrorNode) -> String {
        match &node.location {
            Some((name, line)) => format!("{name}_{line}"),
            None => node.id.to_string(),
        }
    }

    /// Writes the graph as DOT, spawn edges highlighted, plus a
    /// sidecar listing where each marked edge's biggest allocation
    /// came from.
    pub fn write_dot_file(&self, path: &Path) -> io::Result<()> {
        let mut file = File::create(path)?;

        writeln!(file, "digraph {{")?;
        writeln!(file, "rankdir=LR")?;

        for node in &self.nodes {
            writeln!(file, "{}[label=\"{}\"]", node.id, Self::node_label(node))?;
        }

        let mut alloc_index = 0usize;
        for edge in &self.edges {
            write!(
                file,
                "{} -> {} [label=\"{} ({})",
                edge.from,
                edge.to,
                format_with_commas(edge.mem),
                format_with_commas(edge.peak)
            )?;
            if edge.biggest > 0 {
                write!(file, " !{alloc_index}")?;
                alloc_index += 1;
            }
            write!(file, "\"")?;
            if edge.spawn {
                write!(file, ", penwidth=2, color=\"red\"")?;
            } else {
                write!(file, ", color=\"blue\"")?;
            }
            writeln!(file, "];")?;
        }
        writeln!(file, "}}")?;

        let mut sources = File::create(path.with_extension("dot.txt"))?;
        let mut alloc_index = 0usize;
        for edge in &self.edges {
            if edge.biggest == 0 {
                continue;
            }
            match &edge.attribution {
                Some(map) => {
                    let per_site = map
                        .iter()
                        .sorted_by(|a, b| b.1.cmp(a.1))
                        .map(|(site, bytes)| format!("{site}: {}", format_with_commas(*bytes)))
                        .join(", ");
                    writeln!(sources, "{alloc_index}: {per_site}")?;
                }
                None => writeln!(sources, "{alloc_index}: <unattributed>")?,
            }
            alloc_index += 1;
        }

        Ok(())
    }
}
