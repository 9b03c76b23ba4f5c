//! Variation graph built from an optimal coverage

pub mod interpret;

use petgraph::Direction;
use petgraph::prelude::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::blocks::{Block, RowSet};
use crate::errors::PangeblocksError;
use crate::msa::{Msa, GAP};

pub use interpret::{interpret, validate_partition, OptimalCoverage, RangeSolution};

/// A graph node: one chosen block with its label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub rows: RowSet,
    pub start: usize,
    pub end: usize,
    pub label: String,
}

impl Segment {
    pub fn is_gap(&self) -> bool {
        !self.label.is_empty() && self.label.bytes().all(|c| c == GAP)
    }
}

/// Traversal of one input sequence through the graph.
#[derive(Debug, Clone)]
pub struct SequencePath {
    pub name: String,
    pub nodes: Vec<NodeIndex>,
}

pub type BlockGraphType = StableDiGraph<Segment, RowSet>;

/// Nodes are chosen blocks, an edge `a -> b` exists when `b` starts right after `a` ends and both
/// share rows, and is labeled with those rows.
#[derive(Debug, Clone, Default)]
pub struct VariationGraph {
    graph: BlockGraphType,
    paths: Vec<SequencePath>,
}

impl VariationGraph {
    /// Build the graph of a coverage. With `verify_labels`, every block is checked to be
    /// row-uniform and, if it carries a label, to match the alignment.
    pub fn from_blocks(msa: &Msa, blocks: &[Block], verify_labels: bool) -> Result<Self, PangeblocksError> {
        let mut sorted: Vec<&Block> = blocks.iter().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut graph = BlockGraphType::default();
        let mut by_start: FxHashMap<usize, Vec<NodeIndex>> = FxHashMap::default();
        let mut paths: Vec<SequencePath> = msa.names().iter()
            .map(|name| SequencePath { name: name.clone(), nodes: Vec::new() })
            .collect();

        for block in sorted {
            if verify_labels {
                msa.check_label(block)?;
            }

            let node = graph.add_node(Segment {
                rows: block.rows().clone(),
                start: block.start(),
                end: block.end(),
                label: msa.label(block),
            });
            by_start.entry(block.start()).or_default().push(node);

            for row in block.rows().iter() {
                if let Some(path) = paths.get_mut(row) {
                    path.nodes.push(node);
                }
            }
        }

        let nodes: Vec<NodeIndex> = graph.node_indices().collect();
        for node in nodes {
            let Some(successors) = by_start.get(&(graph[node].end + 1)) else {
                continue;
            };

            for &succ in successors {
                let shared = graph[node].rows.intersection(&graph[succ].rows);
                if !shared.is_empty() {
                    graph.add_edge(node, succ, shared);
                }
            }
        }

        debug!("Variation graph: {} nodes, {} edges, {} paths.", graph.node_count(), graph.edge_count(), paths.len());

        Ok(Self { graph, paths })
    }

    pub fn graph(&self) -> &BlockGraphType {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn paths(&self) -> &[SequencePath] {
        &self.paths
    }

    pub fn segment(&self, node: NodeIndex) -> &Segment {
        &self.graph[node]
    }

    /// Nodes ordered by start column, then by row set.
    pub fn sorted_nodes(&self) -> Vec<NodeIndex> {
        let mut nodes: Vec<NodeIndex> = self.graph.node_indices().collect();
        nodes.sort_by(|a, b| {
            let (sa, sb) = (&self.graph[*a], &self.graph[*b]);
            (sa.start, sa.end, &sa.rows).cmp(&(sb.start, sb.end, &sb.rows))
        });

        nodes
    }

    /// Edges as `(source, target, shared rows)`.
    pub fn edges(&self) -> impl Iterator<Item=(NodeIndex, NodeIndex, &RowSet)> + '_ {
        self.graph.edge_references()
            .map(|e| (e.source(), e.target(), e.weight()))
    }

    pub fn successors(&self, node: NodeIndex) -> impl Iterator<Item=NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Outgoing)
    }

    /// Remove nodes consisting only of gaps and strip gaps from the remaining labels.
    ///
    /// Each predecessor and successor of a removed node that share rows through it are connected
    /// directly, and the paths skip the removed node. Returns the number of removed nodes.
    pub fn remove_gap_nodes(&mut self) -> usize {
        let gap_nodes: Vec<NodeIndex> = self.graph.node_indices()
            .filter(|n| self.graph[*n].is_gap())
            .collect();

        for &node in &gap_nodes {
            let incoming: Vec<(NodeIndex, RowSet)> = self.graph.edges_directed(node, Direction::Incoming)
                .map(|e| (e.source(), e.weight().clone()))
                .collect();
            let outgoing: Vec<(NodeIndex, RowSet)> = self.graph.edges_directed(node, Direction::Outgoing)
                .map(|e| (e.target(), e.weight().clone()))
                .collect();

            for (pred, in_rows) in &incoming {
                for (succ, out_rows) in &outgoing {
                    let through = in_rows.intersection(out_rows);
                    if through.is_empty() {
                        continue;
                    }

                    match self.graph.find_edge(*pred, *succ) {
                        Some(edge) => {
                            let merged = self.graph[edge].union(&through);
                            self.graph[edge] = merged;
                        },
                        None => {
                            self.graph.add_edge(*pred, *succ, through);
                        }
                    }
                }
            }

            self.graph.remove_node(node);
        }

        for path in self.paths.iter_mut() {
            path.nodes.retain(|n| !gap_nodes.contains(n));
        }

        for segment in self.graph.node_weights_mut() {
            segment.label.retain(|c| c != GAP as char);
        }

        debug!("Removed {} gap-only nodes.", gap_nodes.len());

        gap_nodes.len()
    }
}
