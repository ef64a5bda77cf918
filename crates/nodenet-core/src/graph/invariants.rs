use crate::config::IsolatedPolicy;
use crate::error::Result;
use crate::graph::NodeGraphEngine;
use crate::types::{GraphId, NodeId};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet, VecDeque};
use thiserror::Error;

/// A broken structural invariant found by [`NodeGraphEngine::check_invariants`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvariantViolation {
    #[error("graph {graph:?} lists missing node {node:?}")]
    DanglingMember { graph: GraphId, node: NodeId },

    #[error("graph {graph:?} lists node {node:?}, which belongs to {actual:?}")]
    MembershipMismatch {
        graph: GraphId,
        node: NodeId,
        actual: Option<GraphId>,
    },

    #[error("node {node:?} claims graph {graph:?}, which does not list it")]
    UnlistedMember { graph: GraphId, node: NodeId },

    #[error("node {node:?} points at missing graph {graph:?}")]
    MissingGraph { node: NodeId, graph: GraphId },

    #[error("graph {graph:?} is split into {components} components")]
    Disconnected { graph: GraphId, components: usize },

    #[error("edge {node:?}-{other:?} crosses graphs")]
    CrossGraphEdge { node: NodeId, other: NodeId },

    #[error("edge {node:?}-{other:?} has no matching mirror")]
    AsymmetricEdge { node: NodeId, other: NodeId },

    #[error("node {node:?} has an edge to itself")]
    SelfEdge { node: NodeId },

    #[error("graph {graph:?} has no members")]
    EmptyGraph { graph: GraphId },

    #[error("node {node:?} is in graph {graph:?} of another kind")]
    KindMismatch { graph: GraphId, node: NodeId },

    #[error("node {node:?} has no graph")]
    Ungraphed { node: NodeId },
}

impl NodeGraphEngine {
    /// Verify the whole structure. O(nodes + edges).
    ///
    /// Meaningful once settled: between mutations, new nodes legitimately
    /// wait for their graph.
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();

        for (graph, g) in self.store.graphs() {
            if g.is_empty() {
                violations.push(InvariantViolation::EmptyGraph { graph });
                continue;
            }

            for &node in &g.members {
                match self.store.get_node(node) {
                    None => violations.push(InvariantViolation::DanglingMember { graph, node }),
                    Some(n) if n.graph != Some(graph) => {
                        violations.push(InvariantViolation::MembershipMismatch {
                            graph,
                            node,
                            actual: n.graph,
                        })
                    }
                    Some(n) if n.kind != g.kind => {
                        violations.push(InvariantViolation::KindMismatch { graph, node })
                    }
                    Some(_) => {}
                }
            }

            let components = self.count_components(graph);
            if components > 1 {
                violations.push(InvariantViolation::Disconnected { graph, components });
            }
        }

        for (node, n) in self.store.nodes() {
            match n.graph {
                Some(graph) => match self.store.get_graph(graph) {
                    None => violations.push(InvariantViolation::MissingGraph { node, graph }),
                    Some(g) if !g.contains(node) => {
                        violations.push(InvariantViolation::UnlistedMember { graph, node })
                    }
                    Some(_) => {}
                },
                None => {
                    let keeps_singleton = self.config.isolated_policy(&n.kind)
                        == IsolatedPolicy::SingletonGraph;
                    if !n.edges.is_empty() || keeps_singleton {
                        violations.push(InvariantViolation::Ungraphed { node });
                    }
                }
            }

            for edge in &n.edges {
                if edge.to == node {
                    violations.push(InvariantViolation::SelfEdge { node });
                    continue;
                }
                let Some(other) = self.store.get_node(edge.to) else {
                    violations.push(InvariantViolation::AsymmetricEdge {
                        node,
                        other: edge.to,
                    });
                    continue;
                };
                if other.edge_to(node) != Some(edge.flags.invert()) {
                    violations.push(InvariantViolation::AsymmetricEdge {
                        node,
                        other: edge.to,
                    });
                } else if other.graph != n.graph && node < edge.to {
                    violations.push(InvariantViolation::CrossGraphEdge {
                        node,
                        other: edge.to,
                    });
                }
            }
        }

        violations
    }

    /// Connected components among the live members of `graph`, using only
    /// edges between members.
    fn count_components(&self, graph: GraphId) -> usize {
        let Some(g) = self.store.get_graph(graph) else {
            return 0;
        };
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut components = 0;

        for &start in &g.members {
            if seen.contains(&start) || self.store.get_node(start).is_none() {
                continue;
            }
            components += 1;
            seen.insert(start);
            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                let Some(n) = self.store.get_node(current) else {
                    continue;
                };
                for next in n.neighbours() {
                    if g.members.contains(&next) && seen.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        components
    }

    /// Repair what `check_invariants` reported, then re-derive the partition
    /// of every graph involved from the current edges.
    pub(crate) fn heal(&mut self, violations: &[InvariantViolation]) -> Result<()> {
        let mut recheck: BTreeSet<GraphId> = BTreeSet::new();

        for violation in violations {
            match *violation {
                InvariantViolation::DanglingMember { graph, node }
                | InvariantViolation::MembershipMismatch { graph, node, .. } => {
                    self.store.drop_member(graph, node);
                    recheck.insert(graph);
                }
                InvariantViolation::UnlistedMember { graph, node } => {
                    self.store.restore_member(graph, node);
                    recheck.insert(graph);
                }
                InvariantViolation::MissingGraph { node, .. } => {
                    self.store.clear_graph_ref(node);
                }
                InvariantViolation::KindMismatch { graph, node } => {
                    self.store.drop_member(graph, node);
                    self.store.clear_graph_ref(node);
                    recheck.insert(graph);
                }
                InvariantViolation::SelfEdge { node } => {
                    self.store.drop_half_edge(node, node);
                }
                InvariantViolation::AsymmetricEdge { node, other } => {
                    self.store.drop_half_edge(node, other);
                    self.store.drop_half_edge(other, node);
                    for end in [node, other] {
                        if self.store.contains_node(end) {
                            self.queue_edge_update(end)?;
                            self.seed_split(end);
                        }
                    }
                }
                InvariantViolation::Disconnected { graph, .. } => {
                    recheck.insert(graph);
                }
                InvariantViolation::CrossGraphEdge { .. }
                | InvariantViolation::EmptyGraph { .. }
                | InvariantViolation::Ungraphed { .. } => {}
            }
        }

        // Nodes that must have a graph get one.
        let ungraphed: Vec<NodeId> = self
            .store
            .nodes()
            .filter(|(_, n)| {
                n.graph.is_none()
                    && (!n.edges.is_empty()
                        || self.config.isolated_policy(&n.kind) == IsolatedPolicy::SingletonGraph)
            })
            .map(|(id, _)| id)
            .collect();
        for node in ungraphed {
            self.ensure_graph(node)?;
        }

        // Edges crossing graphs pull them together.
        let crossing: Vec<(NodeId, NodeId)> = self
            .store
            .nodes()
            .flat_map(|(id, n)| n.neighbours().map(move |other| (id, other)))
            .filter(|(a, b)| a < b)
            .collect();
        for (a, b) in crossing {
            let (Some(ga), Some(gb)) = (self.graph_of(a), self.graph_of(b)) else {
                continue;
            };
            if ga == gb {
                continue;
            }
            match self.merge_graphs(ga, gb) {
                Ok(survivor) => {
                    recheck.insert(survivor);
                }
                Err(e) => log::warn!("Could not merge {:?} and {:?} while healing: {}", ga, gb, e),
            }
        }

        let empty: Vec<GraphId> = self
            .store
            .graphs()
            .filter(|(_, g)| g.is_empty())
            .map(|(id, _)| id)
            .collect();
        for graph in empty {
            self.destroy_if_empty(graph)?;
        }

        for graph in recheck {
            if self.store.get_graph(graph).is_some() {
                self.force_split_check(graph)?;
            }
        }
        self.resolve_splits()?;

        log::warn!("Healed {} graph invariant violation(s)", violations.len());
        Ok(())
    }
}
