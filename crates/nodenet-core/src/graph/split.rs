use crate::config::IsolatedPolicy;
use crate::error::Result;
use crate::events::GraphEvent;
use crate::graph::NodeGraphEngine;
use crate::types::{GraphId, NodeId};
use std::collections::{BTreeSet, VecDeque};

/// Result of one traversal.
struct Flood {
    members: Vec<NodeId>,
    /// Stopped early because every split seed was reached.
    seeds_reached: bool,
}

impl NodeGraphEngine {
    /// Check `graph` for lost connectivity around `affected` right away.
    ///
    /// `affected` should cover the endpoints of every edge removed from the
    /// graph since it was last known connected; nodes outside the graph are
    /// ignored. Returns the graphs split off.
    pub fn split_check(&mut self, graph: GraphId, affected: &[NodeId]) -> Result<Vec<GraphId>> {
        self.store.graph(graph)?;
        for node in affected {
            if self.graph_of(*node) == Some(graph) {
                self.store.mark_split_seed(*node);
            }
        }
        self.split_queue.remove(&graph);
        self.check_graph(graph)
    }

    /// Full connectivity re-check of `graph`, seeded from every member.
    pub fn force_split_check(&mut self, graph: GraphId) -> Result<Vec<GraphId>> {
        let members: Vec<NodeId> = self.store.graph(graph)?.members.iter().copied().collect();
        for node in members {
            self.store.mark_split_seed(node);
        }
        self.split_queue.remove(&graph);
        self.check_graph(graph)
    }

    /// Check every graph with pending split seeds.
    pub(crate) fn resolve_splits(&mut self) -> Result<()> {
        while let Some(graph) = self.split_queue.pop_first() {
            if self.store.get_graph(graph).is_some() {
                self.check_graph(graph)?;
            }
        }
        Ok(())
    }

    fn check_graph(&mut self, graph: GraphId) -> Result<Vec<GraphId>> {
        let seeds = self.store.take_split_seeds(graph)?;
        let Some(&reference) = seeds.first() else {
            self.detach_if_isolated(graph)?;
            return Ok(Vec::new());
        };
        self.metrics.current.split_checks += 1;

        self.visit_epoch += 1;
        let epoch = self.visit_epoch;
        let member_count = self.store.graph(graph)?.len();

        let first = self.flood(reference, graph, epoch, Some(&seeds))?;
        if first.seeds_reached || first.members.len() == member_count {
            if first.seeds_reached && first.members.len() < member_count {
                self.metrics.current.split_short_circuits += 1;
            }
            self.detach_if_isolated(graph)?;
            return Ok(Vec::new());
        }

        let mut components = vec![first.members];
        let members: Vec<NodeId> = self.store.graph(graph)?.members.iter().copied().collect();
        for node in members {
            if self.store.node(node)?.visit != epoch {
                components.push(self.flood(node, graph, epoch, None)?.members);
            }
        }

        // The largest component keeps the graph; ties go to the reference's.
        let mut keep = 0;
        for (i, component) in components.iter().enumerate() {
            if component.len() > components[keep].len() {
                keep = i;
            }
        }

        log::trace!(
            "Graph {:?} fell apart into {} components",
            graph,
            components.len()
        );

        let mut split_off = Vec::new();
        for (i, component) in components.into_iter().enumerate() {
            if i == keep {
                continue;
            }
            if let Some(split) = self.split_off(graph, component)? {
                split_off.push(split);
            }
        }
        self.detach_if_isolated(graph)?;
        Ok(split_off)
    }

    /// Breadth-first traversal over the current edges, restricted to members
    /// of `graph`. With `seeds`, stops as soon as every seed has been reached.
    fn flood(
        &mut self,
        start: NodeId,
        graph: GraphId,
        epoch: u64,
        seeds: Option<&BTreeSet<NodeId>>,
    ) -> Result<Flood> {
        let mut remaining = seeds.map_or(0, BTreeSet::len);
        let mut members = Vec::new();
        let mut queue = VecDeque::new();

        self.store.node_mut(start)?.visit = epoch;
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            members.push(current);
            if seeds.is_some_and(|s| s.contains(&current)) {
                remaining -= 1;
                if remaining == 0 {
                    return Ok(Flood {
                        members,
                        seeds_reached: true,
                    });
                }
            }

            let degree = self.store.node(current)?.edges.len();
            for i in 0..degree {
                let next = self.store.node(current)?.edges[i].to;
                let Some(n) = self.store.get_node_mut(next) else {
                    continue;
                };
                if n.visit == epoch || n.graph != Some(graph) {
                    continue;
                }
                n.visit = epoch;
                queue.push_back(next);
            }
        }

        Ok(Flood {
            members,
            seeds_reached: false,
        })
    }

    /// Move one component out of `graph` into a graph of its own, or detach it
    /// if it is a lone isolated node whose kind does not keep singletons.
    fn split_off(&mut self, graph: GraphId, component: Vec<NodeId>) -> Result<Option<GraphId>> {
        if let [node] = component.as_slice() {
            if self.is_detachable(*node)? {
                self.leave_graph(*node, None)?;
                self.metrics.current.nodes_detached += 1;
                return Ok(None);
            }
        }

        let kind = self.store.graph(graph)?.kind.clone();
        let split = self.create_graph_internal(kind);
        self.emit(GraphEvent::Splitting {
            graph,
            split,
            leaving: component.clone(),
        });
        for node in &component {
            self.move_node(*node, split)?;
        }
        self.metrics.current.splits += 1;
        self.emit(GraphEvent::Split {
            graph,
            split,
            members: component,
        });
        Ok(Some(split))
    }

    /// A singleton graph whose only member has no edges and a detached kind
    /// is dissolved.
    fn detach_if_isolated(&mut self, graph: GraphId) -> Result<()> {
        let only = {
            let g = self.store.graph(graph)?;
            match g.members.first() {
                Some(node) if g.len() == 1 => *node,
                _ => return Ok(()),
            }
        };
        if self.is_detachable(only)? {
            self.leave_graph(only, None)?;
            self.metrics.current.nodes_detached += 1;
            self.destroy_if_empty(graph)?;
        }
        Ok(())
    }

    fn is_detachable(&self, node: NodeId) -> Result<bool> {
        let n = self.store.node(node)?;
        Ok(n.edges.is_empty()
            && self.config.isolated_policy(&n.kind) == IsolatedPolicy::Detached)
    }
}
