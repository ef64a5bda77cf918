use crate::error::{NodeNetError, Result};
use crate::events::GraphEvent;
use crate::graph::NodeGraphEngine;
use crate::types::{GraphId, NodeId};

impl NodeGraphEngine {
    /// Unify the graphs of two adjacent nodes. Graph-less endpoints get a
    /// singleton graph first. Returns the graph both nodes end up in.
    pub fn merge_at(&mut self, a: NodeId, b: NodeId) -> Result<GraphId> {
        if self.store.edge_flags(a, b).is_none() {
            return Err(NodeNetError::EdgeNotFound { from: a, to: b });
        }
        let ga = self.ensure_graph(a)?;
        let gb = self.ensure_graph(b)?;
        self.merge_graphs(ga, gb)
    }

    /// Union by size: the larger graph survives, ties go to the lower id, so
    /// the result never depends on operand order.
    pub(crate) fn merge_graphs(&mut self, ga: GraphId, gb: GraphId) -> Result<GraphId> {
        if ga == gb {
            return Ok(ga);
        }

        let (a, b) = (self.store.graph(ga)?, self.store.graph(gb)?);
        if a.kind != b.kind {
            return Err(NodeNetError::IncompatibleKinds {
                from: a.kind.clone(),
                to: b.kind.clone(),
            });
        }
        let (survivor, absorbed) = if a.len() > b.len() || (a.len() == b.len() && ga < gb) {
            (ga, gb)
        } else {
            (gb, ga)
        };

        self.emit(GraphEvent::Merging { survivor, absorbed });

        let moved: Vec<NodeId> = self.store.graph(absorbed)?.members.iter().copied().collect();
        for node in &moved {
            self.move_node(*node, survivor)?;
        }
        self.destroy_if_empty(absorbed)?;

        self.metrics.current.merges += 1;
        log::trace!(
            "Merged {:?} into {:?} ({} nodes moved)",
            absorbed,
            survivor,
            moved.len()
        );
        self.emit(GraphEvent::Merged {
            survivor,
            absorbed,
            moved,
        });
        Ok(survivor)
    }
}
