use crate::graph::NodeGraphEngine;
use crate::types::{EdgeFlags, GraphId, GraphKind, HostId, NodeId, ProxyKey};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Full state of the structure for a debug overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphSnapshot {
    pub tick: u64,
    pub taken_at: DateTime<Utc>,
    pub graphs: Vec<GraphView>,
    /// Nodes currently without a graph.
    pub detached: Vec<NodeView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphView {
    pub id: GraphId,
    pub kind: GraphKind,
    pub nodes: Vec<NodeView>,
    /// Each edge once, with flags from the `from` side.
    pub edges: Vec<EdgeView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub id: NodeId,
    pub host: HostId,
    pub proxy: Option<ProxyKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeView {
    pub from: NodeId,
    pub to: NodeId,
    pub flags: EdgeFlags,
}

impl GraphSnapshot {
    pub fn node_count(&self) -> usize {
        self.graphs.iter().map(|g| g.nodes.len()).sum::<usize>() + self.detached.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graphs.iter().map(|g| g.edges.len()).sum()
    }
}

impl NodeGraphEngine {
    /// Capture every graph, its members and edges.
    pub fn snapshot(&self) -> GraphSnapshot {
        let view = |id: NodeId| {
            self.store.get_node(id).map(|n| NodeView {
                id,
                host: n.host,
                proxy: n.proxy.clone(),
            })
        };

        let graphs = self
            .store
            .graphs()
            .map(|(id, graph)| {
                let nodes = graph.members.iter().filter_map(|m| view(*m)).collect();
                let edges = graph
                    .members
                    .iter()
                    .filter_map(|m| self.store.get_node(*m).map(|n| (*m, n)))
                    .flat_map(|(from, n)| {
                        n.edges
                            .iter()
                            .filter(move |e| from < e.to)
                            .map(move |e| EdgeView {
                                from,
                                to: e.to,
                                flags: e.flags,
                            })
                    })
                    .collect();
                GraphView {
                    id,
                    kind: graph.kind.clone(),
                    nodes,
                    edges,
                }
            })
            .collect();

        let detached = self
            .store
            .nodes()
            .filter(|(_, n)| n.graph.is_none())
            .filter_map(|(id, _)| view(id))
            .collect();

        GraphSnapshot {
            tick: self.tick,
            taken_at: Utc::now(),
            graphs,
            detached,
        }
    }
}
