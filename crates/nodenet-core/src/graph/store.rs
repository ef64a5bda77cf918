use crate::error::{NodeNetError, Result};
use crate::types::{EdgeFlags, GraphId, GraphKind, HalfEdge, HostId, NodeId, ProxyKey};
use slotmap::SlotMap;
use std::collections::{BTreeSet, HashMap};

/// A single graph participant attached to one host.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) host: HostId,
    pub(crate) kind: GraphKind,
    /// Set for proxies of a poly host.
    pub(crate) proxy: Option<ProxyKey>,
    pub(crate) graph: Option<GraphId>,
    /// Symmetric adjacency; the other endpoint holds the inverted half.
    pub(crate) edges: Vec<HalfEdge>,
    /// Waiting in the engine's edge update queue.
    pub(crate) queued: bool,
    /// Traversal epoch of the last split check that reached this node.
    pub(crate) visit: u64,
}

impl Node {
    pub fn host(&self) -> HostId {
        self.host
    }

    pub fn kind(&self) -> &GraphKind {
        &self.kind
    }

    pub fn proxy(&self) -> Option<&ProxyKey> {
        self.proxy.as_ref()
    }

    pub fn is_proxy(&self) -> bool {
        self.proxy.is_some()
    }

    pub fn graph(&self) -> Option<GraphId> {
        self.graph
    }

    pub fn edges(&self) -> &[HalfEdge] {
        &self.edges
    }

    pub fn degree(&self) -> usize {
        self.edges.len()
    }

    pub fn neighbours(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.edges.iter().map(|e| e.to)
    }

    pub fn edge_to(&self, other: NodeId) -> Option<EdgeFlags> {
        self.edges.iter().find(|e| e.to == other).map(|e| e.flags)
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }
}

/// A connected set of nodes of one kind.
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) kind: GraphKind,
    pub(crate) members: BTreeSet<NodeId>,
    /// Members touched by a removal since the last split check.
    pub(crate) split_seeds: BTreeSet<NodeId>,
}

impl Graph {
    pub fn kind(&self) -> &GraphKind {
        &self.kind
    }

    pub fn members(&self) -> &BTreeSet<NodeId> {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.members.contains(&node)
    }

    pub fn needs_split_check(&self) -> bool {
        !self.split_seeds.is_empty()
    }
}

/// Authoritative storage of nodes, graphs, membership and adjacency.
///
/// The store keeps both halves of every edge and both sides of every
/// membership fact in step. It makes no merge or split decisions; the engine
/// drives those and emits the matching events.
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: SlotMap<NodeId, Node>,
    graphs: SlotMap<GraphId, Graph>,
    hosts: HashMap<HostId, Vec<NodeId>>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- Nodes ----

    /// Allocate a node that belongs to no graph yet.
    pub fn create_node(
        &mut self,
        host: HostId,
        kind: GraphKind,
        proxy: Option<ProxyKey>,
    ) -> NodeId {
        let id = self.nodes.insert(Node {
            host,
            kind,
            proxy,
            graph: None,
            edges: Vec::new(),
            queued: false,
            visit: 0,
        });
        self.hosts.entry(host).or_default().push(id);
        id
    }

    /// Free a node. It must already be out of its graph and have no edges.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node> {
        let node = self.node(id)?;
        if !node.edges.is_empty() || node.graph.is_some() {
            return Err(NodeNetError::NodeStillLinked(id));
        }

        let node = self.nodes.remove(id).ok_or(NodeNetError::NodeNotFound(id))?;
        if let Some(list) = self.hosts.get_mut(&node.host) {
            list.retain(|n| *n != id);
            if list.is_empty() {
                self.hosts.remove(&node.host);
            }
        }
        Ok(node)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id).ok_or(NodeNetError::NodeNotFound(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes.get_mut(id).ok_or(NodeNetError::NodeNotFound(id))
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn get_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes owned by a host, in creation order.
    pub fn host_nodes(&self, host: HostId) -> &[NodeId] {
        self.hosts.get(&host).map(Vec::as_slice).unwrap_or(&[])
    }

    // ---- Graphs ----

    pub fn create_graph(&mut self, kind: GraphKind) -> GraphId {
        self.graphs.insert(Graph {
            kind,
            members: BTreeSet::new(),
            split_seeds: BTreeSet::new(),
        })
    }

    /// Only valid once the graph has no members.
    pub fn destroy_graph(&mut self, id: GraphId) -> Result<Graph> {
        if !self.graph(id)?.members.is_empty() {
            return Err(NodeNetError::GraphNotEmpty(id));
        }
        self.graphs.remove(id).ok_or(NodeNetError::GraphNotFound(id))
    }

    pub fn graph(&self, id: GraphId) -> Result<&Graph> {
        self.graphs.get(id).ok_or(NodeNetError::GraphNotFound(id))
    }

    pub fn get_graph(&self, id: GraphId) -> Option<&Graph> {
        self.graphs.get(id)
    }

    pub fn graphs(&self) -> impl Iterator<Item = (GraphId, &Graph)> {
        self.graphs.iter()
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    /// Undirected edge count.
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.edges.len()).sum::<usize>() / 2
    }

    // ---- Membership ----

    /// Put a graph-less node into `graph`, optionally still carrying a split seed.
    pub(crate) fn attach(&mut self, node: NodeId, graph: GraphId, seed: bool) -> Result<()> {
        let entry = self
            .graphs
            .get_mut(graph)
            .ok_or(NodeNetError::GraphNotFound(graph))?;
        let n = self
            .nodes
            .get_mut(node)
            .ok_or(NodeNetError::NodeNotFound(node))?;
        debug_assert!(n.graph.is_none(), "attach of a node that already has a graph");

        n.graph = Some(graph);
        entry.members.insert(node);
        if seed {
            entry.split_seeds.insert(node);
        }
        Ok(())
    }

    /// Take a node out of its graph. Returns the graph it left and whether it
    /// was a pending split seed there.
    pub(crate) fn detach(&mut self, node: NodeId) -> Result<Option<(GraphId, bool)>> {
        let n = self.node_mut(node)?;
        let Some(graph) = n.graph.take() else {
            return Ok(None);
        };
        let entry = self
            .graphs
            .get_mut(graph)
            .ok_or(NodeNetError::GraphNotFound(graph))?;
        entry.members.remove(&node);
        let seed = entry.split_seeds.remove(&node);
        Ok(Some((graph, seed)))
    }

    /// Record that `node` may have lost connectivity. Returns its graph.
    pub(crate) fn mark_split_seed(&mut self, node: NodeId) -> Option<GraphId> {
        let graph = self.nodes.get(node)?.graph?;
        self.graphs.get_mut(graph)?.split_seeds.insert(node);
        Some(graph)
    }

    pub(crate) fn take_split_seeds(&mut self, graph: GraphId) -> Result<BTreeSet<NodeId>> {
        let entry = self
            .graphs
            .get_mut(graph)
            .ok_or(NodeNetError::GraphNotFound(graph))?;
        Ok(std::mem::take(&mut entry.split_seeds))
    }

    // ---- Edges ----

    /// Check that an edge between the two nodes would be legal.
    pub fn check_linkable(&self, a: NodeId, b: NodeId) -> Result<()> {
        if a == b {
            return Err(NodeNetError::SelfEdge(a));
        }
        let (na, nb) = (self.node(a)?, self.node(b)?);
        if na.kind != nb.kind {
            return Err(NodeNetError::IncompatibleKinds {
                from: na.kind.clone(),
                to: nb.kind.clone(),
            });
        }
        Ok(())
    }

    /// Create the edge a-b. `flags` are from `a`'s side.
    pub(crate) fn link(&mut self, a: NodeId, b: NodeId, flags: EdgeFlags) -> Result<()> {
        self.check_linkable(a, b)?;
        debug_assert!(self.edge_flags(a, b).is_none(), "link of an existing edge");

        self.node_mut(a)?.edges.push(HalfEdge::new(b, flags));
        self.node_mut(b)?.edges.push(HalfEdge::new(a, flags.invert()));
        Ok(())
    }

    /// Remove the edge a-b, returning its flags from `a`'s side.
    pub fn unlink(&mut self, a: NodeId, b: NodeId) -> Result<EdgeFlags> {
        let flags = self
            .drop_half_edge(a, b)
            .ok_or(NodeNetError::EdgeNotFound { from: a, to: b })?;
        self.drop_half_edge(b, a);
        Ok(flags)
    }

    /// Overwrite the flags of a-b. Returns the previous flags from `a`'s side.
    pub(crate) fn relink(&mut self, a: NodeId, b: NodeId, flags: EdgeFlags) -> Result<EdgeFlags> {
        let half = self
            .node_mut(a)?
            .edges
            .iter_mut()
            .find(|e| e.to == b)
            .ok_or(NodeNetError::EdgeNotFound { from: a, to: b })?;
        let old = std::mem::replace(&mut half.flags, flags);

        if let Some(mirror) = self
            .nodes
            .get_mut(b)
            .and_then(|n| n.edges.iter_mut().find(|e| e.to == a))
        {
            mirror.flags = flags.invert();
        }
        Ok(old)
    }

    /// Flags of a-b from `a`'s side.
    pub fn edge_flags(&self, a: NodeId, b: NodeId) -> Option<EdgeFlags> {
        self.nodes.get(a)?.edge_to(b)
    }

    // ---- Raw repairs, used when healing a corrupted structure ----

    pub(crate) fn drop_half_edge(&mut self, node: NodeId, other: NodeId) -> Option<EdgeFlags> {
        let edges = &mut self.nodes.get_mut(node)?.edges;
        let index = edges.iter().position(|e| e.to == other)?;
        Some(edges.remove(index).flags)
    }

    pub(crate) fn drop_member(&mut self, graph: GraphId, node: NodeId) {
        if let Some(entry) = self.graphs.get_mut(graph) {
            entry.members.remove(&node);
            entry.split_seeds.remove(&node);
        }
    }

    pub(crate) fn restore_member(&mut self, graph: GraphId, node: NodeId) {
        if let Some(entry) = self.graphs.get_mut(graph) {
            entry.members.insert(node);
        }
    }

    pub(crate) fn clear_graph_ref(&mut self, node: NodeId) {
        if let Some(n) = self.nodes.get_mut(node) {
            n.graph = None;
        }
    }
}
