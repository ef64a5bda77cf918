use crate::config::{EngineConfig, InvariantPolicy, IsolatedPolicy, SplitMode};
use crate::error::{NodeNetError, Result};
use crate::events::{EventBus, GraphEvent, GraphObserver, SubscriberId};
use crate::graph::metrics::{EngineMetrics, TickReport};
use crate::graph::poly::{PolyRegistry, ProxyCommand};
use crate::graph::store::{Graph, Node, NodeStore};
use crate::linker::{Autolinker, LinkerRegistry};
use crate::spatial::SpatialIndex;
use crate::types::{GraphId, GraphKind, HostId, NodeId};
use std::collections::{BTreeSet, VecDeque};
use std::time::Instant;

/// The connectivity engine.
///
/// Owns the node/graph store, the autolinkers, the poly hosts and an
/// instance-scoped event bus. All mutation is synchronous: every public
/// operation runs its merges (and, in immediate mode, its splits) to
/// completion before returning. [`NodeGraphEngine::settle`] closes a tick.
pub struct NodeGraphEngine {
    pub(crate) store: NodeStore,
    pub(crate) linkers: LinkerRegistry,
    pub(crate) bus: EventBus,
    pub(crate) polys: PolyRegistry,
    pub(crate) config: EngineConfig,
    /// FIFO of nodes awaiting `update_edges`. May hold stale or cleared
    /// entries; `Node::queued` is authoritative.
    pub(crate) edge_queue: VecDeque<NodeId>,
    /// Nodes that need a singleton graph at settle if nothing linked them.
    pub(crate) pending_graph: Vec<NodeId>,
    /// Graphs with split seeds awaiting a check.
    pub(crate) split_queue: BTreeSet<GraphId>,
    pub(crate) metrics: EngineMetrics,
    pub(crate) visit_epoch: u64,
    pub(crate) tick: u64,
}

impl NodeGraphEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: NodeStore::new(),
            linkers: LinkerRegistry::new(),
            bus: EventBus::new(),
            polys: PolyRegistry::new(),
            config,
            edge_queue: VecDeque::new(),
            pending_graph: Vec::new(),
            split_queue: BTreeSet::new(),
            metrics: EngineMetrics::new(),
            visit_epoch: 0,
            tick: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn register_linker(&mut self, linker: Box<dyn Autolinker>) {
        log::debug!("Registered autolinker '{}'", linker.name());
        self.linkers.register(linker);
    }

    pub fn linkers(&self) -> &LinkerRegistry {
        &self.linkers
    }

    pub fn subscribe(&mut self, observer: Box<dyn GraphObserver>) -> SubscriberId {
        self.bus.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.bus.unsubscribe(id)
    }

    // ---- Lookups ----

    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn store_mut(&mut self) -> &mut NodeStore {
        &mut self.store
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.store.node(id)
    }

    pub fn graph(&self, id: GraphId) -> Result<&Graph> {
        self.store.graph(id)
    }

    pub fn graph_of(&self, node: NodeId) -> Option<GraphId> {
        self.store.get_node(node)?.graph
    }

    /// The plain node of a host. None for poly hosts and unknown hosts.
    pub fn host_node(&self, host: HostId) -> Option<NodeId> {
        if self.polys.contains_key(&host) {
            return None;
        }
        self.store.host_nodes(host).first().copied()
    }

    pub fn host_nodes(&self, host: HostId) -> &[NodeId] {
        self.store.host_nodes(host)
    }

    pub fn graphs(&self) -> impl Iterator<Item = (GraphId, &Graph)> {
        self.store.graphs()
    }

    pub fn node_count(&self) -> usize {
        self.store.node_count()
    }

    pub fn graph_count(&self) -> usize {
        self.store.graph_count()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Ticks settled so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn pending_edge_updates(&self) -> usize {
        self.store.nodes().filter(|(_, n)| n.queued).count()
    }

    // ---- Node lifecycle ----

    /// Create the single node of a plain host.
    ///
    /// The node starts without a graph and with a queued edge update; it gets
    /// a singleton graph at the next settle unless an edge reaches it first
    /// or its kind uses the detached policy.
    pub fn create_node(&mut self, host: HostId, kind: GraphKind) -> Result<NodeId> {
        if self.polys.contains_key(&host) || !self.store.host_nodes(host).is_empty() {
            return Err(NodeNetError::HostAlreadyLinked(host));
        }
        let node = self.store.create_node(host, kind, None);
        self.node_created(node)?;
        Ok(node)
    }

    pub(crate) fn node_created(&mut self, node: NodeId) -> Result<()> {
        let kind = self.store.node(node)?.kind.clone();
        log::trace!("Created {} node {:?}", kind, node);
        if self.config.isolated_policy(&kind) == IsolatedPolicy::SingletonGraph {
            self.pending_graph.push(node);
        }
        self.queue_edge_update(node)?;
        Ok(())
    }

    /// Tear a node down: every edge is removed with its own events and split
    /// seeds, then the node leaves its graph, which is destroyed if empty.
    ///
    /// Split checks only run once the node is out of its graph, so the
    /// departing node never competes for the graph id.
    pub fn destroy_node(&mut self, node: NodeId) -> Result<()> {
        self.clear_edge_update(node)?;

        let neighbours: Vec<NodeId> = self.store.node(node)?.neighbours().collect();
        for other in neighbours {
            self.unlink_seeded(node, other)?;
        }

        if let Some(graph) = self.leave_graph(node, None)? {
            self.destroy_if_empty(graph)?;
        }

        let removed = self.store.remove_node(node)?;
        if let Some(key) = &removed.proxy {
            self.forget_proxy(removed.host, key);
        }
        log::trace!("Destroyed {} node {:?}", removed.kind, node);
        self.maybe_split_now()
    }

    // ---- Host lifecycle ----

    /// The host changed position. Its nodes re-evaluate their edges at the next settle.
    pub fn host_moved(&mut self, host: HostId) -> Result<usize> {
        self.requeue_host(host)
    }

    /// The host was anchored or unanchored.
    pub fn host_anchored(&mut self, host: HostId) -> Result<usize> {
        self.requeue_host(host)
    }

    /// Destroy every node of a host, proxies included, then forget the host.
    pub fn host_destroyed(&mut self, host: HostId) -> Result<()> {
        let nodes = self.store.host_nodes(host).to_vec();
        if nodes.is_empty() && !self.polys.contains_key(&host) {
            return Err(NodeNetError::HostNotFound(host));
        }

        // The poly handler stays registered until its proxies are gone so it
        // sees their removal events.
        for node in nodes {
            self.destroy_node(node)?;
        }
        self.polys.remove(&host);
        Ok(())
    }

    fn requeue_host(&mut self, host: HostId) -> Result<usize> {
        if self.polys.contains_key(&host) {
            return self.relay_to_proxies(host, ProxyCommand::QueueEdgeUpdate);
        }

        let nodes = self.store.host_nodes(host).to_vec();
        if nodes.is_empty() {
            return Err(NodeNetError::HostNotFound(host));
        }
        for node in &nodes {
            self.queue_edge_update(*node)?;
        }
        Ok(nodes.len())
    }

    // ---- Edge update queue ----

    /// Returns false if the node was already queued.
    pub fn queue_edge_update(&mut self, node: NodeId) -> Result<bool> {
        let n = self.store.node_mut(node)?;
        if n.queued {
            return Ok(false);
        }
        n.queued = true;
        self.edge_queue.push_back(node);
        Ok(true)
    }

    /// Returns false if the node was not queued.
    pub fn clear_edge_update(&mut self, node: NodeId) -> Result<bool> {
        let n = self.store.node_mut(node)?;
        Ok(std::mem::replace(&mut n.queued, false))
    }

    // ---- Settlement ----

    /// Close a tick: process queued edge updates, give pending isolated nodes
    /// their graphs, run the deferred split pass and verify the structure.
    pub fn settle(&mut self, spatial: &dyn SpatialIndex) -> Result<TickReport> {
        let started = Instant::now();

        let budget = self.config.max_edge_updates_per_tick;
        let mut processed = 0;
        while budget == 0 || processed < budget {
            let Some(node) = self.edge_queue.pop_front() else {
                break;
            };
            match self.store.get_node_mut(node) {
                Some(n) if n.queued => n.queued = false,
                _ => continue,
            }
            self.update_edges(node, spatial)?;
            processed += 1;
        }
        self.metrics.current.edge_updates += processed as u64;

        self.resolve_splits()?;

        for node in std::mem::take(&mut self.pending_graph) {
            let needs_graph = self
                .store
                .get_node(node)
                .is_some_and(|n| n.graph.is_none());
            if needs_graph {
                self.ensure_graph(node)?;
            }
        }

        if self.config.verify_on_settle {
            self.verify()?;
        }

        self.tick += 1;
        let duration = started.elapsed();
        let counters = self.metrics.finish_tick(duration);
        let report = TickReport {
            tick: self.tick,
            counters,
            duration,
            pending_edge_updates: self.pending_edge_updates(),
            graphs: self.store.graph_count(),
            nodes: self.store.node_count(),
        };

        if self.config.debug_broadcast {
            let snapshot = self.snapshot();
            self.emit(GraphEvent::Snapshot(Box::new(snapshot)));
        }

        if report.counters.is_quiet() {
            log::trace!("{}", report.summary());
        } else {
            log::debug!("{}", report.summary());
        }
        Ok(report)
    }

    fn verify(&mut self) -> Result<()> {
        let violations = self.check_invariants();
        if violations.is_empty() {
            return Ok(());
        }

        self.metrics.current.invariant_violations += violations.len() as u64;
        for violation in &violations {
            log::error!("Graph invariant violated: {}", violation);
        }

        match self.config.invariant_policy {
            InvariantPolicy::Panic => panic!(
                "{} graph invariant violation(s) after settle: {:?}",
                violations.len(),
                violations
            ),
            InvariantPolicy::Heal => {
                self.heal(&violations)?;
                let remaining = self.check_invariants();
                if !remaining.is_empty() {
                    log::error!(
                        "{} graph invariant violation(s) remain after healing",
                        remaining.len()
                    );
                }
            }
        }
        Ok(())
    }

    /// Run split checks right away in immediate mode.
    pub(crate) fn maybe_split_now(&mut self) -> Result<()> {
        if self.config.split_mode == SplitMode::Immediate {
            self.resolve_splits()?;
        }
        Ok(())
    }

    // ---- Membership helpers ----

    /// Raise an event, relaying it to the owning poly host if it concerns a proxy.
    pub(crate) fn emit(&mut self, event: GraphEvent) {
        let relay = event.node().and_then(|node| self.relay_for(node, &event));
        self.bus.publish(event);
        if let Some(relay) = relay {
            self.deliver_relay(&relay);
            self.bus.publish(GraphEvent::ProxyRelayed(relay));
        }
    }

    pub(crate) fn create_graph_internal(&mut self, kind: GraphKind) -> GraphId {
        let graph = self.store.create_graph(kind.clone());
        self.metrics.current.graphs_created += 1;
        self.emit(GraphEvent::GraphCreated { graph, kind });
        graph
    }

    /// Destroy `graph` if it has no members left. Returns whether it was destroyed.
    pub(crate) fn destroy_if_empty(&mut self, graph: GraphId) -> Result<bool> {
        match self.store.get_graph(graph) {
            Some(g) if g.is_empty() => {}
            _ => return Ok(false),
        }
        let removed = self.store.destroy_graph(graph)?;
        self.split_queue.remove(&graph);
        self.metrics.current.graphs_destroyed += 1;
        self.emit(GraphEvent::GraphDestroyed {
            graph,
            kind: removed.kind,
        });
        Ok(true)
    }

    /// Take a node out of its graph. Returns the graph it left.
    pub(crate) fn leave_graph(
        &mut self,
        node: NodeId,
        next: Option<GraphId>,
    ) -> Result<Option<GraphId>> {
        let Some((graph, _)) = self.store.detach(node)? else {
            return Ok(None);
        };
        self.emit(GraphEvent::NodeRemoved { graph, node, next });
        Ok(Some(graph))
    }

    /// Put a graph-less node into `graph`.
    pub(crate) fn join_graph(&mut self, node: NodeId, graph: GraphId) -> Result<()> {
        self.store.attach(node, graph, false)?;
        self.emit(GraphEvent::NodeAdded {
            graph,
            node,
            prev: None,
        });
        Ok(())
    }

    /// Hand a node from its graph to `to`, carrying any pending split seed.
    pub(crate) fn move_node(&mut self, node: NodeId, to: GraphId) -> Result<()> {
        let (from, seed) = match self.store.detach(node)? {
            Some(left) => left,
            None => return self.join_graph(node, to),
        };
        self.emit(GraphEvent::NodeRemoved {
            graph: from,
            node,
            next: Some(to),
        });

        self.store.attach(node, to, seed)?;
        if seed {
            self.split_queue.insert(to);
        }
        self.metrics.current.nodes_moved += 1;
        self.emit(GraphEvent::NodeAdded {
            graph: to,
            node,
            prev: Some(from),
        });
        Ok(())
    }

    /// The node's graph, creating a singleton for it if it has none.
    pub(crate) fn ensure_graph(&mut self, node: NodeId) -> Result<GraphId> {
        let n = self.store.node(node)?;
        if let Some(graph) = n.graph {
            return Ok(graph);
        }
        let kind = n.kind.clone();
        let graph = self.create_graph_internal(kind);
        self.join_graph(node, graph)?;
        Ok(graph)
    }

    /// Record that `node` may have lost connectivity within its graph.
    pub(crate) fn seed_split(&mut self, node: NodeId) {
        if let Some(graph) = self.store.mark_split_seed(node) {
            self.split_queue.insert(graph);
        }
    }
}

impl std::fmt::Debug for NodeGraphEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeGraphEngine")
            .field("nodes", &self.store.node_count())
            .field("graphs", &self.store.graph_count())
            .field("linkers", &self.linkers)
            .field("bus", &self.bus)
            .field("tick", &self.tick)
            .finish()
    }
}
