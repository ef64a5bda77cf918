use nodenet_core::kinds::defaults;
use nodenet_core::{
    new_host_id, EdgeFlags, EngineConfig, GridIndex, HostId, InvariantPolicy, IsolatedPolicy,
    NodeGraphEngine, NodeId, NodeNetError, Placement, ProxyKey, SpatialIndex, SplitMode, TileAdjacencyLinker,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
enum Op {
    Place { x: i32, y: i32, pipe: bool },
    Poly { x: i32, y: i32 },
    AddProxy { slot: usize, key: u8, pipe: bool },
    RemoveProxy { slot: usize, key: u8 },
    Remove(usize),
    Move { slot: usize, x: i32, y: i32 },
    ToggleAnchor(usize),
    Link(usize, usize),
    Unlink(usize, usize),
    SetEdge(usize, usize, u32),
    Settle,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        5 => (0..6i32, 0..6i32, any::<bool>()).prop_map(|(x, y, pipe)| Op::Place { x, y, pipe }),
        2 => (0..6i32, 0..6i32).prop_map(|(x, y)| Op::Poly { x, y }),
        3 => (any::<usize>(), 0..3u8, any::<bool>())
            .prop_map(|(slot, key, pipe)| Op::AddProxy { slot, key, pipe }),
        1 => (any::<usize>(), 0..3u8).prop_map(|(slot, key)| Op::RemoveProxy { slot, key }),
        2 => any::<usize>().prop_map(Op::Remove),
        2 => (any::<usize>(), 0..6i32, 0..6i32).prop_map(|(slot, x, y)| Op::Move { slot, x, y }),
        1 => any::<usize>().prop_map(Op::ToggleAnchor),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Link(a, b)),
        1 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Unlink(a, b)),
        1 => (any::<usize>(), any::<usize>(), 0..4u32)
            .prop_map(|(a, b, bit)| Op::SetEdge(a, b, bit)),
        2 => Just(Op::Settle),
    ]
}

struct Sim {
    engine: NodeGraphEngine,
    grid: GridIndex,
}

impl Sim {
    fn new(mode: SplitMode) -> Self {
        let config = EngineConfig::new()
            .with_split_mode(mode)
            .with_invariant_policy(InvariantPolicy::Panic)
            .with_verify_on_settle(true)
            .with_kind_policy(defaults::pipe(), IsolatedPolicy::Detached);
        let mut engine = NodeGraphEngine::new(config).unwrap();
        engine.register_linker(Box::new(TileAdjacencyLinker::new()));
        Self {
            engine,
            grid: GridIndex::new(),
        }
    }

    /// One node of `host`: its plain node, or one of its proxies. None for a
    /// poly host without proxies.
    fn node(&self, host: HostId, i: usize) -> Option<NodeId> {
        let nodes = self.engine.host_nodes(host);
        (!nodes.is_empty()).then(|| nodes[i % nodes.len()])
    }

    fn pair(&self, live: &[HostId], a: usize, b: usize) -> Option<(NodeId, NodeId)> {
        let (ha, hb) = (live[a % live.len()], live[b % live.len()]);
        Some((self.node(ha, b)?, self.node(hb, a)?))
    }

    fn settle(&mut self) {
        self.engine.settle(&self.grid).unwrap();
    }

    fn apply(&mut self, op: &Op, live: &[HostId], placed: Option<HostId>) {
        let pick = |i: usize| live[i % live.len()];
        match *op {
            Op::Place { x, y, pipe } => {
                let Some(host) = placed else { return };
                let kind = if pipe { defaults::pipe() } else { defaults::power_lv() };
                self.grid.place(host, Placement::new(0, x, y));
                self.engine.create_node(host, kind).unwrap();
            }
            Op::Poly { x, y } => {
                let Some(host) = placed else { return };
                self.grid.place(host, Placement::new(0, x, y));
                self.engine.create_poly_host(host).unwrap();
            }
            Op::AddProxy { slot, key, pipe } if !live.is_empty() => {
                let host = pick(slot);
                if !self.engine.is_poly(host) {
                    return;
                }
                let kind = if pipe { defaults::pipe() } else { defaults::power_lv() };
                match self.engine.add_proxy(host, ProxyKey::new(format!("p{}", key)), kind) {
                    Ok(_) | Err(NodeNetError::DuplicateProxy { .. }) => {}
                    Err(e) => panic!("unexpected error adding proxy: {}", e),
                }
            }
            Op::RemoveProxy { slot, key } if !live.is_empty() => {
                let host = pick(slot);
                if !self.engine.is_poly(host) {
                    return;
                }
                match self.engine.remove_proxy(host, &ProxyKey::new(format!("p{}", key))) {
                    Ok(()) | Err(NodeNetError::ProxyNotFound { .. }) => {}
                    Err(e) => panic!("unexpected error removing proxy: {}", e),
                }
            }
            Op::Remove(i) if !live.is_empty() => {
                let host = pick(i);
                self.grid.forget(host);
                self.engine.host_destroyed(host).unwrap();
            }
            Op::Move { slot, x, y } if !live.is_empty() => {
                let host = pick(slot);
                self.grid.move_to(host, 0, x, y);
                self.engine.host_moved(host).unwrap();
            }
            Op::ToggleAnchor(i) if !live.is_empty() => {
                let host = pick(i);
                let anchored = self.grid.placement(host).is_some_and(|p| p.anchored);
                self.grid.set_anchored(host, !anchored);
                self.engine.host_anchored(host).unwrap();
            }
            Op::Link(a, b) if !live.is_empty() => {
                let Some((na, nb)) = self.pair(live, a, b) else { return };
                match self.engine.try_add_edge(na, nb, EdgeFlags::NONE) {
                    Ok(_)
                    | Err(NodeNetError::SelfEdge(_))
                    | Err(NodeNetError::IncompatibleKinds { .. }) => {}
                    Err(e) => panic!("unexpected error linking: {}", e),
                }
            }
            Op::Unlink(a, b) if !live.is_empty() => {
                let Some((na, nb)) = self.pair(live, a, b) else { return };
                self.engine.try_remove_edge(na, nb).unwrap();
            }
            Op::SetEdge(a, b, bit) if !live.is_empty() => {
                let Some((na, nb)) = self.pair(live, a, b) else { return };
                match self.engine.try_set_edge(na, nb, EdgeFlags::user(bit)) {
                    Ok(())
                    | Err(NodeNetError::SelfEdge(_))
                    | Err(NodeNetError::IncompatibleKinds { .. }) => {}
                    Err(e) => panic!("unexpected error setting edge: {}", e),
                }
            }
            Op::Settle => self.settle(),
            _ => {}
        }
    }

    fn partition(&self) -> BTreeSet<BTreeSet<NodeId>> {
        self.engine
            .graphs()
            .map(|(_, g)| g.members().clone())
            .collect()
    }

    /// Connected components of the raw edge relation, computed independently
    /// of the engine's graph bookkeeping. Lone isolated nodes of detached
    /// kinds are left out, as the engine gives them no graph.
    fn components(&self) -> BTreeSet<BTreeSet<NodeId>> {
        let store = self.engine.store();
        let mut seen = BTreeSet::new();
        let mut out = BTreeSet::new();
        for (start, node) in store.nodes() {
            if seen.contains(&start) {
                continue;
            }
            if node.degree() == 0 && node.graph().is_none() {
                seen.insert(start);
                continue;
            }
            let mut component = BTreeSet::new();
            let mut stack = vec![start];
            while let Some(current) = stack.pop() {
                if !seen.insert(current) {
                    continue;
                }
                component.insert(current);
                stack.extend(store.node(current).unwrap().neighbours());
            }
            out.insert(component);
        }
        out
    }
}

fn run(ops: &[Op]) -> (Sim, Sim) {
    let mut deferred = Sim::new(SplitMode::Deferred);
    let mut immediate = Sim::new(SplitMode::Immediate);
    let mut live: Vec<HostId> = Vec::new();

    for op in ops {
        let placed = matches!(op, Op::Place { .. } | Op::Poly { .. }).then(new_host_id);
        deferred.apply(op, &live, placed);
        immediate.apply(op, &live, placed);

        match *op {
            Op::Place { .. } | Op::Poly { .. } => live.extend(placed),
            Op::Remove(i) if !live.is_empty() => {
                let index = i % live.len();
                live.remove(index);
            }
            _ => {}
        }
    }

    deferred.settle();
    immediate.settle();
    (deferred, immediate)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_graphs_are_exactly_the_connected_components(ops in prop::collection::vec(op(), 1..80)) {
        let (deferred, immediate) = run(&ops);
        for sim in [&deferred, &immediate] {
            prop_assert!(sim.engine.check_invariants().is_empty());
            prop_assert_eq!(sim.partition(), sim.components());
        }
    }

    #[test]
    fn prop_split_modes_agree(ops in prop::collection::vec(op(), 1..80)) {
        let (deferred, immediate) = run(&ops);
        prop_assert_eq!(deferred.partition(), immediate.partition());
    }

    #[test]
    fn prop_update_edges_is_idempotent_after_settle(ops in prop::collection::vec(op(), 1..60)) {
        let (mut sim, _) = run(&ops);
        let nodes: Vec<NodeId> = sim.engine.store().nodes().map(|(id, _)| id).collect();
        for node in nodes {
            let update = sim.engine.update_edges(node, &sim.grid).unwrap();
            prop_assert!(update.is_empty());
        }
    }

    #[test]
    fn prop_every_node_accounted_for(ops in prop::collection::vec(op(), 1..60)) {
        let (sim, _) = run(&ops);
        let mut owner: BTreeMap<NodeId, usize> = BTreeMap::new();
        for (_, graph) in sim.engine.graphs() {
            for member in graph.members() {
                *owner.entry(*member).or_default() += 1;
            }
        }
        for (id, node) in sim.engine.store().nodes() {
            match node.graph() {
                Some(_) => prop_assert_eq!(owner.get(&id).copied(), Some(1)),
                None => {
                    prop_assert_eq!(node.degree(), 0);
                    prop_assert_eq!(node.kind(), &defaults::pipe());
                }
            }
        }
    }
}
