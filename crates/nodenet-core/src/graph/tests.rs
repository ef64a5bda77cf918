use crate::config::*;
use crate::error::NodeNetError;
use crate::events::{EventLog, GraphEvent};
use crate::graph::*;
use crate::kinds::defaults;
use crate::linker::{DeclaredLinker, TileAdjacencyLinker};
use crate::spatial::{GridIndex, NoSpatial, Placement};
use crate::types::*;
use std::cell::RefCell;
use std::rc::Rc;

fn test_config() -> EngineConfig {
    EngineConfig::new()
        .with_invariant_policy(InvariantPolicy::Panic)
        .with_verify_on_settle(true)
}

/// An engine over a tile grid, with a tile adjacency linker for every kind
/// and an event log subscribed.
struct World {
    engine: NodeGraphEngine,
    grid: GridIndex,
    log: EventLog,
}

impl World {
    fn new() -> Self {
        Self::with_config(test_config())
    }

    fn with_config(config: EngineConfig) -> Self {
        let mut engine = NodeGraphEngine::new(config).unwrap();
        engine.register_linker(Box::new(TileAdjacencyLinker::new()));
        let log = EventLog::new();
        engine.subscribe(log.observer());
        Self {
            engine,
            grid: GridIndex::new(),
            log,
        }
    }

    fn place(&mut self, x: i32, y: i32, kind: GraphKind) -> (HostId, NodeId) {
        let host = new_host_id();
        self.grid.place(host, Placement::new(0, x, y));
        let node = self.engine.create_node(host, kind).unwrap();
        (host, node)
    }

    fn cable(&mut self, x: i32, y: i32) -> (HostId, NodeId) {
        self.place(x, y, defaults::power_lv())
    }

    /// A node whose host is nowhere on the grid; only manual edges reach it.
    fn loose_node(&mut self) -> NodeId {
        self.engine
            .create_node(new_host_id(), defaults::power_lv())
            .unwrap()
    }

    fn move_host(&mut self, host: HostId, x: i32, y: i32) {
        assert!(self.grid.move_to(host, 0, x, y));
        self.engine.host_moved(host).unwrap();
    }

    fn settle(&mut self) -> TickReport {
        self.engine.settle(&self.grid).unwrap()
    }

    fn same_graph(&self, a: NodeId, b: NodeId) -> bool {
        let ga = self.engine.graph_of(a);
        ga.is_some() && ga == self.engine.graph_of(b)
    }

    fn count(&self, name: &str) -> usize {
        self.log.count(|e| e.name() == name)
    }
}

/// a - b - c - ... as manual edges between loose nodes.
fn manual_chain(world: &mut World, len: usize) -> Vec<NodeId> {
    let nodes: Vec<NodeId> = (0..len).map(|_| world.loose_node()).collect();
    for pair in nodes.windows(2) {
        assert!(world
            .engine
            .try_add_edge(pair[0], pair[1], EdgeFlags::NONE)
            .unwrap());
    }
    nodes
}

#[test]
fn test_removing_bridge_edge_splits_off_the_tail() {
    let mut world = World::new();
    let nodes = manual_chain(&mut world, 3);
    let (a, b, c) = (nodes[0], nodes[1], nodes[2]);
    world.settle();

    let original = world.engine.graph_of(a).unwrap();
    assert_eq!(world.engine.graph(original).unwrap().len(), 3);
    world.log.clear();

    assert!(world.engine.try_remove_edge(b, c).unwrap());
    world.settle();

    assert_eq!(world.engine.graph_of(a), Some(original));
    assert_eq!(world.engine.graph_of(b), Some(original));
    let split = world.engine.graph_of(c).unwrap();
    assert_ne!(split, original);
    assert_eq!(world.engine.graph(split).unwrap().len(), 1);
    assert_eq!(world.engine.graph_count(), 2);

    let events = world.log.events();
    assert!(events.contains(&GraphEvent::Splitting {
        graph: original,
        split,
        leaving: vec![c],
    }));
    assert!(events.contains(&GraphEvent::Split {
        graph: original,
        split,
        members: vec![c],
    }));
}

#[test]
fn test_adjacent_singletons_merge() {
    let mut world = World::new();
    let (_, x) = world.cable(0, 0);
    let (hy, y) = world.cable(5, 5);
    world.settle();
    assert_eq!(world.engine.graph_count(), 2);
    assert!(!world.same_graph(x, y));
    world.log.clear();

    world.move_host(hy, 1, 0);
    let report = world.settle();

    assert_eq!(world.engine.graph_count(), 1);
    assert!(world.same_graph(x, y));
    assert_eq!(report.counters.merges, 1);
    assert_eq!(
        world.engine.edge_flags(x, y),
        Some(EdgeFlags::AUTO | EdgeFlags::IN | EdgeFlags::OUT)
    );

    let merged: Vec<Vec<NodeId>> = world
        .log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            GraphEvent::Merged { moved, .. } => Some(moved),
            _ => None,
        })
        .collect();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].len(), 1);
}

#[test]
fn test_isolated_node_gets_singleton_and_no_edge_events() {
    let mut world = World::new();
    let (_, z) = world.cable(0, 0);
    world.settle();

    let graph = world.engine.graph_of(z).unwrap();
    assert_eq!(world.engine.graph(graph).unwrap().len(), 1);
    assert_eq!(world.log.count(GraphEvent::is_edge_event), 0);

    let update = world.engine.update_edges(z, &world.grid).unwrap();
    assert!(update.is_empty());
    assert_eq!(world.log.count(GraphEvent::is_edge_event), 0);
}

#[test]
fn test_ring_survives_single_edge_removal() {
    let mut world = World::new();
    let nodes = manual_chain(&mut world, 10);
    world
        .engine
        .try_add_edge(nodes[9], nodes[0], EdgeFlags::NONE)
        .unwrap();
    world.settle();
    assert_eq!(world.engine.graph_count(), 1);
    world.log.clear();

    for i in 0..10 {
        let (a, b) = (nodes[i], nodes[(i + 1) % 10]);
        world.engine.try_remove_edge(a, b).unwrap();
        let report = world.settle();
        assert_eq!(world.engine.graph_count(), 1);
        assert_eq!(report.counters.splits, 0);
        assert_eq!(report.counters.split_checks, 1);
        world.engine.try_add_edge(a, b, EdgeFlags::NONE).unwrap();
        world.settle();
    }
    assert_eq!(world.count("split"), 0);
}

#[test]
fn test_split_check_short_circuits_on_redundant_path() {
    let mut world = World::new();
    let n: Vec<NodeId> = (0..7).map(|_| world.loose_node()).collect();
    // Square a-b-c-d with a tail d-e-f-g.
    for (x, y) in [(0, 1), (1, 2), (2, 3), (3, 0), (3, 4), (4, 5), (5, 6)] {
        world.engine.try_add_edge(n[x], n[y], EdgeFlags::NONE).unwrap();
    }
    world.settle();

    world.engine.try_remove_edge(n[0], n[1]).unwrap();
    let report = world.settle();
    assert_eq!(world.engine.graph_count(), 1);
    assert_eq!(report.counters.split_checks, 1);
    assert_eq!(report.counters.split_short_circuits, 1);
}

#[test]
fn test_destroying_poly_host_tears_down_proxies() {
    let mut world = World::new();
    let host = new_host_id();
    world.grid.place(host, Placement::new(0, 0, 0));
    world.engine.create_poly_host(host).unwrap();

    let relayed: Rc<RefCell<Vec<(ProxyKey, &'static str)>>> = Rc::default();
    let sink = relayed.clone();
    world
        .engine
        .set_poly_handler(
            host,
            Box::new(move |relay: &ProxyRelay| {
                sink.borrow_mut()
                    .push((relay.key.clone(), relay.event.name()));
            }),
        )
        .unwrap();

    let p1 = world
        .engine
        .add_proxy(host, ProxyKey::from("hv"), defaults::power_hv())
        .unwrap();
    let p2 = world
        .engine
        .add_proxy(host, ProxyKey::from("lv"), defaults::power_lv())
        .unwrap();
    let (_, hv_cable) = world.place(1, 0, defaults::power_hv());
    let (_, lv_cable) = world.place(-1, 0, defaults::power_lv());
    world.settle();

    assert!(world.same_graph(p1, hv_cable));
    assert!(world.same_graph(p2, lv_cable));
    assert!(!world.same_graph(p1, p2));
    assert_eq!(world.engine.graph_count(), 2);
    world.log.clear();
    relayed.borrow_mut().clear();

    world.engine.host_destroyed(host).unwrap();
    world.settle();

    for proxy in [p1, p2] {
        assert!(world
            .log
            .events()
            .iter()
            .any(|e| matches!(e, GraphEvent::NodeRemoved { node, .. } if *node == proxy)));
        assert!(world.engine.node(proxy).is_err());
    }
    assert!(!world.engine.is_poly(host));
    assert!(world.engine.proxies(host).is_empty());
    assert!(world.engine.host_nodes(host).is_empty());
    assert_eq!(world.engine.graph_count(), 2);
    assert_eq!(world.engine.graph(world.engine.graph_of(hv_cable).unwrap()).unwrap().len(), 1);

    let relayed = relayed.borrow();
    assert!(relayed.contains(&(ProxyKey::from("hv"), "node_removed")));
    assert!(relayed.contains(&(ProxyKey::from("lv"), "node_removed")));
    assert!(relayed.contains(&(ProxyKey::from("hv"), "edge_removed")));
}

#[test]
fn test_update_edges_is_idempotent() {
    let mut world = World::new();
    let nodes: Vec<NodeId> = (0..4).map(|x| world.cable(x, 0).1).collect();
    world.settle();
    assert_eq!(world.engine.store().edge_count(), 3);
    world.log.clear();

    for node in &nodes {
        let update = world.engine.update_edges(*node, &world.grid).unwrap();
        assert!(update.is_empty());
    }
    assert!(world.log.is_empty());

    let report = world.settle();
    assert!(report.counters.is_quiet());
}

#[test]
fn test_merge_survivor_independent_of_operand_order() {
    fn build() -> (World, GraphId, GraphId) {
        let mut world = World::new();
        let left = manual_chain(&mut world, 2);
        let right = manual_chain(&mut world, 2);
        world.settle();
        let gl = world.engine.graph_of(left[0]).unwrap();
        let gr = world.engine.graph_of(right[0]).unwrap();
        (world, gl, gr)
    }

    let (mut first, l1, r1) = build();
    let (mut second, l2, r2) = build();
    assert_eq!((l1, r1), (l2, r2));

    let a = first.engine.merge_graphs(l1, r1).unwrap();
    let b = second.engine.merge_graphs(r2, l2).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, l1.min(r1));
    assert_eq!(
        first.engine.graph(a).unwrap().members(),
        second.engine.graph(b).unwrap().members()
    );
}

#[test]
fn test_larger_graph_survives_merge() {
    let mut world = World::new();
    let big = manual_chain(&mut world, 3);
    let small = world.loose_node();
    world.settle();
    let big_graph = world.engine.graph_of(big[0]).unwrap();
    let small_graph = world.engine.graph_of(small).unwrap();

    world
        .engine
        .try_add_edge(small, big[2], EdgeFlags::NONE)
        .unwrap();
    assert_eq!(world.engine.graph_of(small), Some(big_graph));
    assert!(world.engine.graph(small_graph).is_err());
    assert!(world.log.events().contains(&GraphEvent::Merged {
        survivor: big_graph,
        absorbed: small_graph,
        moved: vec![small],
    }));
}

#[test]
fn test_destroying_middle_node_splits() {
    let mut world = World::new();
    let nodes = manual_chain(&mut world, 3);
    world.settle();
    let original = world.engine.graph_of(nodes[0]).unwrap();

    world.engine.destroy_node(nodes[1]).unwrap();
    world.settle();

    assert_eq!(world.engine.graph_count(), 2);
    assert_eq!(world.engine.graph_of(nodes[0]), Some(original));
    assert!(!world.same_graph(nodes[0], nodes[2]));
    assert_eq!(world.engine.node_count(), 2);
}

#[test]
fn test_destroying_last_node_destroys_graph() {
    let mut world = World::new();
    let (host, node) = world.cable(0, 0);
    world.settle();
    let graph = world.engine.graph_of(node).unwrap();

    world.engine.host_destroyed(host).unwrap();
    assert!(world.engine.graph(graph).is_err());
    assert!(world.log.events().contains(&GraphEvent::GraphDestroyed {
        graph,
        kind: defaults::power_lv(),
    }));
    assert!(matches!(
        world.engine.host_destroyed(host),
        Err(NodeNetError::HostNotFound(_))
    ));
}

#[test]
fn test_kinds_never_link() {
    let mut world = World::new();
    let (_, cable) = world.cable(0, 0);
    let (_, pipe) = world.place(1, 0, defaults::pipe());
    world.settle();

    assert!(!world.engine.has_edge(cable, pipe));
    assert_eq!(world.engine.graph_count(), 2);
    assert!(matches!(
        world.engine.try_add_edge(cable, pipe, EdgeFlags::NONE),
        Err(NodeNetError::IncompatibleKinds { .. })
    ));
    assert!(matches!(
        world.engine.try_add_edge(cable, cable, EdgeFlags::NONE),
        Err(NodeNetError::SelfEdge(_))
    ));
}

#[test]
fn test_unanchored_host_unlinks() {
    let mut world = World::new();
    let (a_host, a) = world.cable(0, 0);
    let (_, b) = world.cable(1, 0);
    world.settle();
    assert!(world.engine.has_edge(a, b));

    world.grid.set_anchored(a_host, false);
    world.engine.host_anchored(a_host).unwrap();
    world.settle();
    assert!(!world.engine.has_edge(a, b));
    assert_eq!(world.engine.graph_count(), 2);

    world.grid.set_anchored(a_host, true);
    world.engine.host_anchored(a_host).unwrap();
    world.settle();
    assert!(world.same_graph(a, b));
}

#[test]
fn test_manual_edges() {
    let mut world = World::new();
    let a = world.loose_node();
    let b = world.loose_node();

    assert!(world.engine.try_add_edge(a, b, EdgeFlags::user(1)).unwrap());
    assert!(!world.engine.try_add_edge(a, b, EdgeFlags::NONE).unwrap());
    assert_eq!(
        world.engine.edge_flags(a, b),
        Some(EdgeFlags::MANUAL | EdgeFlags::user(1))
    );
    assert_eq!(world.engine.edge_flags(b, a), world.engine.edge_flags(a, b));

    // Autolinkers never remove a manual edge.
    world.settle();
    assert!(world.engine.has_edge(a, b));
    assert!(world.same_graph(a, b));

    world.engine.try_set_edge(a, b, EdgeFlags::user(2)).unwrap();
    assert_eq!(
        world.engine.edge_flags(a, b),
        Some(EdgeFlags::MANUAL | EdgeFlags::user(2))
    );
    assert_eq!(world.count("edge_changed"), 2);

    assert!(world.engine.try_remove_edge(a, b).unwrap());
    assert!(!world.engine.try_remove_edge(a, b).unwrap());
    world.settle();
    assert_eq!(world.engine.graph_count(), 2);
}

#[test]
fn test_manual_upgrade_and_relax_of_auto_edge() {
    let mut world = World::new();
    let (_, a) = world.cable(0, 0);
    let (_, b) = world.cable(0, 1);
    world.settle();
    let auto = EdgeFlags::AUTO | EdgeFlags::IN | EdgeFlags::OUT;
    assert_eq!(world.engine.edge_flags(a, b), Some(auto));

    // Autolinker edges cannot be removed by hand.
    assert!(!world.engine.try_remove_edge(a, b).unwrap());

    assert!(world.engine.try_add_edge(a, b, EdgeFlags::user(0)).unwrap());
    assert_eq!(
        world.engine.edge_flags(a, b),
        Some(auto | EdgeFlags::MANUAL | EdgeFlags::user(0))
    );

    assert!(world.engine.try_remove_edge(a, b).unwrap());
    assert_eq!(
        world.engine.edge_flags(a, b),
        Some(auto | EdgeFlags::user(0))
    );
    assert_eq!(world.engine.pending_edge_updates(), 2);

    world.settle();
    assert_eq!(world.engine.edge_flags(a, b), Some(auto));
    assert!(world.same_graph(a, b));
}

#[test]
fn test_manual_edge_follows_autolinker_bits() {
    let mut world = World::new();
    let (_, a) = world.cable(0, 0);
    let (b_host, b) = world.cable(4, 4);
    world.settle();
    world.engine.try_add_edge(a, b, EdgeFlags::NONE).unwrap();

    world.move_host(b_host, 1, 0);
    world.settle();
    assert_eq!(
        world.engine.edge_flags(a, b),
        Some(EdgeFlags::MANUAL | EdgeFlags::AUTO | EdgeFlags::IN | EdgeFlags::OUT)
    );

    world.move_host(b_host, 9, 9);
    world.settle();
    assert_eq!(world.engine.edge_flags(a, b), Some(EdgeFlags::MANUAL));
    assert!(world.same_graph(a, b));
}

#[test]
fn test_detached_policy() {
    let kind = defaults::device_link();
    let mut world = World::with_config(
        test_config().with_kind_policy(kind.clone(), IsolatedPolicy::Detached),
    );
    world
        .engine
        .register_linker(Box::new(DeclaredLinker::for_kind(kind.clone())));

    let (ha, a) = world.place(0, 0, kind.clone());
    let (hb, b) = world.place(20, 20, kind.clone());
    world.settle();
    assert_eq!(world.engine.graph_of(a), None);
    assert_eq!(world.engine.graph_count(), 0);
    assert!(world.engine.check_invariants().is_empty());

    world.grid.declare_link(ha, hb);
    world.engine.host_moved(ha).unwrap();
    world.settle();
    assert!(world.same_graph(a, b));
    assert_eq!(world.engine.graph_count(), 1);

    world.grid.retract_link(ha, hb);
    world.engine.host_moved(ha).unwrap();
    let report = world.settle();
    assert_eq!(world.engine.graph_of(a), None);
    assert_eq!(world.engine.graph_of(b), None);
    assert_eq!(world.engine.graph_count(), 0);
    assert_eq!(report.counters.nodes_detached, 2);
}

#[test]
fn test_immediate_mode_splits_before_settle() {
    let mut immediate =
        World::with_config(test_config().with_split_mode(SplitMode::Immediate));
    let mut deferred = World::new();

    for world in [&mut immediate, &mut deferred] {
        let nodes = manual_chain(world, 4);
        world.settle();
        world.engine.try_remove_edge(nodes[1], nodes[2]).unwrap();
    }
    assert_eq!(immediate.engine.graph_count(), 2);
    assert_eq!(deferred.engine.graph_count(), 1);

    deferred.settle();
    immediate.settle();
    assert_eq!(deferred.engine.graph_count(), 2);
    assert_eq!(immediate.engine.graph_count(), 2);
}

#[test]
fn test_destroying_node_keeps_graph_id_in_both_modes() {
    for mode in [SplitMode::Deferred, SplitMode::Immediate] {
        let mut world = World::with_config(test_config().with_split_mode(mode));
        let nodes = manual_chain(&mut world, 2);
        let (a, b) = (nodes[0], nodes[1]);
        world.settle();
        let original = world.engine.graph_of(b).unwrap();
        world.log.clear();

        world.engine.destroy_node(a).unwrap();
        world.settle();

        assert_eq!(world.engine.graph_of(b), Some(original), "{:?}", mode);
        assert_eq!(world.engine.graph_count(), 1);
        assert_eq!(world.count("graph_created"), 0, "{:?}", mode);
        assert_eq!(world.count("splitting"), 0, "{:?}", mode);
        assert_eq!(world.count("split"), 0, "{:?}", mode);
        assert_eq!(world.count("graph_destroyed"), 0, "{:?}", mode);
        assert_eq!(world.count("node_removed"), 1, "{:?}", mode);
    }
}

#[test]
fn test_immediate_destroy_of_middle_node_splits_once() {
    let mut world = World::with_config(test_config().with_split_mode(SplitMode::Immediate));
    let nodes = manual_chain(&mut world, 3);
    world.settle();
    let original = world.engine.graph_of(nodes[0]).unwrap();
    world.log.clear();

    world.engine.destroy_node(nodes[1]).unwrap();

    assert_eq!(world.engine.graph_count(), 2);
    assert_eq!(world.count("split"), 1);
    let kept = [nodes[0], nodes[2]]
        .iter()
        .filter(|n| world.engine.graph_of(**n) == Some(original))
        .count();
    assert_eq!(kept, 1);
    world.settle();
}

#[test]
fn test_deferred_batch_removal_of_a_row() {
    let mut world = World::new();
    let hosts: Vec<(HostId, NodeId)> = (0..8).map(|x| world.cable(x, 0)).collect();
    let (_, branch) = world.cable(3, 1);
    world.settle();
    assert_eq!(world.engine.graph_count(), 1);

    // Remove every other cable in one tick.
    for (host, _) in hosts.iter().step_by(2) {
        world.engine.host_destroyed(*host).unwrap();
    }
    world.settle();

    // Remaining: 1, 3+branch, 5, 7.
    assert_eq!(world.engine.graph_count(), 4);
    assert!(world.same_graph(hosts[3].1, branch));
    assert!(world.engine.check_invariants().is_empty());
}

#[test]
fn test_heal_repairs_disconnected_graph() {
    let mut world = World::with_config(
        EngineConfig::new()
            .with_invariant_policy(InvariantPolicy::Heal)
            .with_verify_on_settle(true),
    );
    let nodes = manual_chain(&mut world, 3);
    world.settle();

    // Corrupt: drop an edge behind the engine's back.
    world.engine.store_mut().unlink(nodes[1], nodes[2]).unwrap();
    assert!(matches!(
        world.engine.check_invariants().as_slice(),
        [InvariantViolation::Disconnected { components: 2, .. }]
    ));

    world.settle();
    assert_eq!(world.engine.graph_count(), 2);
    assert!(world.engine.check_invariants().is_empty());
    assert_eq!(world.engine.metrics().lifetime.invariant_violations, 1);
}

#[test]
#[should_panic(expected = "graph invariant violation")]
fn test_panic_policy_aborts_on_violation() {
    let mut world = World::new();
    let nodes = manual_chain(&mut world, 3);
    world.settle();
    world.engine.store_mut().unlink(nodes[0], nodes[1]).unwrap();
    world.settle();
}

#[test]
fn test_event_order_for_first_link() {
    let mut world = World::new();
    world.cable(0, 0);
    world.cable(1, 0);
    world.settle();

    let names: Vec<&str> = world.log.events().iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "edge_added",
            "edge_added",
            "graph_created",
            "node_added",
            "graph_created",
            "node_added",
            "merging",
            "node_removed",
            "node_added",
            "graph_destroyed",
            "merged",
        ]
    );
}

#[test]
fn test_proxy_relay_and_commands() {
    let mut world = World::new();
    let host = new_host_id();
    world.grid.place(host, Placement::new(0, 0, 0));
    world.engine.create_poly_host(host).unwrap();
    world.engine.create_poly_host(host).unwrap();

    let key = ProxyKey::from("input");
    let proxy = world
        .engine
        .add_proxy(host, key.clone(), defaults::pipe())
        .unwrap();
    assert!(matches!(
        world.engine.add_proxy(host, key.clone(), defaults::pipe()),
        Err(NodeNetError::DuplicateProxy { .. })
    ));
    assert!(matches!(
        world.engine.create_node(host, defaults::pipe()),
        Err(NodeNetError::HostAlreadyLinked(_))
    ));
    assert_eq!(world.engine.host_node(host), None);

    let (_, pipe) = world.place(0, 1, defaults::pipe());
    world.settle();
    assert!(world.same_graph(proxy, pipe));

    let relays: Vec<ProxyRelay> = world
        .log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            GraphEvent::ProxyRelayed(relay) => Some(relay),
            _ => None,
        })
        .collect();
    assert!(!relays.is_empty());
    assert!(relays.iter().all(|r| r.host == host && r.proxy == proxy && r.key == key));
    assert!(relays
        .iter()
        .any(|r| matches!(*r.event, GraphEvent::EdgeAdded { other, .. } if other == pipe)));

    world
        .engine
        .relay_to_proxy(host, &key, ProxyCommand::QueueEdgeUpdate)
        .unwrap();
    assert_eq!(world.engine.pending_edge_updates(), 1);
    world
        .engine
        .relay_to_proxy(host, &key, ProxyCommand::ClearEdgeUpdate)
        .unwrap();
    assert_eq!(world.engine.pending_edge_updates(), 0);
    assert_eq!(
        world
            .engine
            .relay_to_proxies(host, ProxyCommand::ForceSplitCheck)
            .unwrap(),
        1
    );

    world.engine.remove_proxy(host, &key).unwrap();
    assert!(world.engine.proxies(host).is_empty());
    assert!(world.engine.is_poly(host));
    assert!(matches!(
        world.engine.proxy(host, &key),
        Err(NodeNetError::ProxyNotFound { .. })
    ));
}

#[test]
fn test_plain_host_cannot_become_poly() {
    let mut world = World::new();
    let (host, node) = world.cable(0, 0);
    assert_eq!(world.engine.host_node(host), Some(node));
    assert!(matches!(
        world.engine.create_poly_host(host),
        Err(NodeNetError::HostAlreadyLinked(_))
    ));
    assert!(matches!(
        world.engine.add_proxy(host, ProxyKey::from("a"), defaults::pipe()),
        Err(NodeNetError::NotPolyHost(_))
    ));
}

#[test]
fn test_edge_update_budget_carries_over() {
    let mut world = World::with_config(test_config().with_max_edge_updates_per_tick(4));
    for i in 0..10 {
        world.cable(i * 10, 0);
    }

    let first = world.settle();
    assert_eq!(first.counters.edge_updates, 4);
    assert_eq!(first.pending_edge_updates, 6);
    assert_eq!(first.graphs, 10);

    world.settle();
    let third = world.settle();
    assert_eq!(third.counters.edge_updates, 2);
    assert_eq!(third.pending_edge_updates, 0);
    assert_eq!(world.engine.metrics().ticks, 3);
}

#[test]
fn test_debug_broadcast_snapshot() {
    let mut world = World::with_config(test_config().with_debug_broadcast(true));
    let (_, a) = world.cable(0, 0);
    world.cable(1, 0);
    world.cable(7, 7);
    world.settle();

    let snapshots: Vec<GraphSnapshot> = world
        .log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            GraphEvent::Snapshot(snapshot) => Some(*snapshot),
            _ => None,
        })
        .collect();
    assert_eq!(snapshots.len(), 1);
    let snapshot = &snapshots[0];
    assert_eq!(snapshot.tick, 1);
    assert_eq!(snapshot.graphs.len(), 2);
    assert_eq!(snapshot.node_count(), 3);
    assert_eq!(snapshot.edge_count(), 1);
    assert!(snapshot.detached.is_empty());
    assert!(snapshot
        .graphs
        .iter()
        .any(|g| g.nodes.iter().any(|n| n.id == a) && g.edges.len() == 1));

    let json = serde_json::to_value(snapshot).unwrap();
    assert_eq!(json["graphs"].as_array().unwrap().len(), 2);
}

#[test]
fn test_split_check_api() {
    let mut world = World::new();
    let nodes = manual_chain(&mut world, 4);
    world.settle();
    let graph = world.engine.graph_of(nodes[0]).unwrap();

    world.engine.store_mut().unlink(nodes[2], nodes[3]).unwrap();
    let split = world.engine.split_check(graph, &[nodes[2], nodes[3]]).unwrap();
    assert_eq!(split.len(), 1);
    assert_eq!(world.engine.graph(split[0]).unwrap().members().len(), 1);
    assert!(world.engine.split_check(graph, &[]).unwrap().is_empty());
    assert!(world.engine.force_split_check(graph).unwrap().is_empty());
    assert!(world.engine.check_invariants().is_empty());
}

#[test]
fn test_merge_at_requires_an_edge() {
    let mut world = World::new();
    let a = world.loose_node();
    let b = world.loose_node();
    assert!(matches!(
        world.engine.merge_at(a, b),
        Err(NodeNetError::EdgeNotFound { .. })
    ));

    world.engine.try_add_edge(a, b, EdgeFlags::NONE).unwrap();
    let graph = world.engine.merge_at(a, b).unwrap();
    assert_eq!(world.engine.graph_of(a), Some(graph));
    assert_eq!(world.engine.graph_of(b), Some(graph));
}

#[test]
fn test_engine_without_spatial_index() {
    let mut engine = NodeGraphEngine::new(test_config()).unwrap();
    let host = new_host_id();
    engine.create_poly_host(host).unwrap();
    let a = engine
        .add_proxy(host, ProxyKey::from("a"), defaults::pipe())
        .unwrap();
    let b = engine
        .add_proxy(host, ProxyKey::from("b"), defaults::pipe())
        .unwrap();
    engine.settle(&NoSpatial).unwrap();
    assert_ne!(engine.graph_of(a), engine.graph_of(b));

    engine.try_add_edge(a, b, EdgeFlags::NONE).unwrap();
    engine.settle(&NoSpatial).unwrap();
    assert_eq!(engine.graph_of(a), engine.graph_of(b));
    assert_eq!(engine.tick(), 2);
}

#[test]
fn test_sibling_proxies_join_graphs_independently() {
    let mut world = World::new();
    let host = new_host_id();
    world.grid.place(host, Placement::new(0, 5, 5));
    world.engine.create_poly_host(host).unwrap();
    let input = world
        .engine
        .add_proxy(host, ProxyKey::from("input"), defaults::pipe())
        .unwrap();
    let output = world
        .engine
        .add_proxy(host, ProxyKey::from("output"), defaults::pipe())
        .unwrap();
    world.settle();

    assert!(!world.engine.has_edge(input, output));
    assert!(!world.same_graph(input, output));

    // A shared neighbour joins them, without a direct edge.
    let (_, west) = world.place(4, 5, defaults::pipe());
    world.settle();
    assert!(!world.engine.has_edge(input, output));
    assert!(world.engine.has_edge(input, west));
    assert!(world.engine.has_edge(output, west));
    assert!(world.same_graph(input, output));
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = EngineConfig::new().with_max_edge_updates_per_tick(1);
    assert!(matches!(
        NodeGraphEngine::new(config),
        Err(NodeNetError::Validation(_))
    ));
}
