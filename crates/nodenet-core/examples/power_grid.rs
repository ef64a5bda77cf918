//! Example: a small power grid with a transformer
//!
//! Run with: RUST_LOG=debug cargo run --example power_grid

use nodenet_core::kinds::defaults;
use nodenet_core::*;

fn main() {
    // Initialize logging
    env_logger::init();

    let mut engine = NodeGraphEngine::new(EngineConfig::new()).unwrap();
    engine.register_linker(Box::new(TileAdjacencyLinker::new()));
    let log = EventLog::new();
    engine.subscribe(log.observer());
    let mut grid = GridIndex::new();

    println!("Laying a high-voltage line and a low-voltage line...");
    let cable = |grid: &mut GridIndex, engine: &mut NodeGraphEngine, x, kind: GraphKind| {
        let host = new_host_id();
        grid.place(host, Placement::new(0, x, 0));
        engine.create_node(host, kind).unwrap();
        host
    };
    let hv: Vec<HostId> = (-5..0)
        .map(|x| cable(&mut grid, &mut engine, x, defaults::power_hv()))
        .collect();
    let lv: Vec<HostId> = (1..6)
        .map(|x| cable(&mut grid, &mut engine, x, defaults::power_lv()))
        .collect();

    // The transformer sits between both lines and exposes one proxy per side.
    let transformer = new_host_id();
    grid.place(transformer, Placement::new(0, 0, 0));
    engine.create_poly_host(transformer).unwrap();
    engine
        .set_poly_handler(
            transformer,
            Box::new(|relay: &ProxyRelay| {
                println!("  transformer[{}] <- {}", relay.key, relay.event.name());
            }),
        )
        .unwrap();
    engine
        .add_proxy(transformer, ProxyKey::from("hv"), defaults::power_hv())
        .unwrap();
    engine
        .add_proxy(transformer, ProxyKey::from("lv"), defaults::power_lv())
        .unwrap();

    let report = engine.settle(&grid).unwrap();
    println!("{}", report.summary());
    print_graphs(&engine);

    println!("\nCutting the low-voltage line in the middle...");
    grid.forget(lv[2]);
    engine.host_destroyed(lv[2]).unwrap();
    let report = engine.settle(&grid).unwrap();
    println!("{}", report.summary());
    print_graphs(&engine);

    println!("\nRemoving the transformer...");
    grid.forget(transformer);
    engine.host_destroyed(transformer).unwrap();
    let report = engine.settle(&grid).unwrap();
    println!("{}", report.summary());
    print_graphs(&engine);

    let hv_graph = engine.host_node(hv[0]).and_then(|node| engine.graph_of(node));
    println!(
        "\nHigh-voltage line is {:?}; {} events observed",
        hv_graph,
        log.len()
    );
    println!("{}", engine.metrics().summary());
}

fn print_graphs(engine: &NodeGraphEngine) {
    for (id, graph) in engine.graphs() {
        println!("  {:?} [{}]: {} nodes", id, graph.kind(), graph.len());
    }
}
