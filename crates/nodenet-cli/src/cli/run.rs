use crate::cli::RunArgs;
use crate::config::NodenetConfig;
use crate::runner::{sizes_by_kind, RunOutcome, Runner};
use crate::scenario::Scenario;
use anyhow::{bail, Result};
use std::path::Path;

pub fn run(args: RunArgs, config_path: &Path) -> Result<()> {
    let config = NodenetConfig::load_or_default(config_path);
    let errors = config.validate();
    if !errors.is_empty() {
        bail!("invalid config {}: {}", config_path.display(), errors.join("; "));
    }

    let scenario = Scenario::load(&args.scenario)?;
    let errors = scenario.validate();
    if !errors.is_empty() {
        bail!(
            "invalid scenario {}:\n  - {}",
            args.scenario.display(),
            errors.join("\n  - ")
        );
    }

    tracing::info!(
        "Running {} ({} steps, {:?} split mode)",
        args.scenario.display(),
        scenario.steps.len(),
        config.engine.split_mode
    );

    let outcome = Runner::new(&config)?
        .with_snapshots(args.snapshots)
        .run(&scenario)?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&outcome)?),
        _ => print_table(&outcome, args.snapshots)?,
    }
    Ok(())
}

fn print_table(outcome: &RunOutcome, snapshots: bool) -> Result<()> {
    println!();
    if !outcome.name.is_empty() {
        println!("Scenario: {}", outcome.name);
    }
    println!("{}", "─".repeat(70));
    for tick in &outcome.ticks {
        let r = &tick.report;
        let c = &r.counters;
        println!(
            "#{:<4} {:>4} events  +{:<3} -{:<3} ~{:<3} edges  {:>2} merges  {:>2} splits  {:>4} graphs  {:>9?}",
            r.tick,
            tick.events,
            c.edges_added,
            c.edges_removed,
            c.edges_changed,
            c.merges,
            c.splits,
            r.graphs,
            r.duration
        );
        if r.pending_edge_updates > 0 {
            println!("      {} edge updates carried over", r.pending_edge_updates);
        }
        if snapshots {
            if let Some(snapshot) = &tick.snapshot {
                println!("{}", serde_json::to_string(snapshot)?);
            }
        }
    }
    println!("{}", "─".repeat(70));

    println!("Graphs:");
    for graph in &outcome.graphs {
        println!(
            "  {:12} {:>4} nodes {:>4} edges  {}",
            graph.kind,
            graph.members.len(),
            graph.edges,
            graph.members.join(", ")
        );
    }
    if !outcome.detached.is_empty() {
        println!("Detached: {}", outcome.detached.join(", "));
    }

    println!("Sizes:");
    for (kind, sizes) in sizes_by_kind(outcome) {
        let sizes: Vec<String> = sizes.iter().map(|s| s.to_string()).collect();
        println!("  {:12} {}", kind, sizes.join(" "));
    }

    println!("{}", "─".repeat(70));
    println!("{}", outcome.metrics);
    println!();
    Ok(())
}
