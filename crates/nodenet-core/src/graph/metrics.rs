use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Structural changes counted over one tick (or accumulated over many).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickCounters {
    pub edges_added: u64,
    pub edges_removed: u64,
    pub edges_changed: u64,
    pub merges: u64,
    pub splits: u64,
    pub graphs_created: u64,
    pub graphs_destroyed: u64,

    /// Nodes handed from one graph to another by merges and splits.
    pub nodes_moved: u64,

    /// Isolated nodes left without a graph under the detached policy.
    pub nodes_detached: u64,

    /// Split checks run.
    pub split_checks: u64,

    /// Split checks that proved connectivity before visiting the whole graph.
    pub split_short_circuits: u64,

    /// Queued edge updates processed.
    pub edge_updates: u64,

    pub invariant_violations: u64,
}

impl TickCounters {
    pub fn absorb(&mut self, other: &TickCounters) {
        self.edges_added += other.edges_added;
        self.edges_removed += other.edges_removed;
        self.edges_changed += other.edges_changed;
        self.merges += other.merges;
        self.splits += other.splits;
        self.graphs_created += other.graphs_created;
        self.graphs_destroyed += other.graphs_destroyed;
        self.nodes_moved += other.nodes_moved;
        self.nodes_detached += other.nodes_detached;
        self.split_checks += other.split_checks;
        self.split_short_circuits += other.split_short_circuits;
        self.edge_updates += other.edge_updates;
        self.invariant_violations += other.invariant_violations;
    }

    /// No edge or graph changed.
    pub fn is_quiet(&self) -> bool {
        self.edges_added == 0
            && self.edges_removed == 0
            && self.edges_changed == 0
            && self.graphs_created == 0
            && self.graphs_destroyed == 0
            && self.nodes_moved == 0
            && self.nodes_detached == 0
    }
}

/// Metrics for engine observability
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineMetrics {
    /// Ticks settled.
    pub ticks: u64,

    /// Counters of the tick in progress.
    pub current: TickCounters,

    /// Counters over the engine lifetime, excluding the tick in progress.
    pub lifetime: TickCounters,

    #[serde(with = "duration_serializer")]
    pub last_settle_duration: Duration,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the tick in progress and return its counters.
    pub fn finish_tick(&mut self, duration: Duration) -> TickCounters {
        let counters = std::mem::take(&mut self.current);
        self.lifetime.absorb(&counters);
        self.ticks += 1;
        self.last_settle_duration = duration;
        counters
    }

    /// Get a summary string for logging
    pub fn summary(&self) -> String {
        format!(
            "{} ticks: {} edges added, {} removed, {} changed, {} merges, {} splits \
             ({}/{} split checks short-circuited), {} invariant violations | last settle {:?}",
            self.ticks,
            self.lifetime.edges_added,
            self.lifetime.edges_removed,
            self.lifetime.edges_changed,
            self.lifetime.merges,
            self.lifetime.splits,
            self.lifetime.split_short_circuits,
            self.lifetime.split_checks,
            self.lifetime.invariant_violations,
            self.last_settle_duration
        )
    }
}

/// What one call to `settle` did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub counters: TickCounters,

    #[serde(with = "duration_serializer")]
    pub duration: Duration,

    /// Edge updates left queued for the next tick.
    pub pending_edge_updates: usize,

    /// Live graphs after settlement.
    pub graphs: usize,

    /// Live nodes after settlement.
    pub nodes: usize,
}

impl TickReport {
    pub fn summary(&self) -> String {
        let c = &self.counters;
        format!(
            "Tick #{}: +{} -{} ~{} edges, {} merges, {} splits, {} graphs created, {} destroyed, \
             {} nodes moved in {:?} | Pending: {} | Total: {} graphs, {} nodes",
            self.tick,
            c.edges_added,
            c.edges_removed,
            c.edges_changed,
            c.merges,
            c.splits,
            c.graphs_created,
            c.graphs_destroyed,
            c.nodes_moved,
            self.duration,
            self.pending_edge_updates,
            self.graphs,
            self.nodes
        )
    }
}

// Durations are carried as whole microseconds.
mod duration_serializer {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_micros() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let micros = u64::deserialize(deserializer)?;
        Ok(Duration::from_micros(micros))
    }
}
