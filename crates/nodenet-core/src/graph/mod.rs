mod edges;
mod engine;
mod invariants;
mod merge;
mod metrics;
mod poly;
mod snapshot;
mod split;
mod store;

pub use edges::EdgeUpdate;
pub use engine::NodeGraphEngine;
pub use invariants::InvariantViolation;
pub use metrics::{EngineMetrics, TickCounters, TickReport};
pub use poly::{PolyHandler, ProxyCommand, ProxyRelay};
pub use snapshot::{EdgeView, GraphSnapshot, GraphView, NodeView};
pub use store::{Graph, Node, NodeStore};

#[cfg(test)]
mod tests;
