//! nodenet: incremental connectivity for in-world node networks
//!
//! Tracks which nodes (cables, pipes, linkable devices) are transitively
//! connected and keeps the partition into graphs correct as nodes and edges
//! come and go:
//! - edges are decided by pluggable [`Autolinker`]s over a [`SpatialIndex`]
//! - graphs merge by size when an edge joins them
//! - removals seed split checks, resolved per tick or immediately
//! - poly hosts expose several proxy nodes and receive their events

pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod kinds;
pub mod linker;
pub mod spatial;
pub mod types;

pub use config::{EngineConfig, InvariantPolicy, IsolatedPolicy, SplitMode};
pub use error::{NodeNetError, Result};
pub use events::{EventBus, EventLog, GraphEvent, GraphObserver, SubscriberId};
pub use graph::{
    EdgeUpdate, EngineMetrics, GraphSnapshot, InvariantViolation, NodeGraphEngine, PolyHandler,
    ProxyCommand, ProxyRelay, TickCounters, TickReport,
};
pub use linker::{
    Autolinker, DeclaredLinker, LinkContext, LinkDecision, LinkEnd, LinkerRegistry,
    TileAdjacencyLinker,
};
pub use spatial::{GridIndex, NoSpatial, Placement, SpatialIndex, Tile};
pub use types::{new_host_id, EdgeFlags, GraphId, GraphKind, HalfEdge, HostId, NodeId, ProxyKey};
