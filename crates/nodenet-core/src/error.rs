use crate::types::{GraphId, GraphKind, HostId, NodeId, ProxyKey};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NodeNetError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeNetError {
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    #[error("Graph not found: {0:?}")]
    GraphNotFound(GraphId),

    #[error("Host not found: {0}")]
    HostNotFound(HostId),

    #[error("Host {0} already owns a node; use a poly host for multiple nodes")]
    HostAlreadyLinked(HostId),

    #[error("Host {0} is not a poly host")]
    NotPolyHost(HostId),

    #[error("Proxy '{key}' not found on host {host}")]
    ProxyNotFound { host: HostId, key: ProxyKey },

    #[error("Proxy '{key}' already exists on host {host}")]
    DuplicateProxy { host: HostId, key: ProxyKey },

    #[error("Self-edges are not allowed: {0:?}")]
    SelfEdge(NodeId),

    #[error("Incompatible graph kinds: {from} vs {to}")]
    IncompatibleKinds { from: GraphKind, to: GraphKind },

    #[error("Edge not found: {from:?} -> {to:?}")]
    EdgeNotFound { from: NodeId, to: NodeId },

    #[error("Node {0:?} still has edges")]
    NodeStillLinked(NodeId),

    #[error("Graph {0:?} still has members")]
    GraphNotEmpty(GraphId),

    #[error("Invalid graph kind: {0}")]
    InvalidKind(String),

    #[error("Validation error: {0}")]
    Validation(String),
}
