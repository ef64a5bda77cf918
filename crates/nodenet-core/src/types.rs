use crate::error::{NodeNetError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, Not};
use uuid::Uuid;

/// Type alias for host object identifiers.
///
/// Hosts live outside the engine (entities in the simulation). The engine never
/// inspects them, it only keys nodes and spatial queries by them.
pub type HostId = Uuid;

slotmap::new_key_type! {
    /// Handle to a node. Generational: a handle to a destroyed node never
    /// resolves to a node created later in the same slot.
    pub struct NodeId;

    /// Handle to a graph. Invalidated whenever the graph is merged away or
    /// emptied; downstream systems must not hold these across ticks.
    pub struct GraphId;
}

/// Edge flags bitmask.
///
/// The low byte is reserved for the engine (where the edge came from and which
/// side asked for it). Caller-defined bits start at bit 8, see [`EdgeFlags::user`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeFlags(u32);

impl EdgeFlags {
    pub const NONE: Self = Self(0);

    /// At least one autolinker wants this edge.
    pub const AUTO: Self = Self(1 << 0);

    /// Externally managed. Autolinker updates never remove manual edges.
    pub const MANUAL: Self = Self(1 << 1);

    /// The autolinkers of the endpoint holding this half-edge asked for it.
    pub const OUT: Self = Self(1 << 2);

    /// The autolinkers of the other endpoint asked for it.
    pub const IN: Self = Self(1 << 3);

    /// Every engine-owned bit.
    pub const SOURCE_MASK: Self = Self(0xff);

    /// First bit available to callers.
    pub const USER_SHIFT: u32 = 8;

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Caller-defined flag number `n` (0..24).
    pub fn user(n: u32) -> Self {
        assert!(n < 32 - Self::USER_SHIFT, "user flag {} out of range", n);
        Self(1 << (n + Self::USER_SHIFT))
    }

    /// Only the caller-defined bits.
    pub fn user_bits(self) -> Self {
        self & !Self::SOURCE_MASK
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// The same flags seen from the other endpoint: `IN` and `OUT` swap.
    pub fn invert(self) -> Self {
        let mut out = self & !(Self::IN | Self::OUT);
        if self.contains(Self::OUT) {
            out |= Self::IN;
        }
        if self.contains(Self::IN) {
            out |= Self::OUT;
        }
        out
    }
}

impl BitOr for EdgeFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for EdgeFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for EdgeFlags {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for EdgeFlags {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl BitXor for EdgeFlags {
    type Output = Self;
    fn bitxor(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl Not for EdgeFlags {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Debug for EdgeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (flag, name) in [
            (Self::AUTO, "AUTO"),
            (Self::MANUAL, "MANUAL"),
            (Self::OUT, "OUT"),
            (Self::IN, "IN"),
        ] {
            if self.contains(flag) {
                parts.push(name.to_string());
            }
        }
        let user = self.user_bits().0 >> Self::USER_SHIFT;
        if user != 0 {
            parts.push(format!("user({:#x})", user));
        }
        if parts.is_empty() {
            write!(f, "EdgeFlags(NONE)")
        } else {
            write!(f, "EdgeFlags({})", parts.join(" | "))
        }
    }
}

/// Category of network a node participates in ("power_hv", "pipe", ...).
///
/// Nodes only form edges with, and join graphs of, their own kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GraphKind(String);

impl GraphKind {
    /// Kinds are lowercase ascii identifiers (`[a-z0-9_]`, max 64 chars).
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() || name.len() > 64 {
            return Err(NodeNetError::InvalidKind(format!(
                "'{}' must be 1-64 characters",
                name
            )));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(NodeNetError::InvalidKind(format!(
                "'{}' may only contain lowercase letters, digits and underscores",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GraphKind {
    type Error = NodeNetError;
    fn try_from(value: String) -> Result<Self> {
        Self::new(&value)
    }
}

impl From<GraphKind> for String {
    fn from(kind: GraphKind) -> Self {
        kind.0
    }
}

impl fmt::Display for GraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a proxy node within its poly host ("hv", "input", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyKey(String);

impl ProxyKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProxyKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl fmt::Display for ProxyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One endpoint's view of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HalfEdge {
    /// The other endpoint.
    pub to: NodeId,

    /// Flags from this endpoint's perspective.
    pub flags: EdgeFlags,
}

impl HalfEdge {
    pub fn new(to: NodeId, flags: EdgeFlags) -> Self {
        Self { to, flags }
    }
}

/// Create a fresh host id. Time-ordered so host listings sort by creation.
pub fn new_host_id() -> HostId {
    Uuid::now_v7()
}
