use crate::spatial::Placement;
use crate::types::{EdgeFlags, GraphKind, HostId, NodeId, ProxyKey};

/// One end of a candidate edge, as seen by an autolinker.
#[derive(Debug, Clone, Copy)]
pub struct LinkEnd<'a> {
    pub node: NodeId,
    pub host: HostId,
    pub kind: &'a GraphKind,
    pub proxy: Option<&'a ProxyKey>,
    pub placement: Option<Placement>,
}

/// Everything an autolinker may base its answer on.
#[derive(Debug, Clone, Copy)]
pub struct LinkContext<'a> {
    /// The endpoint asking.
    pub from: LinkEnd<'a>,

    /// The candidate neighbour.
    pub to: LinkEnd<'a>,

    /// Flags of the existing edge from `from`'s perspective, if there is one.
    pub current: Option<EdgeFlags>,

    /// The spatial index reports an explicit link between the two hosts.
    pub declared: bool,
}

impl LinkContext<'_> {
    pub fn same_host(&self) -> bool {
        self.from.host == self.to.host
    }

    /// Both ends placed and both anchored.
    pub fn both_anchored(&self) -> bool {
        matches!(
            (self.from.placement, self.to.placement),
            (Some(a), Some(b)) if a.anchored && b.anchored
        )
    }
}

/// An autolinker's answer for one ordered pair of nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkDecision {
    #[default]
    NotWanted,
    Wanted(EdgeFlags),
}

impl LinkDecision {
    pub fn is_wanted(self) -> bool {
        matches!(self, LinkDecision::Wanted(_))
    }

    pub fn flags(self) -> Option<EdgeFlags> {
        match self {
            LinkDecision::Wanted(flags) => Some(flags),
            LinkDecision::NotWanted => None,
        }
    }

    /// Any wanting side makes the edge wanted; flags are OR-ed.
    /// Commutative and associative, so registration order never matters.
    pub fn combine(self, other: LinkDecision) -> LinkDecision {
        match (self, other) {
            (LinkDecision::Wanted(a), LinkDecision::Wanted(b)) => LinkDecision::Wanted(a | b),
            (LinkDecision::Wanted(a), LinkDecision::NotWanted)
            | (LinkDecision::NotWanted, LinkDecision::Wanted(a)) => LinkDecision::Wanted(a),
            (LinkDecision::NotWanted, LinkDecision::NotWanted) => LinkDecision::NotWanted,
        }
    }
}

/// Domain logic deciding whether two nodes should be linked.
///
/// Must be a pure, deterministic function of the context. The engine asks both
/// directions of every candidate pair and relies on stable answers to keep
/// `update_edges` idempotent.
pub trait Autolinker {
    fn name(&self) -> &str;

    fn check(&self, ctx: &LinkContext<'_>) -> LinkDecision;
}

/// Links nodes on the same tile or orthogonally adjacent tiles of one grid.
#[derive(Debug, Clone)]
pub struct TileAdjacencyLinker {
    /// Only answer for these kinds. None = all.
    pub kinds: Option<Vec<GraphKind>>,

    /// Link nodes of different hosts sharing a tile (junctions).
    pub same_tile: bool,

    /// Link sibling proxies of one poly host to each other. Off by default so
    /// every proxy joins its graphs through its own neighbours.
    pub same_host: bool,

    /// Link orthogonal neighbours.
    pub cardinal: bool,

    /// Both hosts must be anchored.
    pub require_anchored: bool,

    /// Caller flags put on every edge this linker wants.
    pub flags: EdgeFlags,
}

impl Default for TileAdjacencyLinker {
    fn default() -> Self {
        Self {
            kinds: None,
            same_tile: true,
            same_host: false,
            cardinal: true,
            require_anchored: true,
            flags: EdgeFlags::NONE,
        }
    }
}

impl TileAdjacencyLinker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_kind(kind: GraphKind) -> Self {
        Self {
            kinds: Some(vec![kind]),
            ..Self::default()
        }
    }

    pub fn with_kinds(mut self, kinds: Vec<GraphKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn with_same_tile(mut self, enabled: bool) -> Self {
        self.same_tile = enabled;
        self
    }

    pub fn with_same_host(mut self, enabled: bool) -> Self {
        self.same_host = enabled;
        self
    }

    pub fn with_cardinal(mut self, enabled: bool) -> Self {
        self.cardinal = enabled;
        self
    }

    pub fn with_require_anchored(mut self, required: bool) -> Self {
        self.require_anchored = required;
        self
    }

    pub fn with_flags(mut self, flags: EdgeFlags) -> Self {
        self.flags = flags;
        self
    }

    fn handles(&self, kind: &GraphKind) -> bool {
        match &self.kinds {
            Some(kinds) => kinds.contains(kind),
            None => true,
        }
    }
}

impl Autolinker for TileAdjacencyLinker {
    fn name(&self) -> &str {
        "tile_adjacency"
    }

    fn check(&self, ctx: &LinkContext<'_>) -> LinkDecision {
        if !self.handles(ctx.from.kind) || (ctx.same_host() && !self.same_host) {
            return LinkDecision::NotWanted;
        }

        let (Some(from), Some(to)) = (ctx.from.placement, ctx.to.placement) else {
            return LinkDecision::NotWanted;
        };

        if self.require_anchored && !(from.anchored && to.anchored) {
            return LinkDecision::NotWanted;
        }

        let touching =
            (self.same_tile && from.same_tile(&to)) || (self.cardinal && from.is_adjacent(&to));
        if touching {
            LinkDecision::Wanted(self.flags)
        } else {
            LinkDecision::NotWanted
        }
    }
}

/// Links host pairs the spatial index reports as explicitly declared
/// (device links, multitool-linked machines).
#[derive(Debug, Clone, Default)]
pub struct DeclaredLinker {
    /// Only answer for these kinds. None = all.
    pub kinds: Option<Vec<GraphKind>>,

    pub flags: EdgeFlags,
}

impl DeclaredLinker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_kind(kind: GraphKind) -> Self {
        Self {
            kinds: Some(vec![kind]),
            flags: EdgeFlags::NONE,
        }
    }

    pub fn with_flags(mut self, flags: EdgeFlags) -> Self {
        self.flags = flags;
        self
    }
}

impl Autolinker for DeclaredLinker {
    fn name(&self) -> &str {
        "declared"
    }

    fn check(&self, ctx: &LinkContext<'_>) -> LinkDecision {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(ctx.from.kind) {
                return LinkDecision::NotWanted;
            }
        }

        if ctx.declared {
            LinkDecision::Wanted(self.flags)
        } else {
            LinkDecision::NotWanted
        }
    }
}
