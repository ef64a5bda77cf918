//! Autolinker protocol: pluggable domain rules that decide which edges exist
//!
//! The engine collects candidate neighbours from the spatial index, then asks
//! every registered [`Autolinker`] about both directions of each pair:
//! - any linker wanting the edge (from either side) makes it exist
//! - flags are the bitwise OR of every wanting linker's flags
//! - answers are pure functions of the [`LinkContext`], so re-running the
//!   query with no world change never produces new events

mod registry;
mod rules;


pub use registry::LinkerRegistry;
pub use rules::{
    Autolinker, DeclaredLinker, LinkContext, LinkDecision, LinkEnd, TileAdjacencyLinker,
};
