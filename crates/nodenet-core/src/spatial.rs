//! Spatial collaborator interface.
//!
//! The engine does not know where anything is. It asks a [`SpatialIndex`] for
//! candidate neighbours of a host and hands the placements of both ends to the
//! autolinkers. [`GridIndex`] is a plain tile-grid implementation used by the
//! CLI, the tests and the benchmarks.

use crate::types::HostId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Where a host sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    /// Which grid (station, shuttle, ...) the host is on.
    pub grid: u32,
    pub x: i32,
    pub y: i32,
    /// Anchored hosts are fixed to their tile (wired in, bolted down).
    pub anchored: bool,
}

impl Placement {
    pub fn new(grid: u32, x: i32, y: i32) -> Self {
        Self {
            grid,
            x,
            y,
            anchored: true,
        }
    }

    pub fn unanchored(mut self) -> Self {
        self.anchored = false;
        self
    }

    pub fn tile(&self) -> Tile {
        Tile {
            grid: self.grid,
            x: self.x,
            y: self.y,
        }
    }

    pub fn same_tile(&self, other: &Placement) -> bool {
        self.tile() == other.tile()
    }

    /// Orthogonally adjacent on the same grid.
    pub fn is_adjacent(&self, other: &Placement) -> bool {
        self.grid == other.grid && (self.x - other.x).abs() + (self.y - other.y).abs() == 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tile {
    pub grid: u32,
    pub x: i32,
    pub y: i32,
}

impl Tile {
    fn neighbours(self) -> [Tile; 4] {
        let Tile { grid, x, y } = self;
        [
            Tile { grid, x: x + 1, y },
            Tile { grid, x: x - 1, y },
            Tile { grid, x, y: y + 1 },
            Tile { grid, x, y: y - 1 },
        ]
    }
}

/// Spatial lookup the engine consumes.
///
/// Implementations must be deterministic: the same world state must produce the
/// same answers, or `update_edges` loses its idempotence.
pub trait SpatialIndex {
    /// Where a host is, if it is anywhere.
    fn placement(&self, host: HostId) -> Option<Placement>;

    /// Hosts that might want an edge with `host`. Must not include `host`.
    fn candidates(&self, host: HostId) -> Vec<HostId>;

    /// Whether an explicit link between the two hosts has been declared.
    fn declared(&self, _a: HostId, _b: HostId) -> bool {
        false
    }
}

/// No world at all. Only manual edges and same-host proxies can link.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpatial;

impl SpatialIndex for NoSpatial {
    fn placement(&self, _host: HostId) -> Option<Placement> {
        None
    }

    fn candidates(&self, _host: HostId) -> Vec<HostId> {
        Vec::new()
    }
}

/// Tile grid index: candidates are hosts on the same tile, the four
/// orthogonal neighbours, and explicitly declared link partners.
#[derive(Debug, Clone, Default)]
pub struct GridIndex {
    hosts: HashMap<HostId, Placement>,
    tiles: HashMap<Tile, Vec<HostId>>,
    links: HashMap<HostId, BTreeSet<HostId>>,
}

impl GridIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a host somewhere, replacing any previous placement.
    pub fn place(&mut self, host: HostId, placement: Placement) {
        self.remove(host);
        self.hosts.insert(host, placement);
        self.tiles.entry(placement.tile()).or_default().push(host);
    }

    /// Move a host to another tile, keeping its anchored state.
    /// Returns false if the host is not placed.
    pub fn move_to(&mut self, host: HostId, grid: u32, x: i32, y: i32) -> bool {
        let Some(current) = self.hosts.get(&host).copied() else {
            return false;
        };
        self.place(
            host,
            Placement {
                grid,
                x,
                y,
                anchored: current.anchored,
            },
        );
        true
    }

    /// Returns false if the host is not placed.
    pub fn set_anchored(&mut self, host: HostId, anchored: bool) -> bool {
        match self.hosts.get_mut(&host) {
            Some(placement) => {
                placement.anchored = anchored;
                true
            }
            None => false,
        }
    }

    /// Declare an explicit link. Returns false for self-links.
    pub fn declare_link(&mut self, a: HostId, b: HostId) -> bool {
        if a == b {
            return false;
        }
        self.links.entry(a).or_default().insert(b);
        self.links.entry(b).or_default().insert(a);
        true
    }

    /// Returns false if no such link was declared.
    pub fn retract_link(&mut self, a: HostId, b: HostId) -> bool {
        let removed = self.links.get_mut(&a).is_some_and(|set| set.remove(&b));
        if let Some(set) = self.links.get_mut(&b) {
            set.remove(&a);
        }
        self.links.retain(|_, set| !set.is_empty());
        removed
    }

    /// Remove a host's placement. Declared links stay until the host is forgotten.
    pub fn remove(&mut self, host: HostId) -> Option<Placement> {
        let placement = self.hosts.remove(&host)?;
        let tile = placement.tile();
        if let Some(list) = self.tiles.get_mut(&tile) {
            list.retain(|h| *h != host);
            if list.is_empty() {
                self.tiles.remove(&tile);
            }
        }
        Some(placement)
    }

    /// Remove a host entirely, placement and declared links.
    pub fn forget(&mut self, host: HostId) {
        self.remove(host);
        if let Some(partners) = self.links.remove(&host) {
            for partner in partners {
                if let Some(set) = self.links.get_mut(&partner) {
                    set.remove(&host);
                }
            }
            self.links.retain(|_, set| !set.is_empty());
        }
    }

    pub fn hosts_at(&self, tile: Tile) -> &[HostId] {
        self.tiles.get(&tile).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl SpatialIndex for GridIndex {
    fn placement(&self, host: HostId) -> Option<Placement> {
        self.hosts.get(&host).copied()
    }

    fn candidates(&self, host: HostId) -> Vec<HostId> {
        let mut out: Vec<HostId> = self
            .links
            .get(&host)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        if let Some(placement) = self.hosts.get(&host) {
            let tile = placement.tile();
            out.extend(self.hosts_at(tile).iter().copied().filter(|h| *h != host));
            for neighbour in tile.neighbours() {
                out.extend_from_slice(self.hosts_at(neighbour));
            }
        }

        out.sort();
        out.dedup();
        out
    }

    fn declared(&self, a: HostId, b: HostId) -> bool {
        self.links.get(&a).is_some_and(|set| set.contains(&b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::new_host_id;

    #[test]
    fn test_candidates_same_tile_and_cardinal() {
        let mut grid = GridIndex::new();
        let center = new_host_id();
        let same = new_host_id();
        let east = new_host_id();
        let diagonal = new_host_id();
        let other_grid = new_host_id();

        grid.place(center, Placement::new(0, 0, 0));
        grid.place(same, Placement::new(0, 0, 0));
        grid.place(east, Placement::new(0, 1, 0));
        grid.place(diagonal, Placement::new(0, 1, 1));
        grid.place(other_grid, Placement::new(1, 1, 0));

        let candidates = grid.candidates(center);
        assert!(candidates.contains(&same));
        assert!(candidates.contains(&east));
        assert!(!candidates.contains(&diagonal));
        assert!(!candidates.contains(&other_grid));
        assert!(!candidates.contains(&center));
    }

    #[test]
    fn test_move_and_remove() {
        let mut grid = GridIndex::new();
        let a = new_host_id();
        let b = new_host_id();
        grid.place(a, Placement::new(0, 0, 0));
        grid.place(b, Placement::new(0, 5, 5));
        assert!(grid.candidates(a).is_empty());

        assert!(grid.move_to(b, 0, 0, 1));
        assert_eq!(grid.candidates(a), vec![b]);
        assert!(grid.hosts_at(Tile { grid: 0, x: 5, y: 5 }).is_empty());

        assert!(grid.remove(b).is_some());
        assert!(grid.candidates(a).is_empty());
        assert!(!grid.move_to(b, 0, 0, 0));
    }

    #[test]
    fn test_declared_links_are_candidates_at_any_distance() {
        let mut grid = GridIndex::new();
        let a = new_host_id();
        let b = new_host_id();
        grid.place(a, Placement::new(0, 0, 0));
        grid.place(b, Placement::new(3, 40, 40));
        assert!(grid.candidates(a).is_empty());

        assert!(grid.declare_link(a, b));
        assert!(!grid.declare_link(a, a));
        assert_eq!(grid.candidates(a), vec![b]);
        assert_eq!(grid.candidates(b), vec![a]);
        assert!(grid.declared(b, a));

        assert!(grid.retract_link(b, a));
        assert!(!grid.declared(a, b));
        assert!(!grid.retract_link(a, b));

        grid.declare_link(a, b);
        grid.forget(b);
        assert!(grid.candidates(a).is_empty());
    }

    #[test]
    fn test_set_anchored_keeps_tile() {
        let mut grid = GridIndex::new();
        let a = new_host_id();
        grid.place(a, Placement::new(2, 3, 4));
        assert!(grid.set_anchored(a, false));
        let placement = grid.placement(a).unwrap();
        assert!(!placement.anchored);
        assert_eq!(placement.tile(), Tile { grid: 2, x: 3, y: 4 });
    }
}
