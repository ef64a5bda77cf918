use anyhow::{Context, Result};
use nodenet_core::{
    DeclaredLinker, EngineConfig, GraphKind, NodeGraphEngine, TileAdjacencyLinker,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Contents of nodenet.toml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodenetConfig {
    pub engine: EngineConfig,
    pub linkers: LinkerConfig,
}

/// Which reference autolinkers a scenario run registers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkerConfig {
    /// Register a `TileAdjacencyLinker`.
    pub tile_adjacency: bool,

    /// Link nodes sharing a tile.
    pub same_tile: bool,

    /// Link sibling proxies of one poly host.
    pub same_host: bool,

    /// Both hosts must be anchored for a tile edge.
    pub require_anchored: bool,

    /// Register a `DeclaredLinker` for explicit `link` steps.
    pub declared: bool,

    /// Restrict both linkers to these kinds. Empty = all kinds.
    pub kinds: Vec<String>,
}

impl Default for LinkerConfig {
    fn default() -> Self {
        Self {
            tile_adjacency: true,
            same_tile: true,
            same_host: false,
            require_anchored: true,
            declared: true,
            kinds: Vec::new(),
        }
    }
}

impl NodenetConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: NodenetConfig =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Falls back to defaults when the file is missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Every problem found, empty when the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Err(e) = self.engine.validate() {
            errors.push(format!("engine: {}", e));
        }

        for kind in &self.linkers.kinds {
            if let Err(e) = GraphKind::new(kind) {
                errors.push(format!("linkers.kinds: {}", e));
            }
        }

        if !self.linkers.tile_adjacency && !self.linkers.declared {
            errors.push("linkers: no autolinker enabled, only manual edges would form".into());
        }

        errors
    }

    /// Build an engine with the configured autolinkers registered.
    pub fn build_engine(&self) -> Result<NodeGraphEngine> {
        let mut engine = NodeGraphEngine::new(self.engine.clone())?;

        let kinds = self
            .linkers
            .kinds
            .iter()
            .map(|k| GraphKind::new(k))
            .collect::<nodenet_core::Result<Vec<_>>>()?;

        if self.linkers.tile_adjacency {
            let mut linker = TileAdjacencyLinker::new()
                .with_same_tile(self.linkers.same_tile)
                .with_same_host(self.linkers.same_host)
                .with_require_anchored(self.linkers.require_anchored);
            if !kinds.is_empty() {
                linker = linker.with_kinds(kinds.clone());
            }
            engine.register_linker(Box::new(linker));
        }

        if self.linkers.declared {
            let mut linker = DeclaredLinker::new();
            if !kinds.is_empty() {
                linker.kinds = Some(kinds);
            }
            engine.register_linker(Box::new(linker));
        }

        Ok(engine)
    }
}
