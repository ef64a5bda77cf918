use crate::error::{NodeNetError, Result};
use crate::types::GraphKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// When split checks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMode {
    /// Collect affected nodes and run one pass per graph during `settle`.
    #[default]
    Deferred,

    /// Check right after every edge or node removal.
    Immediate,
}

/// What to do when settlement finds a broken invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantPolicy {
    /// Abort. Default in debug builds.
    Panic,

    /// Log, then force a full split re-check of the offending graphs.
    /// Default in release builds.
    Heal,
}

impl Default for InvariantPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            InvariantPolicy::Panic
        } else {
            InvariantPolicy::Heal
        }
    }
}

/// Whether a node without edges keeps a graph of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolatedPolicy {
    /// Every node always has a graph; isolated nodes get a singleton.
    #[default]
    SingletonGraph,

    /// Isolated nodes have no graph until an edge appears.
    Detached,
}

/// Configuration for the node graph engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Incremental or batched split checks. Default: deferred.
    pub split_mode: SplitMode,

    /// Reaction to invariant violations found at settlement.
    pub invariant_policy: InvariantPolicy,

    /// Run the full invariant check at the end of every settle.
    /// O(nodes + edges). Default: on in debug builds.
    pub verify_on_settle: bool,

    /// Broadcast a full snapshot after every settle. Default: false.
    pub debug_broadcast: bool,

    /// Isolated-node policy for kinds without an entry in `kind_policies`.
    pub default_isolated_policy: IsolatedPolicy,

    /// Per-kind isolated-node policy overrides.
    pub kind_policies: BTreeMap<GraphKind, IsolatedPolicy>,

    /// Maximum queued edge updates processed per settle. Remaining updates
    /// stay queued for the next tick. 0 = unlimited.
    pub max_edge_updates_per_tick: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            split_mode: SplitMode::default(),
            invariant_policy: InvariantPolicy::default(),
            verify_on_settle: cfg!(debug_assertions),
            debug_broadcast: false,
            default_isolated_policy: IsolatedPolicy::default(),
            kind_policies: BTreeMap::new(),
            max_edge_updates_per_tick: 0,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_split_mode(mut self, mode: SplitMode) -> Self {
        self.split_mode = mode;
        self
    }

    pub fn with_invariant_policy(mut self, policy: InvariantPolicy) -> Self {
        self.invariant_policy = policy;
        self
    }

    pub fn with_verify_on_settle(mut self, verify: bool) -> Self {
        self.verify_on_settle = verify;
        self
    }

    pub fn with_debug_broadcast(mut self, enabled: bool) -> Self {
        self.debug_broadcast = enabled;
        self
    }

    pub fn with_default_isolated_policy(mut self, policy: IsolatedPolicy) -> Self {
        self.default_isolated_policy = policy;
        self
    }

    pub fn with_kind_policy(mut self, kind: GraphKind, policy: IsolatedPolicy) -> Self {
        self.kind_policies.insert(kind, policy);
        self
    }

    pub fn with_max_edge_updates_per_tick(mut self, max: usize) -> Self {
        self.max_edge_updates_per_tick = max;
        self
    }

    pub fn isolated_policy(&self, kind: &GraphKind) -> IsolatedPolicy {
        self.kind_policies
            .get(kind)
            .copied()
            .unwrap_or(self.default_isolated_policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_edge_updates_per_tick == 0 {
            return Ok(());
        }

        // A budget this small cannot keep up with a single multi-tile placement.
        if self.max_edge_updates_per_tick < 4 {
            return Err(NodeNetError::Validation(
                "max_edge_updates_per_tick must be 0 (unlimited) or >= 4".into(),
            ));
        }

        Ok(())
    }
}
