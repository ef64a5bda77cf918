//! Replays a scenario against an engine and a tile grid.

use crate::config::NodenetConfig;
use crate::scenario::{user_flags, At, NodeRef, Scenario, Step};
use nodenet_core::{
    EventLog, GraphKind, GraphSnapshot, GridIndex, HostId, NodeGraphEngine, NodeId, NodeNetError,
    ProxyKey, ProxyRelay, TickReport,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepError {
    #[error("unknown host '{0}'")]
    UnknownHost(String),

    #[error("host '{0}' is already placed")]
    HostExists(String),

    #[error("host '{0}' is not on the grid")]
    NotPlaced(String),

    #[error("'{0}' does not name a single node")]
    NotANode(String),

    #[error("cannot link '{0}' to itself")]
    SelfLink(String),

    #[error(transparent)]
    Engine(#[from] NodeNetError),
}

#[derive(Debug, Error)]
#[error("step {index} ({op}): {source}")]
pub struct RunError {
    pub index: usize,
    pub op: &'static str,
    pub source: StepError,
}

/// One settle of the engine.
#[derive(Debug, Clone, Serialize)]
pub struct TickRecord {
    pub report: TickReport,

    /// Events published during the tick, including those raised by the steps
    /// leading up to it.
    pub events: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<GraphSnapshot>,
}

/// A graph with its members named by scenario labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphListing {
    pub kind: String,
    pub members: Vec<String>,
    pub edges: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub name: String,
    pub ticks: Vec<TickRecord>,
    pub graphs: Vec<GraphListing>,
    pub detached: Vec<String>,
    pub metrics: String,
}

pub struct Runner {
    engine: NodeGraphEngine,
    grid: GridIndex,
    hosts: HashMap<String, HostId>,
    labels: HashMap<HostId, String>,
    log: EventLog,
    snapshots: bool,
    ticks: Vec<TickRecord>,
}

impl Runner {
    pub fn new(config: &NodenetConfig) -> anyhow::Result<Self> {
        let mut engine = config.build_engine()?;
        let log = EventLog::new();
        engine.subscribe(log.observer());

        Ok(Self {
            engine,
            grid: GridIndex::new(),
            hosts: HashMap::new(),
            labels: HashMap::new(),
            log,
            snapshots: false,
            ticks: Vec::new(),
        })
    }

    /// Record a full snapshot after every tick.
    pub fn with_snapshots(mut self, enabled: bool) -> Self {
        self.snapshots = enabled;
        self
    }

    /// Apply every step, then settle once more if anything happened after the
    /// last tick.
    pub fn run(mut self, scenario: &Scenario) -> Result<RunOutcome, RunError> {
        let mut dirty = false;
        for (i, step) in scenario.steps.iter().enumerate() {
            self.apply(step).map_err(|source| RunError {
                index: i + 1,
                op: step.op(),
                source,
            })?;
            dirty = !matches!(step, Step::Tick { .. });
        }

        if dirty || self.engine.pending_edge_updates() > 0 {
            self.tick().map_err(|source| RunError {
                index: scenario.steps.len() + 1,
                op: "tick",
                source,
            })?;
        }

        Ok(self.finish(scenario))
    }

    pub fn apply(&mut self, step: &Step) -> Result<(), StepError> {
        match step {
            Step::Place {
                host,
                kind,
                at,
                anchored,
            } => {
                let kind = GraphKind::new(kind)?;
                let id = self.new_host(host, *at, *anchored)?;
                self.engine.create_node(id, kind)?;
            }
            Step::Poly {
                host,
                at,
                anchored,
                proxies,
            } => {
                let id = self.new_host(host, *at, *anchored)?;
                self.engine.create_poly_host(id)?;

                let label = host.clone();
                self.engine.set_poly_handler(
                    id,
                    Box::new(move |relay: &ProxyRelay| {
                        tracing::debug!(
                            "{}:{} relayed {}",
                            label,
                            relay.key,
                            relay.event.name()
                        );
                    }),
                )?;

                for proxy in proxies {
                    self.engine.add_proxy(
                        id,
                        ProxyKey::new(proxy.key.as_str()),
                        GraphKind::new(&proxy.kind)?,
                    )?;
                }
            }
            Step::Proxy { host, key, kind } => {
                let id = self.host(host)?;
                self.engine.add_proxy(
                    id,
                    ProxyKey::new(key.as_str()),
                    GraphKind::new(kind)?,
                )?;
            }
            Step::RemoveProxy { host, key } => {
                let id = self.host(host)?;
                self.engine.remove_proxy(id, &ProxyKey::new(key.as_str()))?;
            }
            Step::Remove { host } => {
                let id = self.host(host)?;
                self.engine.host_destroyed(id)?;
                self.grid.forget(id);
                self.hosts.remove(host);
                self.labels.remove(&id);
            }
            Step::Move { host, to } => {
                let id = self.host(host)?;
                if !self.grid.move_to(id, to.grid, to.x, to.y) {
                    return Err(StepError::NotPlaced(host.clone()));
                }
                self.engine.host_moved(id)?;
            }
            Step::Anchor { host } | Step::Unanchor { host } => {
                let id = self.host(host)?;
                let anchored = matches!(step, Step::Anchor { .. });
                if !self.grid.set_anchored(id, anchored) {
                    return Err(StepError::NotPlaced(host.clone()));
                }
                self.engine.host_anchored(id)?;
            }
            Step::Link { a, b } | Step::Unlink { a, b } => {
                let (ha, hb) = (self.host(a)?, self.host(b)?);
                if ha == hb {
                    return Err(StepError::SelfLink(a.clone()));
                }
                if matches!(step, Step::Link { .. }) {
                    self.grid.declare_link(ha, hb);
                } else {
                    self.grid.retract_link(ha, hb);
                }
                self.engine.host_moved(ha)?;
                self.engine.host_moved(hb)?;
            }
            Step::Connect { a, b, flags } => {
                let (na, nb) = (self.node(a)?, self.node(b)?);
                if !self.engine.try_add_edge(na, nb, user_flags(flags))? {
                    tracing::debug!("manual edge {} <-> {} already present", a, b);
                }
            }
            Step::Disconnect { a, b } => {
                let (na, nb) = (self.node(a)?, self.node(b)?);
                if !self.engine.try_remove_edge(na, nb)? {
                    tracing::debug!("no manual edge {} <-> {}", a, b);
                }
            }
            Step::Tick { count } => {
                for _ in 0..*count {
                    self.tick()?;
                }
            }
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<(), StepError> {
        let report = self.engine.settle(&self.grid)?;
        tracing::debug!("{}", report.summary());

        let snapshot = self.snapshots.then(|| self.engine.snapshot());
        self.ticks.push(TickRecord {
            report,
            events: self.log.take().len(),
            snapshot,
        });
        Ok(())
    }

    fn new_host(&mut self, label: &str, at: At, anchored: bool) -> Result<HostId, StepError> {
        if self.hosts.contains_key(label) {
            return Err(StepError::HostExists(label.to_string()));
        }
        let id = nodenet_core::new_host_id();
        self.grid.place(id, at.placement(anchored));
        self.hosts.insert(label.to_string(), id);
        self.labels.insert(id, label.to_string());
        Ok(id)
    }

    fn host(&self, label: &str) -> Result<HostId, StepError> {
        self.hosts
            .get(label)
            .copied()
            .ok_or_else(|| StepError::UnknownHost(label.to_string()))
    }

    fn node(&self, raw: &str) -> Result<NodeId, StepError> {
        let node_ref = NodeRef::parse(raw);
        let host = self.host(node_ref.host)?;
        match node_ref.proxy {
            Some(key) => Ok(self.engine.proxy(host, &ProxyKey::new(key))?),
            None => self
                .engine
                .host_node(host)
                .ok_or_else(|| StepError::NotANode(raw.to_string())),
        }
    }

    fn label(&self, id: NodeId) -> String {
        let Ok(node) = self.engine.node(id) else {
            return format!("{:?}", id);
        };
        let host = self
            .labels
            .get(&node.host())
            .cloned()
            .unwrap_or_else(|| node.host().to_string());
        match node.proxy() {
            Some(key) => format!("{}:{}", host, key),
            None => host,
        }
    }

    fn finish(self, scenario: &Scenario) -> RunOutcome {
        let snapshot = self.engine.snapshot();

        let mut graphs: Vec<GraphListing> = snapshot
            .graphs
            .iter()
            .map(|g| {
                let mut members: Vec<String> = g.nodes.iter().map(|n| self.label(n.id)).collect();
                members.sort();
                GraphListing {
                    kind: g.kind.to_string(),
                    members,
                    edges: g.edges.len(),
                }
            })
            .collect();
        graphs.sort_by(|a, b| (&a.kind, &a.members).cmp(&(&b.kind, &b.members)));

        let mut detached: Vec<String> =
            snapshot.detached.iter().map(|n| self.label(n.id)).collect();
        detached.sort();

        RunOutcome {
            name: scenario.name.clone(),
            graphs,
            detached,
            metrics: self.engine.metrics().summary(),
            ticks: self.ticks,
        }
    }
}

/// Group sizes by kind, for quick summaries.
pub fn sizes_by_kind(outcome: &RunOutcome) -> BTreeMap<&str, Vec<usize>> {
    let mut out: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for graph in &outcome.graphs {
        out.entry(graph.kind.as_str()).or_default().push(graph.members.len());
    }
    for sizes in out.values_mut() {
        sizes.sort_unstable_by(|a, b| b.cmp(a));
    }
    out
}
