use crate::error::{NodeNetError, Result};
use crate::events::GraphEvent;
use crate::graph::NodeGraphEngine;
use crate::types::{GraphKind, HostId, NodeId, ProxyKey};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A node-level event re-raised on the poly host that owns the node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyRelay {
    pub host: HostId,
    pub proxy: NodeId,
    pub key: ProxyKey,
    pub event: Box<GraphEvent>,
}

/// What a poly host can ask of one of its proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyCommand {
    /// Re-evaluate the proxy's edges at the next settle (host moved or anchored).
    QueueEdgeUpdate,
    ClearEdgeUpdate,
    /// Re-check the connectivity of the proxy's graph right away.
    ForceSplitCheck,
}

/// Host-side logic of a poly host ("am I powered").
///
/// Called synchronously for every event raised on one of the host's proxies.
pub trait PolyHandler {
    fn on_relay(&mut self, relay: &ProxyRelay);
}

impl<F> PolyHandler for F
where
    F: FnMut(&ProxyRelay),
{
    fn on_relay(&mut self, relay: &ProxyRelay) {
        self(relay)
    }
}

#[derive(Default)]
pub(crate) struct PolyHost {
    pub(crate) proxies: BTreeMap<ProxyKey, NodeId>,
    pub(crate) handler: Option<Box<dyn PolyHandler>>,
}

impl fmt::Debug for PolyHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolyHost")
            .field("proxies", &self.proxies)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

pub(crate) type PolyRegistry = HashMap<HostId, PolyHost>;

impl NodeGraphEngine {
    /// Turn a host into a poly host that can own several proxies.
    /// Idempotent. Fails if the host already owns a plain node.
    pub fn create_poly_host(&mut self, host: HostId) -> Result<()> {
        if self.polys.contains_key(&host) {
            return Ok(());
        }
        if !self.store.host_nodes(host).is_empty() {
            return Err(NodeNetError::HostAlreadyLinked(host));
        }
        self.polys.insert(host, PolyHost::default());
        Ok(())
    }

    pub fn set_poly_handler(&mut self, host: HostId, handler: Box<dyn PolyHandler>) -> Result<()> {
        let poly = self
            .polys
            .get_mut(&host)
            .ok_or(NodeNetError::NotPolyHost(host))?;
        poly.handler = Some(handler);
        Ok(())
    }

    pub fn is_poly(&self, host: HostId) -> bool {
        self.polys.contains_key(&host)
    }

    /// Create a proxy node on a poly host. The proxy joins graphs on its own.
    pub fn add_proxy(&mut self, host: HostId, key: ProxyKey, kind: GraphKind) -> Result<NodeId> {
        let poly = self
            .polys
            .get(&host)
            .ok_or(NodeNetError::NotPolyHost(host))?;
        if poly.proxies.contains_key(&key) {
            return Err(NodeNetError::DuplicateProxy { host, key });
        }

        let node = self.store.create_node(host, kind, Some(key.clone()));
        if let Some(poly) = self.polys.get_mut(&host) {
            poly.proxies.insert(key, node);
        }
        self.node_created(node)?;
        Ok(node)
    }

    pub fn remove_proxy(&mut self, host: HostId, key: &ProxyKey) -> Result<()> {
        let node = self.proxy(host, key)?;
        self.destroy_node(node)
    }

    pub fn proxy(&self, host: HostId, key: &ProxyKey) -> Result<NodeId> {
        let poly = self
            .polys
            .get(&host)
            .ok_or(NodeNetError::NotPolyHost(host))?;
        poly.proxies
            .get(key)
            .copied()
            .ok_or_else(|| NodeNetError::ProxyNotFound {
                host,
                key: key.clone(),
            })
    }

    /// Proxies of a poly host, ordered by key.
    pub fn proxies(&self, host: HostId) -> Vec<(ProxyKey, NodeId)> {
        self.polys
            .get(&host)
            .map(|poly| {
                poly.proxies
                    .iter()
                    .map(|(k, n)| (k.clone(), *n))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Route a command from a poly host down to one proxy.
    pub fn relay_to_proxy(
        &mut self,
        host: HostId,
        key: &ProxyKey,
        command: ProxyCommand,
    ) -> Result<()> {
        let node = self.proxy(host, key)?;
        self.apply_proxy_command(node, command)
    }

    /// Route a command to every proxy of a poly host. Returns how many received it.
    pub fn relay_to_proxies(&mut self, host: HostId, command: ProxyCommand) -> Result<usize> {
        let nodes: Vec<NodeId> = self
            .polys
            .get(&host)
            .ok_or(NodeNetError::NotPolyHost(host))?
            .proxies
            .values()
            .copied()
            .collect();
        for node in &nodes {
            self.apply_proxy_command(*node, command)?;
        }
        Ok(nodes.len())
    }

    fn apply_proxy_command(&mut self, node: NodeId, command: ProxyCommand) -> Result<()> {
        match command {
            ProxyCommand::QueueEdgeUpdate => {
                self.queue_edge_update(node)?;
            }
            ProxyCommand::ClearEdgeUpdate => {
                self.clear_edge_update(node)?;
            }
            ProxyCommand::ForceSplitCheck => {
                if let Some(graph) = self.store.node(node)?.graph {
                    self.force_split_check(graph)?;
                }
            }
        }
        Ok(())
    }

    /// Wrap an event raised on a proxy for its owning host, if `node` is one.
    pub(crate) fn relay_for(&self, node: NodeId, event: &GraphEvent) -> Option<ProxyRelay> {
        let n = self.store.get_node(node)?;
        let key = n.proxy.clone()?;
        Some(ProxyRelay {
            host: n.host,
            proxy: node,
            key,
            event: Box::new(event.clone()),
        })
    }

    pub(crate) fn deliver_relay(&mut self, relay: &ProxyRelay) {
        if let Some(handler) = self
            .polys
            .get_mut(&relay.host)
            .and_then(|poly| poly.handler.as_mut())
        {
            handler.on_relay(relay);
        }
    }

    /// Forget a proxy after its node is gone.
    pub(crate) fn forget_proxy(&mut self, host: HostId, key: &ProxyKey) {
        if let Some(poly) = self.polys.get_mut(&host) {
            poly.proxies.remove(key);
        }
    }
}
