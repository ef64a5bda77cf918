//! Scenario files: a named list of steps replayed against one engine.
//!
//! ```toml
//! name = "substation"
//!
//! [[step]]
//! op = "place"
//! host = "hv1"
//! kind = "power_hv"
//! at = { x = 0, y = 0 }
//!
//! [[step]]
//! op = "tick"
//! ```
//!
//! Hosts are referred to by label. Proxy nodes of a poly host are `host:key`.

use anyhow::{Context, Result};
use nodenet_core::{EdgeFlags, GraphKind, Placement};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// A tile position. `grid` defaults to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct At {
    #[serde(default)]
    pub grid: u32,
    pub x: i32,
    pub y: i32,
}

impl At {
    pub fn placement(self, anchored: bool) -> Placement {
        let placement = Placement::new(self.grid, self.x, self.y);
        if anchored {
            placement
        } else {
            placement.unanchored()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySpec {
    pub key: String,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Place a host owning a single node.
    Place {
        host: String,
        kind: String,
        at: At,
        #[serde(default = "default_anchored")]
        anchored: bool,
    },

    /// Place a poly host with its proxies.
    Poly {
        host: String,
        at: At,
        #[serde(default = "default_anchored")]
        anchored: bool,
        #[serde(default)]
        proxies: Vec<ProxySpec>,
    },

    /// Add a proxy to an existing poly host.
    Proxy {
        host: String,
        key: String,
        kind: String,
    },

    RemoveProxy {
        host: String,
        key: String,
    },

    /// Destroy a host and everything it owns.
    Remove {
        host: String,
    },

    Move {
        host: String,
        to: At,
    },

    Anchor {
        host: String,
    },

    Unanchor {
        host: String,
    },

    /// Declare an explicit link between two hosts (device links).
    Link {
        a: String,
        b: String,
    },

    Unlink {
        a: String,
        b: String,
    },

    /// Manual edge between two nodes, with optional user flag numbers.
    Connect {
        a: String,
        b: String,
        #[serde(default)]
        flags: Vec<u32>,
    },

    /// Remove a manual edge.
    Disconnect {
        a: String,
        b: String,
    },

    /// Settle the engine `count` times.
    Tick {
        #[serde(default = "default_count")]
        count: u32,
    },
}

fn default_anchored() -> bool {
    true
}

fn default_count() -> u32 {
    1
}

impl Step {
    pub fn op(&self) -> &'static str {
        match self {
            Step::Place { .. } => "place",
            Step::Poly { .. } => "poly",
            Step::Proxy { .. } => "proxy",
            Step::RemoveProxy { .. } => "remove_proxy",
            Step::Remove { .. } => "remove",
            Step::Move { .. } => "move",
            Step::Anchor { .. } => "anchor",
            Step::Unanchor { .. } => "unanchor",
            Step::Link { .. } => "link",
            Step::Unlink { .. } => "unlink",
            Step::Connect { .. } => "connect",
            Step::Disconnect { .. } => "disconnect",
            Step::Tick { .. } => "tick",
        }
    }
}

/// `host` or `host:key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRef<'a> {
    pub host: &'a str,
    pub proxy: Option<&'a str>,
}

impl<'a> NodeRef<'a> {
    pub fn parse(raw: &'a str) -> Self {
        match raw.split_once(':') {
            Some((host, proxy)) => Self {
                host,
                proxy: Some(proxy),
            },
            None => Self {
                host: raw,
                proxy: None,
            },
        }
    }
}

/// Caller flags for a manual edge from user flag numbers.
pub fn user_flags(numbers: &[u32]) -> EdgeFlags {
    numbers
        .iter()
        .fold(EdgeFlags::NONE, |acc, n| acc | EdgeFlags::user(*n))
}

const MAX_USER_FLAG: u32 = 32 - EdgeFlags::USER_SHIFT;

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn tick_count(&self) -> u32 {
        self.steps
            .iter()
            .map(|s| match s {
                Step::Tick { count } => *count,
                _ => 0,
            })
            .sum()
    }

    /// Walk the steps without an engine and report everything that would fail.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let mut hosts: HashMap<&str, HostShape> = HashMap::new();

        for (index, step) in self.steps.iter().enumerate() {
            let mut fail =
                |msg: String| errors.push(format!("step {} ({}): {}", index + 1, step.op(), msg));

            match step {
                Step::Place { host, kind, .. } => {
                    if let Err(msg) = check_label(host) {
                        fail(msg);
                    } else if hosts.contains_key(host.as_str()) {
                        fail(format!("host '{}' is already placed", host));
                    } else if let Err(e) = GraphKind::new(kind) {
                        fail(e.to_string());
                    } else {
                        hosts.insert(host, HostShape::Plain(kind));
                    }
                }
                Step::Poly { host, proxies, .. } => {
                    if let Err(msg) = check_label(host) {
                        fail(msg);
                        continue;
                    }
                    if hosts.contains_key(host.as_str()) {
                        fail(format!("host '{}' is already placed", host));
                        continue;
                    }
                    let mut shape = BTreeMap::new();
                    for proxy in proxies {
                        if let Err(e) = GraphKind::new(&proxy.kind) {
                            fail(e.to_string());
                        } else if shape.insert(proxy.key.as_str(), proxy.kind.as_str()).is_some() {
                            fail(format!("duplicate proxy '{}' on '{}'", proxy.key, host));
                        }
                    }
                    hosts.insert(host, HostShape::Poly(shape));
                }
                Step::Proxy { host, key, kind } => match hosts.get_mut(host.as_str()) {
                    Some(HostShape::Poly(proxies)) => {
                        if let Err(e) = GraphKind::new(kind) {
                            fail(e.to_string());
                        } else if proxies.insert(key, kind).is_some() {
                            fail(format!("duplicate proxy '{}' on '{}'", key, host));
                        }
                    }
                    Some(HostShape::Plain(_)) => {
                        fail(format!("host '{}' is not a poly host", host))
                    }
                    None => fail(format!("unknown host '{}'", host)),
                },
                Step::RemoveProxy { host, key } => match hosts.get_mut(host.as_str()) {
                    Some(HostShape::Poly(proxies)) => {
                        if proxies.remove(key.as_str()).is_none() {
                            fail(format!("no proxy '{}' on '{}'", key, host));
                        }
                    }
                    Some(HostShape::Plain(_)) => {
                        fail(format!("host '{}' is not a poly host", host))
                    }
                    None => fail(format!("unknown host '{}'", host)),
                },
                Step::Remove { host } => {
                    if hosts.remove(host.as_str()).is_none() {
                        fail(format!("unknown host '{}'", host));
                    }
                }
                Step::Move { host, .. } | Step::Anchor { host } | Step::Unanchor { host } => {
                    if !hosts.contains_key(host.as_str()) {
                        fail(format!("unknown host '{}'", host));
                    }
                }
                Step::Link { a, b } | Step::Unlink { a, b } => {
                    for label in [a, b] {
                        if !hosts.contains_key(label.as_str()) {
                            fail(format!("unknown host '{}'", label));
                        }
                    }
                    if a == b {
                        fail(format!("cannot link '{}' to itself", a));
                    }
                }
                Step::Connect { a, b, flags } => {
                    let kinds = (resolve_kind(&hosts, a), resolve_kind(&hosts, b));
                    match kinds {
                        (Ok(ka), Ok(kb)) if ka != kb => {
                            fail(format!("'{}' is {} but '{}' is {}", a, ka, b, kb))
                        }
                        (Ok(_), Ok(_)) => {}
                        (ra, rb) => {
                            for msg in [ra.err(), rb.err()].into_iter().flatten() {
                                fail(msg);
                            }
                        }
                    }
                    if a == b {
                        fail(format!("cannot connect '{}' to itself", a));
                    }
                    for n in flags {
                        if *n >= MAX_USER_FLAG {
                            fail(format!("user flag {} out of range (0..{})", n, MAX_USER_FLAG));
                        }
                    }
                }
                Step::Disconnect { a, b } => {
                    for label in [a, b] {
                        if let Err(msg) = resolve_kind(&hosts, label) {
                            fail(msg);
                        }
                    }
                }
                Step::Tick { count } => {
                    if *count == 0 {
                        fail("count must be at least 1".into());
                    }
                }
            }
        }

        errors
    }
}

enum HostShape<'a> {
    Plain(&'a str),
    Poly(BTreeMap<&'a str, &'a str>),
}

fn check_label(label: &str) -> std::result::Result<(), String> {
    if label.is_empty() {
        return Err("host label must not be empty".into());
    }
    if label.contains(':') {
        return Err(format!("host label '{}' may not contain ':'", label));
    }
    Ok(())
}

fn resolve_kind<'a>(
    hosts: &HashMap<&str, HostShape<'a>>,
    raw: &str,
) -> std::result::Result<&'a str, String> {
    let node = NodeRef::parse(raw);
    match (hosts.get(node.host), node.proxy) {
        (None, _) => Err(format!("unknown host '{}'", node.host)),
        (Some(HostShape::Plain(kind)), None) => Ok(*kind),
        (Some(HostShape::Plain(_)), Some(_)) => {
            Err(format!("host '{}' is not a poly host", node.host))
        }
        (Some(HostShape::Poly(_)), None) => {
            Err(format!("'{}' is a poly host, name a proxy as '{}:key'", node.host, node.host))
        }
        (Some(HostShape::Poly(proxies)), Some(key)) => proxies
            .get(key)
            .copied()
            .ok_or_else(|| format!("no proxy '{}' on '{}'", key, node.host)),
    }
}
