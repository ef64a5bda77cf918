//! Outbound notifications.
//!
//! Every engine instance owns its own [`EventBus`]; there is no global event
//! bus. Observers are plain callbacks and may not call back into the engine.

use crate::graph::{GraphSnapshot, ProxyRelay};
use crate::types::{EdgeFlags, GraphId, GraphKind, NodeId};
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Something that happened to the connectivity structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    GraphCreated {
        graph: GraphId,
        kind: GraphKind,
    },

    GraphDestroyed {
        graph: GraphId,
        kind: GraphKind,
    },

    /// `node` joined `graph`. `prev` is the graph it left in the same move.
    NodeAdded {
        graph: GraphId,
        node: NodeId,
        prev: Option<GraphId>,
    },

    /// `node` left `graph`. `next` is the graph it is moving to, if any.
    NodeRemoved {
        graph: GraphId,
        node: NodeId,
        next: Option<GraphId>,
    },

    /// Raised once per endpoint; `flags` are from `node`'s perspective.
    EdgeAdded {
        node: NodeId,
        other: NodeId,
        flags: EdgeFlags,
    },

    EdgeRemoved {
        node: NodeId,
        other: NodeId,
        flags: EdgeFlags,
    },

    EdgeChanged {
        node: NodeId,
        other: NodeId,
        flags: EdgeFlags,
        old: EdgeFlags,
    },

    /// Before any member of `absorbed` moves into `survivor`.
    Merging {
        survivor: GraphId,
        absorbed: GraphId,
    },

    /// After the merge. `absorbed` no longer exists.
    Merged {
        survivor: GraphId,
        absorbed: GraphId,
        moved: Vec<NodeId>,
    },

    /// Before `leaving` move from `graph` into the freshly created `split`.
    Splitting {
        graph: GraphId,
        split: GraphId,
        leaving: Vec<NodeId>,
    },

    /// After the split; `members` is the finalized component now in `split`.
    Split {
        graph: GraphId,
        split: GraphId,
        members: Vec<NodeId>,
    },

    /// A node-level event re-raised on the poly host that owns the node.
    ProxyRelayed(ProxyRelay),

    /// Debug broadcast of the whole structure.
    Snapshot(Box<GraphSnapshot>),
}

impl GraphEvent {
    /// The node this event is raised on, for node-level events.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            GraphEvent::NodeAdded { node, .. }
            | GraphEvent::NodeRemoved { node, .. }
            | GraphEvent::EdgeAdded { node, .. }
            | GraphEvent::EdgeRemoved { node, .. }
            | GraphEvent::EdgeChanged { node, .. } => Some(*node),
            _ => None,
        }
    }

    /// Short name for logs and tables.
    pub fn name(&self) -> &'static str {
        match self {
            GraphEvent::GraphCreated { .. } => "graph_created",
            GraphEvent::GraphDestroyed { .. } => "graph_destroyed",
            GraphEvent::NodeAdded { .. } => "node_added",
            GraphEvent::NodeRemoved { .. } => "node_removed",
            GraphEvent::EdgeAdded { .. } => "edge_added",
            GraphEvent::EdgeRemoved { .. } => "edge_removed",
            GraphEvent::EdgeChanged { .. } => "edge_changed",
            GraphEvent::Merging { .. } => "merging",
            GraphEvent::Merged { .. } => "merged",
            GraphEvent::Splitting { .. } => "splitting",
            GraphEvent::Split { .. } => "split",
            GraphEvent::ProxyRelayed(_) => "proxy_relayed",
            GraphEvent::Snapshot(_) => "snapshot",
        }
    }

    pub fn is_edge_event(&self) -> bool {
        matches!(
            self,
            GraphEvent::EdgeAdded { .. }
                | GraphEvent::EdgeRemoved { .. }
                | GraphEvent::EdgeChanged { .. }
        )
    }
}

/// Receives engine events.
pub trait GraphObserver {
    fn on_event(&mut self, event: &GraphEvent);
}

impl<F> GraphObserver for F
where
    F: FnMut(&GraphEvent),
{
    fn on_event(&mut self, event: &GraphEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Instance-scoped publish/subscribe registry.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<(SubscriberId, Box<dyn GraphObserver>)>,
    next_id: u64,
    published: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn GraphObserver>) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, observer));
        id
    }

    /// Returns false if the subscriber was not registered.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscribers.is_empty()
    }

    /// Total events published over the bus lifetime.
    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn publish(&mut self, event: GraphEvent) {
        self.published += 1;
        for (_, observer) in self.subscribers.iter_mut() {
            observer.on_event(&event);
        }
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .field("published", &self.published)
            .finish()
    }
}

/// Observer that records every event. Cloning shares the same log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Rc<RefCell<Vec<GraphEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A boxed observer feeding this log, for `EventBus::subscribe`.
    pub fn observer(&self) -> Box<dyn GraphObserver> {
        Box::new(self.clone())
    }

    pub fn events(&self) -> Vec<GraphEvent> {
        self.events.borrow().clone()
    }

    /// Drain recorded events.
    pub fn take(&self) -> Vec<GraphEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    pub fn count(&self, pred: impl Fn(&GraphEvent) -> bool) -> usize {
        self.events.borrow().iter().filter(|e| pred(e)).count()
    }
}

impl GraphObserver for EventLog {
    fn on_event(&mut self, event: &GraphEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}
