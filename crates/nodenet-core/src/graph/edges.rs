use crate::error::Result;
use crate::events::GraphEvent;
use crate::graph::NodeGraphEngine;
use crate::linker::{LinkContext, LinkDecision, LinkEnd};
use crate::spatial::SpatialIndex;
use crate::types::{EdgeFlags, NodeId};
use serde::Serialize;
use std::collections::BTreeSet;

/// Bits owned by the autolink protocol on any edge.
const AUTO_BITS: EdgeFlags = EdgeFlags::from_bits(
    EdgeFlags::AUTO.bits() | EdgeFlags::OUT.bits() | EdgeFlags::IN.bits(),
);

/// What one `update_edges` call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EdgeUpdate {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
}

impl EdgeUpdate {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0 && self.changed == 0
    }
}

impl NodeGraphEngine {
    /// Recompute the edges of `node` and apply the difference.
    ///
    /// Candidates are the nodes of every host the spatial index offers, the
    /// other nodes of the same host, and the node's current neighbours, all
    /// restricted to the node's own kind. Every autolinker is asked about both
    /// directions of each pair. Merges run as edges appear; removals seed split
    /// checks. Calling this again with no world change does nothing.
    pub fn update_edges(
        &mut self,
        node: NodeId,
        spatial: &dyn SpatialIndex,
    ) -> Result<EdgeUpdate> {
        let (host, kind) = {
            let n = self.store.node(node)?;
            (n.host, n.kind.clone())
        };

        let mut candidates: BTreeSet<NodeId> = BTreeSet::new();
        for other_host in spatial.candidates(host) {
            candidates.extend(self.store.host_nodes(other_host).iter().copied());
        }
        candidates.extend(self.store.host_nodes(host).iter().copied());
        candidates.extend(self.store.node(node)?.neighbours());
        candidates.remove(&node);
        candidates.retain(|c| self.store.get_node(*c).is_some_and(|n| n.kind == kind));

        let placement = spatial.placement(host);
        let mut update = EdgeUpdate::default();

        for other in candidates {
            // The store may have changed under earlier iterations (merges and,
            // in immediate mode, splits), so everything is re-read per pair.
            let Some(current) = self.store.get_node(node).map(|n| n.edge_to(other)) else {
                break;
            };
            let wanted = {
                let (Some(a), Some(b)) = (self.store.get_node(node), self.store.get_node(other))
                else {
                    continue;
                };
                let from = LinkEnd {
                    node,
                    host,
                    kind: &a.kind,
                    proxy: a.proxy.as_ref(),
                    placement,
                };
                let to = LinkEnd {
                    node: other,
                    host: b.host,
                    kind: &b.kind,
                    proxy: b.proxy.as_ref(),
                    placement: spatial.placement(b.host),
                };

                let outbound = self.linkers.evaluate(&LinkContext {
                    from,
                    to,
                    current,
                    declared: spatial.declared(host, b.host),
                });
                let inbound = self.linkers.evaluate(&LinkContext {
                    from: to,
                    to: from,
                    current: current.map(EdgeFlags::invert),
                    declared: spatial.declared(b.host, host),
                });

                let mut wanted = EdgeFlags::NONE;
                if let LinkDecision::Wanted(flags) = outbound {
                    wanted |= EdgeFlags::AUTO | EdgeFlags::OUT | flags;
                }
                if let LinkDecision::Wanted(flags) = inbound {
                    wanted |= EdgeFlags::AUTO | EdgeFlags::IN | flags;
                }
                wanted
            };

            match current {
                None if wanted.is_empty() => {}
                None => {
                    self.add_edge_internal(node, other, wanted)?;
                    update.added += 1;
                }
                Some(flags) if flags.contains(EdgeFlags::MANUAL) => {
                    // Manual edges keep their caller flags; only the
                    // protocol bits follow the autolinkers.
                    let next = (flags & !AUTO_BITS) | (wanted & AUTO_BITS);
                    if next != flags {
                        self.set_edge_internal(node, other, next)?;
                        update.changed += 1;
                    }
                }
                Some(_) if wanted.is_empty() => {
                    self.remove_edge_internal(node, other)?;
                    update.removed += 1;
                }
                Some(flags) if flags != wanted => {
                    self.set_edge_internal(node, other, wanted)?;
                    update.changed += 1;
                }
                Some(_) => {}
            }
        }

        if !update.is_empty() {
            log::trace!(
                "Edge update for {:?}: +{} -{} ~{}",
                node,
                update.added,
                update.removed,
                update.changed
            );
        }
        Ok(update)
    }

    // ---- Manual edges ----

    /// Add an externally managed edge. An existing autolinker edge is upgraded
    /// to manual. Returns false if a manual edge already exists.
    pub fn try_add_edge(&mut self, a: NodeId, b: NodeId, flags: EdgeFlags) -> Result<bool> {
        self.store.check_linkable(a, b)?;
        match self.store.edge_flags(a, b) {
            Some(current) if current.contains(EdgeFlags::MANUAL) => Ok(false),
            Some(current) => {
                let next = (current & AUTO_BITS) | EdgeFlags::MANUAL | flags.user_bits();
                self.set_edge_internal(a, b, next)?;
                Ok(true)
            }
            None => {
                self.add_edge_internal(a, b, EdgeFlags::MANUAL | flags.user_bits())?;
                Ok(true)
            }
        }
    }

    /// Remove a manual edge. If autolinkers also want it, the edge is relaxed
    /// to automatic and both endpoints are queued for an edge update instead.
    /// Returns false if there is no manual edge between the nodes.
    pub fn try_remove_edge(&mut self, a: NodeId, b: NodeId) -> Result<bool> {
        self.store.node(a)?;
        self.store.node(b)?;
        let Some(current) = self.store.edge_flags(a, b) else {
            return Ok(false);
        };
        if !current.contains(EdgeFlags::MANUAL) {
            return Ok(false);
        }

        if current.contains(EdgeFlags::AUTO) {
            self.set_edge_internal(a, b, current & !EdgeFlags::MANUAL)?;
            self.queue_edge_update(a)?;
            self.queue_edge_update(b)?;
        } else {
            self.remove_edge_internal(a, b)?;
        }
        Ok(true)
    }

    /// Create or overwrite a manual edge with the given caller flags.
    pub fn try_set_edge(&mut self, a: NodeId, b: NodeId, flags: EdgeFlags) -> Result<()> {
        self.store.check_linkable(a, b)?;
        match self.store.edge_flags(a, b) {
            Some(current) => {
                let next = (current & AUTO_BITS) | EdgeFlags::MANUAL | flags.user_bits();
                self.set_edge_internal(a, b, next)?;
            }
            None => self.add_edge_internal(a, b, EdgeFlags::MANUAL | flags.user_bits())?,
        }
        Ok(())
    }

    pub fn has_edge(&self, a: NodeId, b: NodeId) -> bool {
        self.store.edge_flags(a, b).is_some()
    }

    /// Flags of the edge a-b from `a`'s side.
    pub fn edge_flags(&self, a: NodeId, b: NodeId) -> Option<EdgeFlags> {
        self.store.edge_flags(a, b)
    }

    // ---- Internal edge mutations ----

    pub(crate) fn add_edge_internal(
        &mut self,
        a: NodeId,
        b: NodeId,
        flags: EdgeFlags,
    ) -> Result<()> {
        self.store.link(a, b, flags)?;
        self.metrics.current.edges_added += 1;
        self.emit(GraphEvent::EdgeAdded {
            node: a,
            other: b,
            flags,
        });
        self.emit(GraphEvent::EdgeAdded {
            node: b,
            other: a,
            flags: flags.invert(),
        });
        self.merge_at(a, b)?;
        Ok(())
    }

    pub(crate) fn remove_edge_internal(&mut self, a: NodeId, b: NodeId) -> Result<()> {
        self.unlink_seeded(a, b)?;
        self.maybe_split_now()
    }

    /// Remove the edge and seed split checks on both ends without running them.
    pub(crate) fn unlink_seeded(&mut self, a: NodeId, b: NodeId) -> Result<()> {
        let flags = self.store.unlink(a, b)?;
        self.metrics.current.edges_removed += 1;
        self.emit(GraphEvent::EdgeRemoved {
            node: a,
            other: b,
            flags,
        });
        self.emit(GraphEvent::EdgeRemoved {
            node: b,
            other: a,
            flags: flags.invert(),
        });
        self.seed_split(a);
        self.seed_split(b);
        Ok(())
    }

    pub(crate) fn set_edge_internal(
        &mut self,
        a: NodeId,
        b: NodeId,
        flags: EdgeFlags,
    ) -> Result<()> {
        let old = self.store.relink(a, b, flags)?;
        if old == flags {
            return Ok(());
        }
        self.metrics.current.edges_changed += 1;
        self.emit(GraphEvent::EdgeChanged {
            node: a,
            other: b,
            flags,
            old,
        });
        self.emit(GraphEvent::EdgeChanged {
            node: b,
            other: a,
            flags: flags.invert(),
            old: old.invert(),
        });
        Ok(())
    }
}
