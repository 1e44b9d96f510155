#![forbid(unsafe_code)]

//! Connector tree arena with dirty and visibility tracking.
//!
//! The tracker owns every connector of one root. Nodes are keyed by
//! [`ConnectorId`] and store their parent id and ordered child ids, so the
//! tree can be walked in both directions without shared ownership.
//!
//! Each round trip a connector is {Clean, Dirty} × {Visible, Hidden}. Only
//! Dirty ∧ Visible connectors are sent; after collection everything is
//! marked clean.
//!
//! # Invariants
//!
//! 1. **Attach order**: [`ConnectorTracker::ids`] and every list derived from
//!    it follow attach order, which puts parents before their children.
//! 2. **Hidden ancestors hide**: a component under a hidden ancestor, or one
//!    that a visibility-controlling parent rejects, is never visible.
//! 3. **Subtree detach**: detaching a node removes its whole subtree and
//!    marks the former parent dirty (its hierarchy changed).
//! 4. **Sequence order**: client RPC calls get a tracker-wide sequence
//!    number and are drained in that order, across connectors.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Unknown id | Stale client reference | `None` / `TreeError::UnknownConnector` |
//! | Second root | Caller bug | `TreeError::RootAlreadySet` |
//! | Detach root | Caller bug | `TreeError::CannotDetachRoot` |
//! | Call for missing connector | Deferred effect after detach | Dropped with a warning |

use ahash::AHashMap;
use csync_codec::{ConnectorId, ConnectorLookup};

use crate::capability::Capabilities;
use crate::connector::Connector;
use crate::error::TreeError;
use crate::rpc::{ClientRpcCall, RpcContext};
use crate::state::SharedState;

struct Node {
    connector: Box<dyn Connector>,
    parent: Option<ConnectorId>,
    children: Vec<ConnectorId>,
    dirty: bool,
    pending_rpc: Vec<ClientRpcCall>,
}

/// Arena of connectors under one root.
#[derive(Default)]
pub struct ConnectorTracker {
    nodes: AHashMap<ConnectorId, Node>,
    order: Vec<ConnectorId>,
    root: Option<ConnectorId>,
    next_id: u64,
    next_sequence: u64,
    detached: Vec<ConnectorId>,
}

impl core::fmt::Debug for ConnectorTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectorTracker")
            .field("root", &self.root)
            .field("connectors", &self.order.len())
            .field("dirty", &self.nodes.values().filter(|n| n.dirty).count())
            .finish()
    }
}

impl ConnectorTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the root connector.
    ///
    /// # Errors
    ///
    /// [`TreeError::RootAlreadySet`] if a root exists.
    pub fn set_root(&mut self, connector: Box<dyn Connector>) -> Result<ConnectorId, TreeError> {
        if let Some(root) = &self.root {
            return Err(TreeError::RootAlreadySet(root.clone()));
        }
        let id = self.insert(connector, None);
        self.root = Some(id.clone());
        Ok(id)
    }

    /// Attach `connector` as the last child of `parent`.
    ///
    /// # Errors
    ///
    /// [`TreeError::UnknownConnector`] if `parent` is not attached.
    pub fn attach(
        &mut self,
        parent: &ConnectorId,
        connector: Box<dyn Connector>,
    ) -> Result<ConnectorId, TreeError> {
        if !self.nodes.contains_key(parent) {
            return Err(TreeError::UnknownConnector(parent.clone()));
        }
        let id = self.insert(connector, Some(parent.clone()));
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.push(id.clone());
            node.dirty = true;
        }
        Ok(id)
    }

    fn insert(&mut self, connector: Box<dyn Connector>, parent: Option<ConnectorId>) -> ConnectorId {
        let id = ConnectorId::new(self.next_id.to_string());
        self.next_id += 1;
        self.nodes.insert(
            id.clone(),
            Node {
                connector,
                parent,
                children: Vec::new(),
                dirty: true,
                pending_rpc: Vec::new(),
            },
        );
        self.order.push(id.clone());
        id
    }

    /// Remove `id` and its subtree. Returns the removed ids, `id` first.
    ///
    /// # Errors
    ///
    /// [`TreeError::UnknownConnector`] or [`TreeError::CannotDetachRoot`].
    pub fn detach(&mut self, id: &ConnectorId) -> Result<Vec<ConnectorId>, TreeError> {
        let Some(node) = self.nodes.get(id) else {
            return Err(TreeError::UnknownConnector(id.clone()));
        };
        let Some(parent) = node.parent.clone() else {
            return Err(TreeError::CannotDetachRoot(id.clone()));
        };
        if let Some(parent) = self.nodes.get_mut(&parent) {
            parent.children.retain(|child| child != id);
            parent.dirty = true;
        }

        let mut removed = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                stack.extend(node.children.iter().rev().cloned());
                removed.push(next);
            }
        }
        self.order.retain(|existing| self.nodes.contains_key(existing));
        self.detached.extend(removed.iter().cloned());
        Ok(removed)
    }

    /// Ids detached since the last call.
    pub fn take_detached(&mut self) -> Vec<ConnectorId> {
        std::mem::take(&mut self.detached)
    }

    #[must_use]
    pub fn root(&self) -> Option<&ConnectorId> {
        self.root.as_ref()
    }

    #[must_use]
    pub fn contains(&self, id: &ConnectorId) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &ConnectorId) -> Option<&dyn Connector> {
        self.nodes.get(id).map(|n| n.connector.as_ref())
    }

    /// Mutable access; marks the connector dirty.
    pub fn get_mut(&mut self, id: &ConnectorId) -> Option<&mut (dyn Connector + 'static)> {
        self.nodes.get_mut(id).map(|n| {
            n.dirty = true;
            n.connector.as_mut()
        })
    }

    /// Mutable shared state; marks the connector dirty.
    pub fn state_mut(&mut self, id: &ConnectorId) -> Option<&mut SharedState> {
        self.get_mut(id).and_then(|c| c.state_mut())
    }

    #[must_use]
    pub fn parent(&self, id: &ConnectorId) -> Option<&ConnectorId> {
        self.nodes.get(id).and_then(|n| n.parent.as_ref())
    }

    #[must_use]
    pub fn children(&self, id: &ConnectorId) -> &[ConnectorId] {
        self.nodes.get(id).map_or(&[], |n| n.children.as_slice())
    }

    /// Distance from the root.
    #[must_use]
    pub fn depth(&self, id: &ConnectorId) -> usize {
        core::iter::successors(self.parent(id), |p| self.parent(p)).count()
    }

    /// Ancestors, nearest first.
    pub fn ancestors<'a>(&'a self, id: &'a ConnectorId) -> impl Iterator<Item = &'a ConnectorId> {
        core::iter::successors(self.parent(id), |p| self.parent(p))
    }

    /// All ids in attach order.
    pub fn ids(&self) -> impl Iterator<Item = &ConnectorId> {
        self.order.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ========================================================================
    // Dirty tracking
    // ========================================================================

    /// Returns false if `id` is not attached.
    pub fn mark_dirty(&mut self, id: &ConnectorId) -> bool {
        self.nodes.get_mut(id).map(|n| n.dirty = true).is_some()
    }

    #[must_use]
    pub fn is_dirty(&self, id: &ConnectorId) -> bool {
        self.nodes.get(id).is_some_and(|n| n.dirty)
    }

    pub fn mark_all_dirty(&mut self) {
        for node in self.nodes.values_mut() {
            node.dirty = true;
        }
    }

    pub fn mark_all_clean(&mut self) {
        for node in self.nodes.values_mut() {
            node.dirty = false;
        }
    }

    /// Dirty connectors in attach order, visible or not.
    #[must_use]
    pub fn dirty_connectors(&self) -> Vec<ConnectorId> {
        self.order
            .iter()
            .filter(|id| self.is_dirty(id))
            .cloned()
            .collect()
    }

    /// Dirty ∧ Visible connectors in attach order.
    #[must_use]
    pub fn dirty_visible_connectors(&self) -> Vec<ConnectorId> {
        self.order
            .iter()
            .filter(|id| self.is_dirty(id) && self.is_visible(id))
            .cloned()
            .collect()
    }

    // ========================================================================
    // Visibility
    // ========================================================================

    /// Whether the client should know about `id` this round trip.
    ///
    /// Non-components inherit their parent's visibility. A component is
    /// visible if its own flag is set and it is the root, or its parent is
    /// visible and (when the parent controls child visibility) agrees.
    #[must_use]
    pub fn is_visible(&self, id: &ConnectorId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        let connector = node.connector.as_ref();
        if !connector.capabilities().contains(Capabilities::COMPONENT) {
            return node.parent.as_ref().is_some_and(|p| self.is_visible(p));
        }
        if !connector.is_visible() {
            return false;
        }
        match &node.parent {
            None => self.root.as_ref() == Some(id),
            Some(parent_id) => self.parent_shows(parent_id, id) && self.is_visible(parent_id),
        }
    }

    fn parent_shows(&self, parent_id: &ConnectorId, child: &ConnectorId) -> bool {
        self.nodes.get(parent_id).is_some_and(|parent| {
            !parent
                .connector
                .capabilities()
                .contains(Capabilities::VISIBILITY_CONTROLLED)
                || parent.connector.is_child_visible(child)
        })
    }

    /// Children of `id` the client should render, in order.
    #[must_use]
    pub fn visible_children(&self, id: &ConnectorId) -> Vec<ConnectorId> {
        self.children(id)
            .iter()
            .filter(|child| self.is_visible(child))
            .cloned()
            .collect()
    }

    /// Whether invocations addressed to `id` may be delivered.
    ///
    /// A component must be visible, enabled and shown by a
    /// visibility-controlling parent; every ancestor must be enabled too.
    #[must_use]
    pub fn is_connector_enabled(&self, id: &ConnectorId) -> bool {
        let Some(node) = self.nodes.get(id) else {
            return false;
        };
        let connector = node.connector.as_ref();
        if connector.capabilities().contains(Capabilities::COMPONENT)
            && (!connector.is_visible() || !connector.is_enabled())
        {
            return false;
        }
        match &node.parent {
            None => true,
            Some(parent_id) => {
                self.parent_shows(parent_id, id) && self.is_connector_enabled(parent_id)
            }
        }
    }

    // ========================================================================
    // Response preparation and RPC queues
    // ========================================================================

    /// Run the pre-response hook on `ids`.
    pub fn before_client_response(&mut self, ids: &[ConnectorId], initial: bool) {
        for id in ids {
            if let Some(node) = self.nodes.get_mut(id) {
                node.connector.before_client_response(initial);
            }
        }
    }

    /// Queue a server-to-client call on its connector and mark it dirty.
    ///
    /// # Errors
    ///
    /// [`TreeError::UnknownConnector`] if the target is not attached.
    pub fn enqueue_client_rpc(&mut self, mut call: ClientRpcCall) -> Result<u64, TreeError> {
        let Some(node) = self.nodes.get_mut(&call.connector_id) else {
            return Err(TreeError::UnknownConnector(call.connector_id));
        };
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        call.sequence = sequence;
        node.pending_rpc.push(call);
        node.dirty = true;
        Ok(sequence)
    }

    /// The pending calls of `ids`, ordered by enqueue sequence, left queued.
    #[must_use]
    pub fn pending_rpc(&self, ids: &[ConnectorId]) -> Vec<&ClientRpcCall> {
        let mut calls: Vec<&ClientRpcCall> = ids
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .flat_map(|node| node.pending_rpc.iter())
            .collect();
        calls.sort_by_key(|call| call.sequence());
        calls
    }

    /// Take the pending calls of `ids`, ordered by enqueue sequence.
    pub fn drain_pending_rpc(&mut self, ids: &[ConnectorId]) -> Vec<ClientRpcCall> {
        let mut calls: Vec<ClientRpcCall> = ids
            .iter()
            .flat_map(|id| {
                self.nodes
                    .get_mut(id)
                    .map(|node| std::mem::take(&mut node.pending_rpc))
                    .unwrap_or_default()
            })
            .collect();
        calls.sort_by_key(ClientRpcCall::sequence);
        calls
    }

    /// Give a handler `&mut` access to one connector, then apply the effects
    /// it requested through the [`RpcContext`]. The connector is marked dirty.
    ///
    /// Returns `None` if `id` is not attached.
    pub fn with_connector<R>(
        &mut self,
        id: &ConnectorId,
        f: impl FnOnce(&mut dyn Connector, &mut RpcContext) -> R,
    ) -> Option<R> {
        let node = self.nodes.get_mut(id)?;
        let mut ctx = RpcContext::new(id.clone());
        let result = f(node.connector.as_mut(), &mut ctx);
        node.dirty = true;

        let (outbound, deferred) = ctx.into_effects();
        for call in outbound {
            if let Err(err) = self.enqueue_client_rpc(call) {
                tracing::warn!(%err, "dropping client RPC call");
            }
        }
        for effect in deferred {
            effect(self);
        }
        Some(result)
    }
}

impl ConnectorLookup for ConnectorTracker {
    fn contains(&self, id: &ConnectorId) -> bool {
        self.nodes.contains_key(id)
    }
}
