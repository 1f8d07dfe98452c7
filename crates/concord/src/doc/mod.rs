//! The document: op log, materialized state, the open transaction and the
//! subscriber hub.
//!
//! Local edits go through container handlers, which apply each op to the
//! state immediately and buffer it in the open [`Transaction`]. `commit`
//! seals the buffer into one change. Import, export, diff and fork commit
//! implicitly first, so the log never lags behind what callers observe.

mod admission;
mod config;
mod txn;

pub use config::{CommitOptions, Configure, ExpandType, StyleConfigMap};
pub(crate) use txn::Transaction;

use crate::change::{ChangeMeta, Op, OpContent};
use crate::codec::{self, json::JsonSchema, EncodedMode, ExportMode};
use crate::cursor::{Cursor, PosQueryResult, Side};
use crate::diff::DiffSet;
use crate::error::{DocError, Result};
use crate::event::{ContainerDiff, ContainerSnapshot, DocEvent, EventTriggerKind};
use crate::handler::{
    CounterHandler, IntoContainerId, ListHandler, MapHandler, MovableListHandler, TextHandler,
    TreeHandler,
};
use crate::oplog::{unknown_frontiers, OpLog};
use crate::state::{ApplyMode, ContainerState, DocState};
use crate::subscription::{SubscriberSet, Subscription};
use crate::value::{ContainerId, ContainerType, Index, Value};
use crate::version::{
    Frontiers, OpId, PeerId, VersionOrdering, VersionRange, VersionVector,
};
use concord_util::random_peer_id;
use indexmap::IndexMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Callback for document events.
pub type EventCallback = dyn Fn(&DocEvent) + Send + Sync;
/// Callback receiving the update payload of every local commit.
pub type LocalUpdateCallback = dyn Fn(&[u8]) + Send + Sync;
/// Callback told about every local commit as soon as it is in the log.
pub type LocalCommitCallback = dyn Fn(&CommitInfo) + Send + Sync;

/// A local commit as seen by [`Document::subscribe_local_commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub meta: ChangeMeta,
    /// Origin passed through [`CommitOptions`], empty when unset.
    pub origin: String,
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportStatus {
    /// Ranges that were integrated.
    pub success: VersionRange,
    /// Ranges still waiting for missing dependencies.
    pub pending: Option<VersionRange>,
}

pub struct Document {
    peer: PeerId,
    config: Configure,
    oplog: OpLog,
    state: DocState,
    txn: Option<Transaction>,
    next_commit: CommitOptions,
    observers: SubscriberSet<Option<ContainerId>, EventCallback>,
    local_updates: SubscriberSet<(), LocalUpdateCallback>,
    local_commits: SubscriberSet<(), LocalCommitCallback>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("peer", &self.peer)
            .field("vv", self.oplog.vv())
            .field("pending_txn", &self.txn.as_ref().map(|t| t.ops().len()))
            .finish()
    }
}

impl Document {
    /// A document with a random peer id.
    pub fn new() -> Self {
        Self::with_peer(random_peer_id())
    }

    pub fn with_peer(peer: PeerId) -> Self {
        Self::with_config(peer, Configure::default())
    }

    pub fn with_config(peer: PeerId, config: Configure) -> Self {
        Self {
            peer,
            config,
            oplog: OpLog::new(),
            state: DocState::new(),
            txn: None,
            next_commit: CommitOptions::default(),
            observers: SubscriberSet::default(),
            local_updates: SubscriberSet::default(),
            local_commits: SubscriberSet::default(),
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer
    }

    /// Changes the peer id. Fails while uncommitted ops are buffered.
    pub fn set_peer_id(&mut self, peer: PeerId) -> Result<()> {
        if self.txn.as_ref().is_some_and(|t| !t.is_empty()) {
            return Err(DocError::TxnPending);
        }
        self.txn = None;
        self.peer = peer;
        Ok(())
    }

    pub fn config(&self) -> &Configure {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Configure {
        &mut self.config
    }

    pub(crate) fn oplog(&self) -> &OpLog {
        &self.oplog
    }

    pub(crate) fn state(&self) -> &DocState {
        &self.state
    }

    // ── containers ─────────────────────────────────────────────────────────

    /// Resolves (and for roots, registers) a container of type `ty`.
    pub fn get_container<I: IntoContainerId>(&mut self, id: I, ty: ContainerType) -> Result<ContainerId> {
        let id = id.into_container_id(ty);
        if id.container_type() != ty {
            return Err(DocError::TypeMismatch {
                name: id.to_string(),
                existing: id.container_type(),
                requested: ty,
            });
        }
        match &id {
            ContainerId::Root { name, .. } => {
                if let Some(existing) = self.state.root_type(name) {
                    if existing != ty {
                        return Err(DocError::TypeMismatch {
                            name: name.clone(),
                            existing,
                            requested: ty,
                        });
                    }
                }
                self.state.get_or_create(&id);
            }
            ContainerId::Normal { .. } => {
                if !self.state.contains(&id) {
                    return Err(DocError::ContainerNotFound(id));
                }
            }
        }
        Ok(id)
    }

    pub fn get_text<I: IntoContainerId>(&mut self, id: I) -> Result<TextHandler<'_>> {
        let id = self.get_container(id, ContainerType::Text)?;
        Ok(TextHandler::new(self, id))
    }

    pub fn get_map<I: IntoContainerId>(&mut self, id: I) -> Result<MapHandler<'_>> {
        let id = self.get_container(id, ContainerType::Map)?;
        Ok(MapHandler::new(self, id))
    }

    pub fn get_list<I: IntoContainerId>(&mut self, id: I) -> Result<ListHandler<'_>> {
        let id = self.get_container(id, ContainerType::List)?;
        Ok(ListHandler::new(self, id))
    }

    pub fn get_movable_list<I: IntoContainerId>(&mut self, id: I) -> Result<MovableListHandler<'_>> {
        let id = self.get_container(id, ContainerType::MovableList)?;
        Ok(MovableListHandler::new(self, id))
    }

    pub fn get_tree<I: IntoContainerId>(&mut self, id: I) -> Result<TreeHandler<'_>> {
        let id = self.get_container(id, ContainerType::Tree)?;
        Ok(TreeHandler::new(self, id))
    }

    pub fn get_counter<I: IntoContainerId>(&mut self, id: I) -> Result<CounterHandler<'_>> {
        let id = self.get_container(id, ContainerType::Counter)?;
        Ok(CounterHandler::new(self, id))
    }

    pub fn has_container(&self, id: &ContainerId) -> bool {
        self.state.contains(id)
    }

    /// Steps from a root to `id`, `None` if it is detached or unknown.
    pub fn get_path_to_container(&self, id: &ContainerId) -> Option<Vec<(ContainerId, Index)>> {
        if !self.state.contains(id) {
            return None;
        }
        self.state.path_to(id)
    }

    // ── values ─────────────────────────────────────────────────────────────

    /// Root name → container link.
    pub fn get_value(&self) -> Value {
        self.state.roots_value(false)
    }

    /// Root name → fully materialized value.
    pub fn get_deep_value(&self) -> Value {
        self.state.roots_value(true)
    }

    pub fn get_container_value(&self, id: &ContainerId) -> Value {
        self.state.get_value(id)
    }

    pub fn get_container_deep_value(&self, id: &ContainerId) -> Value {
        self.state.get_deep_value(id)
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.get_deep_value().to_json()
    }

    // ── local ops ──────────────────────────────────────────────────────────

    fn txn_mut(&mut self) -> &mut Transaction {
        let peer = self.peer;
        let oplog = &self.oplog;
        self.txn.get_or_insert_with(|| {
            Transaction::new(
                peer,
                oplog.vv().get(peer),
                oplog.next_lamport(),
                oplog.frontiers().clone(),
            )
        })
    }

    /// Records a local op built from the id of its first atom, applies it
    /// to the state and returns that id.
    pub(crate) fn apply_local_with(
        &mut self,
        container: &ContainerId,
        build: impl FnOnce(OpId) -> OpContent,
    ) -> Result<OpId> {
        if !container.is_root() && !self.state.contains(container) {
            return Err(DocError::ContainerNotFound(container.clone()));
        }
        let observed = !self.observers.is_empty();
        let before = (observed && !self.txn.as_ref().is_some_and(|t| t.has_before(container)))
            .then(|| self.state.get(container).map(ContainerSnapshot::take));
        let peer = self.peer;
        let txn = self.txn_mut();
        if let Some(snapshot) = before {
            txn.record_before(container.clone(), snapshot);
        }
        let id = txn.next_id();
        let lamport = txn.next_lamport();
        let op = Op {
            counter: id.counter,
            container: container.clone(),
            content: build(id),
        };
        self.state.apply_op(&op, peer, lamport, ApplyMode::Apply);
        self.txn_mut().push(op);
        Ok(id)
    }

    pub(crate) fn apply_local(&mut self, container: &ContainerId, content: OpContent) -> Result<OpId> {
        self.apply_local_with(container, |_| content)
    }

    // ── commit ─────────────────────────────────────────────────────────────

    /// Seals buffered ops into one change. No-op when nothing is buffered.
    pub fn commit(&mut self) {
        let options = std::mem::take(&mut self.next_commit);
        self.commit_inner(options);
    }

    /// Commits with explicit options. Options set through
    /// `set_next_commit_*` fill the fields left empty here.
    pub fn commit_with(&mut self, options: CommitOptions) {
        let pending = std::mem::take(&mut self.next_commit);
        self.commit_inner(CommitOptions {
            origin: options.origin.or(pending.origin),
            message: options.message.or(pending.message),
            timestamp: options.timestamp.or(pending.timestamp),
        });
    }

    pub fn set_next_commit_message(&mut self, message: &str) {
        self.next_commit.message = Some(message.to_string());
    }

    pub fn set_next_commit_origin(&mut self, origin: &str) {
        self.next_commit.origin = Some(origin.to_string());
    }

    fn commit_inner(&mut self, options: CommitOptions) {
        let Some(txn) = self.txn.take() else {
            return;
        };
        if txn.is_empty() {
            return;
        }
        let timestamp = options.timestamp.unwrap_or_else(|| {
            if self.config.record_timestamp {
                unix_now()
            } else {
                0
            }
        });
        let (change, before) = txn.into_change(timestamp, options.message, options.origin.clone());
        debug!(id = %change.id, ops = change.ops.len(), atoms = change.atom_len(), "commit");
        let update = (!self.local_updates.is_empty())
            .then(|| codec::encode(EncodedMode::Updates, std::slice::from_ref(&change)));
        let info = CommitInfo {
            meta: change.meta(),
            origin: options.origin.unwrap_or_default(),
        };
        self.oplog.append(change);
        self.state.set_frontiers(self.oplog.frontiers().clone());
        self.local_commits.emit(|_| true, |_, cb| cb(&info));
        self.emit(EventTriggerKind::Local, info.origin, before);
        match update {
            Some(Ok(bytes)) => self.local_updates.emit(|_| true, |_, cb| cb(&bytes)),
            Some(Err(err)) => warn!(%err, "local update not delivered, encoding failed"),
            None => {}
        }
    }

    /// Drops the uncommitted ops and rebuilds the state from the log.
    pub(crate) fn abort_txn(&mut self) {
        let Some(txn) = self.txn.take() else {
            return;
        };
        if txn.is_empty() {
            return;
        }
        debug!(ops = txn.ops().len(), "abort transaction");
        let mut state = DocState::new();
        for change in self.oplog.iter_changes() {
            let peer = change.peer();
            for op in &change.ops {
                state.apply_op(op, peer, change.lamport_of(op.counter), ApplyMode::Apply);
            }
        }
        state.set_frontiers(self.oplog.frontiers().clone());
        self.state = state;
    }

    /// Ops buffered but not committed.
    pub fn has_pending_ops(&self) -> bool {
        self.txn.as_ref().is_some_and(|t| !t.is_empty())
    }

    // ── versions ───────────────────────────────────────────────────────────

    pub fn oplog_vv(&self) -> &VersionVector {
        self.oplog.vv()
    }

    pub fn oplog_frontiers(&self) -> &Frontiers {
        self.oplog.frontiers()
    }

    pub fn state_frontiers(&self) -> &Frontiers {
        self.state.frontiers()
    }

    pub fn frontiers_to_vv(&self, frontiers: &Frontiers) -> Option<VersionVector> {
        self.oplog.frontiers_to_vv(frontiers)
    }

    pub fn vv_to_frontiers(&self, vv: &VersionVector) -> Frontiers {
        self.oplog.vv_to_frontiers(vv)
    }

    /// How the current version relates to `other`.
    pub fn cmp_with_frontiers(&self, other: &Frontiers) -> Result<VersionOrdering> {
        let other = self
            .oplog
            .frontiers_to_vv(other)
            .ok_or_else(|| unknown_frontiers(other))?;
        Ok(self.oplog.vv().compare(&other))
    }

    pub fn cmp_frontiers(&self, a: &Frontiers, b: &Frontiers) -> Result<VersionOrdering> {
        self.oplog.cmp_frontiers(a, b)
    }

    pub fn len_ops(&self) -> usize {
        self.oplog.len_ops()
    }

    pub fn len_changes(&self) -> usize {
        self.oplog.len_changes()
    }

    pub fn get_change(&self, id: OpId) -> Option<ChangeMeta> {
        self.oplog.get_change(id).map(|c| c.meta())
    }

    /// `true` when nothing was ever committed or imported.
    pub fn is_empty(&self) -> bool {
        self.oplog.is_empty() && !self.has_pending_ops()
    }

    // ── export / import ────────────────────────────────────────────────────

    pub fn export(&mut self, mode: ExportMode) -> Result<Vec<u8>> {
        self.commit();
        let (encoded, changes) = match mode {
            ExportMode::Snapshot => (
                EncodedMode::Snapshot,
                self.oplog.iter_changes().cloned().collect::<Vec<_>>(),
            ),
            ExportMode::Updates { from } => (
                EncodedMode::Updates,
                self.oplog.changes_between(&from, self.oplog.vv()),
            ),
            ExportMode::UpdatesInRange { from, to } => {
                if !self.oplog.vv().includes_vv(&to) {
                    return Err(DocError::CausalGap(format!(
                        "cannot export up to {to}: local version is {}",
                        self.oplog.vv()
                    )));
                }
                (EncodedMode::Updates, self.oplog.changes_between(&from, &to))
            }
            ExportMode::SnapshotAt { frontiers } => {
                let vv = self
                    .oplog
                    .frontiers_to_vv(&frontiers)
                    .ok_or_else(|| unknown_frontiers(&frontiers))?;
                (
                    EncodedMode::Snapshot,
                    self.oplog.changes_between(&VersionVector::new(), &vv),
                )
            }
        };
        debug!(?encoded, changes = changes.len(), "export");
        codec::encode(encoded, &changes)
    }

    pub fn import(&mut self, bytes: &[u8]) -> Result<ImportStatus> {
        self.import_with(bytes, "")
    }

    /// Imports with an origin tag passed on to subscribers.
    pub fn import_with(&mut self, bytes: &[u8], origin: &str) -> Result<ImportStatus> {
        self.commit();
        let (mode, changes) = codec::decode(bytes)?;
        debug!(?mode, changes = changes.len(), "import");
        self.import_changes(changes, origin)
    }

    /// Imports several payloads as one. Any malformed payload rejects the
    /// whole batch.
    pub fn import_batch(&mut self, payloads: &[Vec<u8>]) -> Result<ImportStatus> {
        self.commit();
        let mut changes = Vec::new();
        for bytes in payloads {
            let (_, decoded) = codec::decode(bytes)?;
            changes.extend(decoded);
        }
        debug!(payloads = payloads.len(), changes = changes.len(), "import batch");
        self.import_changes(changes, "")
    }

    /// Updates between two version vectors as JSON.
    pub fn export_json_updates(&mut self, from: &VersionVector, to: &VersionVector) -> Result<String> {
        self.commit();
        if !self.oplog.vv().includes_vv(to) {
            return Err(DocError::CausalGap(format!(
                "cannot export up to {to}: local version is {}",
                self.oplog.vv()
            )));
        }
        let changes = self.oplog.changes_between(from, to);
        JsonSchema::new(from.clone(), changes).to_json_string()
    }

    pub fn import_json_updates(&mut self, json: &str) -> Result<ImportStatus> {
        self.commit();
        let schema = JsonSchema::parse(json)?;
        self.import_changes(schema.changes, "")
    }

    pub(crate) fn import_changes(
        &mut self,
        changes: Vec<crate::change::Change>,
        origin: &str,
    ) -> Result<ImportStatus> {
        let admission = admission::plan(&self.oplog, &self.state, changes)?;
        let mut before: IndexMap<ContainerId, Option<ContainerSnapshot>> = IndexMap::new();
        if !self.observers.is_empty() {
            for change in &admission.ready {
                for op in &change.ops {
                    if !before.contains_key(&op.container) {
                        let snapshot = self.state.get(&op.container).map(ContainerSnapshot::take);
                        before.insert(op.container.clone(), snapshot);
                    }
                }
            }
        }
        self.oplog.replace_pending(admission.pending);
        let mut success = VersionRange::new();
        for change in admission.ready {
            let peer = change.peer();
            for op in &change.ops {
                self.state
                    .apply_op(op, peer, change.lamport_of(op.counter), ApplyMode::Apply);
            }
            success.insert(change.id_span());
            self.oplog.append(change);
        }
        self.state.set_frontiers(self.oplog.frontiers().clone());
        let pending = self.oplog.has_pending().then(|| self.oplog.pending_range());
        if let Some(pending) = &pending {
            debug!(?pending, "changes waiting for dependencies");
        }
        self.emit(EventTriggerKind::Import, origin.to_string(), before);
        Ok(ImportStatus { success, pending })
    }

    // ── diff ───────────────────────────────────────────────────────────────

    /// The changes after `from` and up to `to`.
    pub fn diff(&mut self, from: &Frontiers, to: &Frontiers) -> Result<DiffSet> {
        self.commit();
        let from_vv = self
            .oplog
            .frontiers_to_vv(from)
            .ok_or_else(|| unknown_frontiers(from))?;
        let to_vv = self
            .oplog
            .frontiers_to_vv(to)
            .ok_or_else(|| unknown_frontiers(to))?;
        let changes = self.oplog.changes_between(&from_vv, &to_vv);
        Ok(DiffSet::new(from.clone(), to.clone(), changes))
    }

    /// Applies a diff with the same admission rule as import.
    pub fn apply_diff(&mut self, diff: &DiffSet) -> Result<ImportStatus> {
        self.commit();
        let changes = codec::normalize(diff.changes().to_vec())?;
        self.import_changes(changes, "")
    }

    // ── fork ───────────────────────────────────────────────────────────────

    /// A copy with the full history and a new random peer id.
    pub fn fork(&mut self) -> Document {
        self.commit();
        Document {
            peer: random_peer_id(),
            config: self.config.clone(),
            oplog: self.oplog.clone(),
            state: self.state.clone(),
            txn: None,
            next_commit: CommitOptions::default(),
            observers: SubscriberSet::default(),
            local_updates: SubscriberSet::default(),
            local_commits: SubscriberSet::default(),
        }
    }

    /// A copy holding only the history up to `frontiers`.
    pub fn fork_at(&mut self, frontiers: &Frontiers) -> Result<Document> {
        let bytes = self.export(ExportMode::snapshot_at(frontiers))?;
        let mut doc = Document::with_config(random_peer_id(), self.config.clone());
        doc.import(&bytes)?;
        Ok(doc)
    }

    // ── cursors ────────────────────────────────────────────────────────────

    /// Current position of a cursor. When the element it points at was
    /// deleted the position falls back to where it used to be and `update`
    /// carries a cursor for the element now there.
    pub fn get_cursor_pos(&self, cursor: &Cursor) -> Result<PosQueryResult> {
        let state = self
            .state
            .get(&cursor.container)
            .ok_or_else(|| DocError::ContainerNotFound(cursor.container.clone()))?;
        crate::cursor::resolve(state, cursor)
    }

    pub(crate) fn cursor_at(&self, container: &ContainerId, pos: usize, side: Side) -> Option<Cursor> {
        let state = self.state.get(container)?;
        crate::cursor::at(container, state, pos, side)
    }

    // ── events ─────────────────────────────────────────────────────────────

    /// Calls `callback` after every commit or import that changes any
    /// container.
    pub fn subscribe_root(&self, callback: impl Fn(&DocEvent) + Send + Sync + 'static) -> Subscription {
        self.observers.insert(None, Arc::new(callback))
    }

    /// Calls `callback` when `container` or a container nested in it
    /// changes.
    pub fn subscribe(
        &self,
        container: &ContainerId,
        callback: impl Fn(&DocEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.observers
            .insert(Some(container.clone()), Arc::new(callback))
    }

    /// Calls `callback` right after every local commit lands in the log,
    /// before change events are delivered.
    pub fn subscribe_local_commit(&self, callback: impl Fn(&CommitInfo) + Send + Sync + 'static) -> Subscription {
        self.local_commits.insert((), Arc::new(callback))
    }

    /// Calls `callback` with the update payload of every local commit.
    pub fn subscribe_local_update(&self, callback: impl Fn(&[u8]) + Send + Sync + 'static) -> Subscription {
        self.local_updates.insert((), Arc::new(callback))
    }

    fn emit(
        &mut self,
        triggered_by: EventTriggerKind,
        origin: String,
        before: IndexMap<ContainerId, Option<ContainerSnapshot>>,
    ) {
        if before.is_empty() || self.observers.is_empty() {
            return;
        }
        let mut events: Vec<ContainerDiff> = Vec::new();
        for (target, snapshot) in before {
            let Some(state) = self.state.get(&target) else {
                continue;
            };
            let after = ContainerSnapshot::take(state);
            let before = snapshot.unwrap_or_else(|| ContainerSnapshot::empty_like(state));
            if let Some(diff) = before.diff(&after) {
                let path = self.state.path_to(&target).unwrap_or_default();
                events.push(ContainerDiff { target, path, diff });
            }
        }
        if events.is_empty() {
            return;
        }
        events.sort_by_key(|e| e.path.len());
        let event = DocEvent {
            triggered_by,
            origin,
            current_target: None,
            events,
        };
        self.observers.emit(
            |_| true,
            |key, callback| match key {
                None => callback(&event),
                Some(container) => {
                    let events: Vec<ContainerDiff> = event
                        .events
                        .iter()
                        .filter(|e| &e.target == container || e.path.iter().any(|(c, _)| c == container))
                        .cloned()
                        .collect();
                    if !events.is_empty() {
                        callback(&DocEvent {
                            triggered_by: event.triggered_by,
                            origin: event.origin.clone(),
                            current_target: Some(container.clone()),
                            events,
                        });
                    }
                }
            },
        );
    }

    /// Typed state access for handlers.
    pub(crate) fn container_state(&self, id: &ContainerId) -> Option<&ContainerState> {
        self.state.get(id)
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_txn_restores_the_committed_state() {
        let mut doc = Document::with_peer(1);
        doc.get_text("text").unwrap().insert(0, "kept").unwrap();
        let child = doc
            .get_map("map")
            .unwrap()
            .insert_container("list", ContainerType::List)
            .unwrap();
        doc.commit();
        let committed = doc.to_json();

        doc.get_text("text").unwrap().insert(4, " dropped").unwrap();
        doc.get_list(&child).unwrap().push(1).unwrap();
        doc.get_map("map").unwrap().delete("list").unwrap();
        doc.abort_txn();

        assert!(!doc.has_pending_ops());
        assert_eq!(doc.to_json(), committed);
        assert_eq!(doc.state_frontiers(), doc.oplog_frontiers());
        doc.get_list(&child).unwrap().push(2).unwrap();
        doc.commit();
        assert_eq!(doc.len_changes(), 2);
        assert_eq!(
            doc.to_json(),
            serde_json::json!({"map": {"list": [2]}, "text": "kept"})
        );
    }
}
