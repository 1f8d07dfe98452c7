//! Local undo/redo.
//!
//! The manager records the id spans of every local commit. Undoing an item
//! replays the whole history into a scratch state with that item's ops
//! reverted, then edits the live document until every touched container
//! matches the scratch state. The edits are ordinary local ops, so the
//! undo itself syncs to other peers like any change, and concurrent remote
//! edits made after the undone item are kept.

use crate::cursor::Cursor;
use crate::doc::{CommitInfo, CommitOptions, Document};
use crate::error::{DocError, Result};
use crate::state::{
    tree_meta_id, ApplyMode, ContainerState, DocState, MovableEntry, StyledChar, TreeId,
    TreeParentId, TreeState,
};
use crate::subscription::Subscription;
use crate::value::{ContainerId, ContainerType, Value};
use crate::version::{Counter, IdSpan, OpId};
use concord_util::diff::{diff, DiffOp};
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

pub const DEFAULT_MAX_UNDO_STEPS: usize = 100;

const UNDO_ORIGIN: &str = "undo";
const REDO_ORIGIN: &str = "redo";

/// Caller data carried by an undo item and handed over to its redo item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UndoItemMeta {
    pub value: Value,
    pub cursors: Vec<Cursor>,
}

#[derive(Debug, Clone)]
struct UndoItem {
    spans: Vec<IdSpan>,
    meta: UndoItemMeta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

#[derive(Debug)]
struct Stacks {
    undo: VecDeque<UndoItem>,
    redo: Vec<UndoItem>,
    /// Spans committed inside an open group.
    group: Option<Vec<IdSpan>>,
    /// Set while the manager commits an inverse.
    capture: Option<Vec<IdSpan>>,
    max_steps: usize,
    merge_interval: Duration,
    last_push: Option<Instant>,
    checkpoint: bool,
    exclude: Vec<String>,
}

impl Stacks {
    fn on_commit(&mut self, info: &CommitInfo) {
        let start = info.meta.id.counter;
        let span = IdSpan::new(info.meta.id.peer, start, start + info.meta.len as Counter);
        if let Some(captured) = self.capture.as_mut() {
            captured.push(span);
            return;
        }
        if self
            .exclude
            .iter()
            .any(|prefix| info.origin.starts_with(prefix.as_str()))
        {
            trace!(origin = %info.origin, "commit excluded from undo");
            return;
        }
        self.redo.clear();
        match self.group.as_mut() {
            Some(group) => group.push(span),
            None => self.push_undo(vec![span], Instant::now()),
        }
    }

    fn push_undo(&mut self, spans: Vec<IdSpan>, now: Instant) {
        let merge = !self.checkpoint
            && !self.merge_interval.is_zero()
            && self
                .last_push
                .is_some_and(|t| now.duration_since(t) < self.merge_interval);
        match self.undo.back_mut() {
            Some(top) if merge => top.spans.extend(spans),
            _ => {
                self.undo.push_back(UndoItem {
                    spans,
                    meta: UndoItemMeta::default(),
                });
                self.trim();
            }
        }
        self.last_push = Some(now);
        self.checkpoint = false;
    }

    fn trim(&mut self) {
        while self.undo.len() > self.max_steps {
            self.undo.pop_front();
        }
    }
}

fn lock(stacks: &Mutex<Stacks>) -> MutexGuard<'_, Stacks> {
    stacks.lock().unwrap_or_else(|e| e.into_inner())
}

/// Undo/redo over the local changes of one [`Document`].
///
/// Only commits made by the document's own peer are recorded; imports are
/// never undone. Commits whose origin starts with an excluded prefix are
/// ignored too.
pub struct UndoManager {
    stacks: Arc<Mutex<Stacks>>,
    subscription: Subscription,
}

impl UndoManager {
    /// Starts recording. Ops still buffered in `doc` are committed first
    /// and are not undoable.
    pub fn new(doc: &mut Document) -> Self {
        doc.commit();
        let stacks = Arc::new(Mutex::new(Stacks {
            undo: VecDeque::new(),
            redo: Vec::new(),
            group: None,
            capture: None,
            max_steps: DEFAULT_MAX_UNDO_STEPS,
            merge_interval: Duration::ZERO,
            last_push: None,
            checkpoint: false,
            exclude: Vec::new(),
        }));
        let hook = stacks.clone();
        let subscription = doc.subscribe_local_commit(move |info| lock(&hook).on_commit(info));
        Self {
            stacks,
            subscription,
        }
    }

    /// Reverts the most recent undo item. `Ok(false)` when there was
    /// nothing to undo.
    pub fn undo(&mut self, doc: &mut Document) -> Result<bool> {
        self.perform(doc, Direction::Undo)
    }

    /// Re-applies the most recently undone item. `Ok(false)` when there was
    /// nothing to redo.
    pub fn redo(&mut self, doc: &mut Document) -> Result<bool> {
        self.perform(doc, Direction::Redo)
    }

    fn perform(&mut self, doc: &mut Document, direction: Direction) -> Result<bool> {
        doc.commit();
        loop {
            let item = {
                let mut stacks = lock(&self.stacks);
                match direction {
                    Direction::Undo => stacks.undo.pop_back(),
                    Direction::Redo => stacks.redo.pop(),
                }
            };
            let Some(item) = item else {
                return Ok(false);
            };
            lock(&self.stacks).capture = Some(Vec::new());
            if let Err(err) = revert(doc, &item.spans) {
                doc.abort_txn();
                let mut stacks = lock(&self.stacks);
                stacks.capture = None;
                match direction {
                    Direction::Undo => stacks.undo.push_back(item),
                    Direction::Redo => stacks.redo.push(item),
                }
                return Err(err);
            }
            let origin = match direction {
                Direction::Undo => UNDO_ORIGIN,
                Direction::Redo => REDO_ORIGIN,
            };
            doc.commit_with(CommitOptions::new().origin(origin));
            let mut stacks = lock(&self.stacks);
            let captured = stacks.capture.take().unwrap_or_default();
            if captured.is_empty() {
                debug!(?direction, "item had no visible effect, skipping");
                continue;
            }
            let inverse = UndoItem {
                spans: captured,
                meta: item.meta,
            };
            match direction {
                Direction::Undo => stacks.redo.push(inverse),
                Direction::Redo => {
                    stacks.undo.push_back(inverse);
                    stacks.trim();
                }
            }
            stacks.checkpoint = true;
            return Ok(true);
        }
    }

    pub fn can_undo(&self) -> bool {
        self.undo_count() > 0
    }

    pub fn can_redo(&self) -> bool {
        self.redo_count() > 0
    }

    pub fn undo_count(&self) -> usize {
        lock(&self.stacks).undo.len()
    }

    pub fn redo_count(&self) -> usize {
        lock(&self.stacks).redo.len()
    }

    /// Everything committed until [`group_end`](Self::group_end) becomes a
    /// single undo item. Nested calls are ignored.
    pub fn group_start(&mut self, doc: &mut Document) {
        doc.commit();
        let mut stacks = lock(&self.stacks);
        if stacks.group.is_none() {
            stacks.group = Some(Vec::new());
        }
    }

    pub fn group_end(&mut self, doc: &mut Document) {
        doc.commit();
        let mut stacks = lock(&self.stacks);
        let Some(group) = stacks.group.take() else {
            return;
        };
        if group.is_empty() {
            return;
        }
        stacks.checkpoint = true;
        stacks.push_undo(group, Instant::now());
        stacks.checkpoint = true;
    }

    /// The next local commit starts a new undo item even inside the merge
    /// interval.
    pub fn record_new_checkpoint(&mut self, doc: &mut Document) {
        doc.commit();
        lock(&self.stacks).checkpoint = true;
    }

    pub fn set_max_undo_steps(&mut self, steps: usize) {
        let mut stacks = lock(&self.stacks);
        stacks.max_steps = steps;
        stacks.trim();
    }

    /// Commits less than `interval` apart are merged into one undo item.
    /// Zero disables merging.
    pub fn set_merge_interval(&mut self, interval: Duration) {
        lock(&self.stacks).merge_interval = interval;
    }

    pub fn add_exclude_origin_prefix(&mut self, prefix: &str) {
        lock(&self.stacks).exclude.push(prefix.to_string());
    }

    pub fn clear(&mut self) {
        let mut stacks = lock(&self.stacks);
        stacks.undo.clear();
        stacks.redo.clear();
    }

    pub fn top_undo_meta(&self) -> Option<UndoItemMeta> {
        lock(&self.stacks).undo.back().map(|item| item.meta.clone())
    }

    pub fn top_redo_meta(&self) -> Option<UndoItemMeta> {
        lock(&self.stacks).redo.last().map(|item| item.meta.clone())
    }

    /// Attaches `meta` to the top undo item. No-op on an empty stack.
    pub fn set_top_undo_meta(&mut self, meta: UndoItemMeta) {
        if let Some(top) = lock(&self.stacks).undo.back_mut() {
            top.meta = meta;
        }
    }
}

impl Drop for UndoManager {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

// ── inverse ────────────────────────────────────────────────────────────────

/// The state the document would have without the ops in `spans`, plus the
/// containers those ops touched.
fn rebuild_without(doc: &Document, spans: &[IdSpan]) -> (DocState, Vec<ContainerId>) {
    let mut state = DocState::new();
    let mut touched = Vec::new();
    for change in doc.oplog().iter_changes() {
        let peer = change.peer();
        for op in &change.ops {
            let id = OpId::new(peer, op.counter);
            let reverted = spans.iter().any(|span| span.contains(id));
            let mode = if reverted {
                if !touched.contains(&op.container) {
                    touched.push(op.container.clone());
                }
                ApplyMode::Revert
            } else {
                ApplyMode::Apply
            };
            state.apply_op(op, peer, change.lamport_of(op.counter), mode);
        }
    }
    (state, touched)
}

fn revert(doc: &mut Document, spans: &[IdSpan]) -> Result<()> {
    let (target, mut touched) = rebuild_without(doc, spans);
    touched.sort_by_key(|id| doc.state().path_to(id).map_or(usize::MAX, |p| p.len()));
    for id in touched {
        if !doc.state().is_attached(&id) {
            trace!(container = %id, "detached, not restored");
            continue;
        }
        restore(doc, &target, &id)?;
    }
    Ok(())
}

fn restore(doc: &mut Document, target: &DocState, id: &ContainerId) -> Result<()> {
    let empty = ContainerState::new(id.container_type());
    match target.get(id).unwrap_or(&empty) {
        ContainerState::Text(s) => restore_text(doc, id, &s.styled_chars()),
        ContainerState::Map(s) => {
            let have = match doc.container_state(id) {
                Some(ContainerState::Map(live)) => live.to_map(),
                _ => Default::default(),
            };
            let want = s.to_map();
            let keys: BTreeSet<&String> = have.keys().chain(want.keys()).collect();
            for key in keys {
                match want.get(key) {
                    Some(v) if have.get(key) == Some(v) => {}
                    Some(Value::Container(child)) => {
                        let fresh = doc.get_map(id)?.insert_container(key, child.container_type())?;
                        copy_container(doc, target, child, &fresh)?;
                    }
                    Some(v) => doc.get_map(id)?.insert(key, v.clone())?,
                    None => doc.get_map(id)?.delete(key)?,
                }
            }
            Ok(())
        }
        ContainerState::List(s) => restore_list(doc, target, id, &s.entries()),
        ContainerState::MovableList(s) => restore_movable_list(doc, target, id, &s.entries()),
        ContainerState::Tree(s) => restore_tree(doc, id, s),
        ContainerState::Counter(s) => {
            let mut counter = doc.get_counter(id)?;
            let delta = s.value() - counter.value();
            if delta != 0.0 {
                counter.increment(delta)?;
            }
            Ok(())
        }
    }
}

fn styled_chars(doc: &Document, id: &ContainerId) -> Vec<StyledChar> {
    match doc.container_state(id) {
        Some(ContainerState::Text(s)) => s.styled_chars(),
        _ => Vec::new(),
    }
}

fn restore_text(doc: &mut Document, id: &ContainerId, want: &[StyledChar]) -> Result<()> {
    let have: Vec<OpId> = styled_chars(doc, id).iter().map(|c| c.id).collect();
    let want_ids: Vec<OpId> = want.iter().map(|c| c.id).collect();
    let mut text = doc.get_text(id)?;
    for step in diff(&have, &want_ids) {
        match step {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete {
                old_len, new_index, ..
            } => text.delete(new_index, old_len)?,
            DiffOp::Insert {
                new_index, new_len, ..
            } => {
                let s: String = want[new_index..new_index + new_len].iter().map(|c| c.ch).collect();
                text.insert(new_index, &s)?;
            }
        }
    }
    restyle(doc, id, want)
}

/// Marks runs of chars whose attributes differ from `want`.
fn restyle(doc: &mut Document, id: &ContainerId, want: &[StyledChar]) -> Result<()> {
    let now = styled_chars(doc, id);
    // (start, end, key, value)
    let mut runs: Vec<(usize, usize, String, Value)> = Vec::new();
    for (i, (w, n)) in want.iter().zip(&now).enumerate() {
        let keys: BTreeSet<&String> = w.attributes.keys().chain(n.attributes.keys()).collect();
        for key in keys {
            let desired = w.attributes.get(key).cloned().unwrap_or(Value::Null);
            if n.attributes.get(key).cloned().unwrap_or(Value::Null) == desired {
                continue;
            }
            match runs
                .iter_mut()
                .find(|(_, end, k, v)| *end == i && k == key && *v == desired)
            {
                Some(run) => run.1 = i + 1,
                None => runs.push((i, i + 1, key.clone(), desired)),
            }
        }
    }
    let mut text = doc.get_text(id)?;
    for (start, end, key, value) in runs {
        text.mark(start, end, &key, value)?;
    }
    Ok(())
}

/// Inserts `value` at `pos` in a list or movable list, deep-copying a child
/// container out of `source`.
fn insert_value(
    doc: &mut Document,
    source: &DocState,
    id: &ContainerId,
    pos: usize,
    value: &Value,
) -> Result<()> {
    let movable = id.container_type() == ContainerType::MovableList;
    match value {
        Value::Container(child) => {
            let fresh = if movable {
                doc.get_movable_list(id)?
                    .insert_container(pos, child.container_type())?
            } else {
                doc.get_list(id)?.insert_container(pos, child.container_type())?
            };
            copy_container(doc, source, child, &fresh)
        }
        v if movable => doc.get_movable_list(id)?.insert(pos, v.clone()),
        v => doc.get_list(id)?.insert(pos, v.clone()),
    }
}

fn restore_list(
    doc: &mut Document,
    target: &DocState,
    id: &ContainerId,
    want: &[(OpId, Value)],
) -> Result<()> {
    let have: Vec<OpId> = match doc.container_state(id) {
        Some(ContainerState::List(s)) => s.entries().into_iter().map(|(id, _)| id).collect(),
        _ => Vec::new(),
    };
    let want_ids: Vec<OpId> = want.iter().map(|(id, _)| *id).collect();
    for step in diff(&have, &want_ids) {
        match step {
            DiffOp::Equal { .. } => {}
            DiffOp::Delete {
                old_len, new_index, ..
            } => doc.get_list(id)?.delete(new_index, old_len)?,
            DiffOp::Insert {
                new_index, new_len, ..
            } => {
                for (offset, (_, value)) in want[new_index..new_index + new_len].iter().enumerate() {
                    insert_value(doc, target, id, new_index + offset, value)?;
                }
            }
        }
    }
    Ok(())
}

fn restore_movable_list(
    doc: &mut Document,
    target: &DocState,
    id: &ContainerId,
    want: &[MovableEntry],
) -> Result<()> {
    let have: Vec<MovableEntry> = match doc.container_state(id) {
        Some(ContainerState::MovableList(s)) => s.entries(),
        _ => Vec::new(),
    };
    let wanted: BTreeSet<OpId> = want.iter().map(|e| e.elem).collect();
    let mut list = doc.get_movable_list(id)?;
    for (i, entry) in have.iter().enumerate().rev() {
        if !wanted.contains(&entry.elem) {
            list.delete(i, 1)?;
        }
    }
    for (i, entry) in want.iter().enumerate() {
        let mut list = doc.get_movable_list(id)?;
        let Some(from) = list.index_of_elem(entry.elem) else {
            insert_value(doc, target, id, i, &entry.value)?;
            continue;
        };
        if from != i {
            list.mov(from, i)?;
        }
        if list.get(i).as_ref() == Some(&entry.value) {
            continue;
        }
        match &entry.value {
            Value::Container(child) => {
                let fresh = list.set_container(i, child.container_type())?;
                copy_container(doc, target, child, &fresh)?;
            }
            v => list.set(i, v.clone())?,
        }
    }
    Ok(())
}

fn tree_state<'a>(doc: &'a Document, id: &ContainerId) -> Option<&'a TreeState> {
    match doc.container_state(id) {
        Some(ContainerState::Tree(s)) => Some(s),
        _ => None,
    }
}

fn restore_tree(doc: &mut Document, id: &ContainerId, want: &TreeState) -> Result<()> {
    let mut queue: VecDeque<Option<TreeId>> = VecDeque::from([None]);
    while let Some(parent) = queue.pop_front() {
        let mut prev: Option<TreeId> = None;
        for node in want.children(TreeParentId::from(parent)) {
            if !tree_state(doc, id).is_some_and(|s| s.contains(node)) {
                debug!(%node, "node unknown to the live tree");
                continue;
            }
            let mut tree = doc.get_tree(id)?;
            let siblings: Vec<TreeId> = tree
                .children(TreeParentId::from(parent))
                .into_iter()
                .filter(|s| *s != node)
                .collect();
            let index = prev
                .and_then(|p| siblings.iter().position(|s| *s == p))
                .map_or(0, |i| i + 1);
            match tree.place(node, parent, index) {
                Ok(()) => {}
                Err(DocError::CycleRejected { .. }) => {
                    debug!(%node, "restoring would create a cycle, left in place");
                }
                Err(e) => return Err(e),
            }
            prev = Some(node);
            queue.push_back(Some(node));
        }
    }
    let alive: BTreeSet<TreeId> = want.alive_nodes().into_iter().collect();
    let Some(live) = tree_state(doc, id) else {
        return Ok(());
    };
    let doomed: BTreeSet<TreeId> = live
        .alive_nodes()
        .into_iter()
        .filter(|n| !alive.contains(n))
        .collect();
    let topmost: Vec<TreeId> = doomed
        .iter()
        .copied()
        .filter(|n| match live.parent(*n) {
            Some(TreeParentId::Node(p)) => !doomed.contains(&p),
            _ => true,
        })
        .collect();
    let mut tree = doc.get_tree(id)?;
    for node in topmost {
        tree.delete(node)?;
    }
    Ok(())
}

/// Rebuilds the content of `src` (read from `source`) into the fresh,
/// empty container `dst`.
fn copy_container(
    doc: &mut Document,
    source: &DocState,
    src: &ContainerId,
    dst: &ContainerId,
) -> Result<()> {
    let Some(state) = source.get(src) else {
        return Ok(());
    };
    match state {
        ContainerState::Text(s) => {
            let chars = s.styled_chars();
            let content: String = chars.iter().map(|c| c.ch).collect();
            doc.get_text(dst)?.insert(0, &content)?;
            restyle(doc, dst, &chars)
        }
        ContainerState::Map(s) => {
            for (key, value) in s.to_map() {
                match value {
                    Value::Container(child) => {
                        let fresh = doc.get_map(dst)?.insert_container(&key, child.container_type())?;
                        copy_container(doc, source, &child, &fresh)?;
                    }
                    v => doc.get_map(dst)?.insert(&key, v)?,
                }
            }
            Ok(())
        }
        ContainerState::List(s) => {
            for (i, (_, value)) in s.entries().iter().enumerate() {
                insert_value(doc, source, dst, i, value)?;
            }
            Ok(())
        }
        ContainerState::MovableList(s) => {
            for (i, entry) in s.entries().iter().enumerate() {
                insert_value(doc, source, dst, i, &entry.value)?;
            }
            Ok(())
        }
        ContainerState::Counter(s) => {
            if s.value() != 0.0 {
                doc.get_counter(dst)?.increment(s.value())?;
            }
            Ok(())
        }
        ContainerState::Tree(s) => {
            let mut queue: VecDeque<(TreeParentId, Option<TreeId>)> =
                VecDeque::from([(TreeParentId::Root, None)]);
            while let Some((old_parent, new_parent)) = queue.pop_front() {
                for (index, old) in s.children(old_parent).into_iter().enumerate() {
                    let fresh = doc.get_tree(dst)?.create_at(new_parent, index)?;
                    copy_container(doc, source, &tree_meta_id(old), &tree_meta_id(fresh))?;
                    queue.push_back((TreeParentId::Node(old), Some(fresh)));
                }
            }
            Ok(())
        }
    }
}
