//! Ephemeral presence state (cursors, selections, user names).
//!
//! Entries are last-writer-wins by wall-clock timestamp and expire after a
//! timeout. Nothing here enters the document history; peers exchange the
//! encoded bytes over whatever channel carries their presence traffic.

use crate::error::{DecodeError, DocError, Result};
use crate::subscription::{SubscriberSet, Subscription};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entry {
    /// `None` marks a deletion so it can be relayed.
    value: Option<Value>,
    timestamp: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEntry {
    key: String,
    value: Option<Value>,
    timestamp: i64,
}

/// What caused an [`EphemeralEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EphemeralEventTrigger {
    Local,
    Import,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralEvent {
    pub by: EphemeralEventTrigger,
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl EphemeralEvent {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

pub type EphemeralCallback = dyn Fn(&EphemeralEvent) + Send + Sync;
pub type LocalEphemeralCallback = dyn Fn(&[u8]) + Send + Sync;

/// Timestamped key/value presence map.
pub struct EphemeralStore {
    timeout_ms: i64,
    entries: BTreeMap<String, Entry>,
    observers: SubscriberSet<(), EphemeralCallback>,
    local_updates: SubscriberSet<(), LocalEphemeralCallback>,
}

impl EphemeralStore {
    /// Entries not refreshed within `timeout_ms` are dropped on import and
    /// by [`remove_outdated`](Self::remove_outdated).
    pub fn new(timeout_ms: i64) -> Self {
        Self {
            timeout_ms,
            entries: BTreeMap::new(),
            observers: SubscriberSet::default(),
            local_updates: SubscriberSet::default(),
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.write(key, Some(value.into()), now_ms());
    }

    pub fn delete(&mut self, key: &str) {
        if self.get(key).is_some() {
            self.write(key, None, now_ms());
        }
    }

    fn write(&mut self, key: &str, value: Option<Value>, timestamp: i64) {
        let existed = self.get(key).is_some();
        // Later local writes must win even within the same millisecond.
        let timestamp = self
            .entries
            .get(key)
            .map_or(timestamp, |e| timestamp.max(e.timestamp + 1));
        let removing = value.is_none();
        self.entries
            .insert(key.to_string(), Entry { value, timestamp });
        let bytes = self.encode(key);
        self.local_updates.emit(|_| true, |_, cb| cb(bytes.as_slice()));
        let mut event = EphemeralEvent {
            by: EphemeralEventTrigger::Local,
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        };
        match (existed, removing) {
            (true, true) => event.removed.push(key.to_string()),
            (true, false) => event.updated.push(key.to_string()),
            (false, false) => event.added.push(key.to_string()),
            (false, true) => {}
        }
        self.notify(&event);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key)?.value.clone()
    }

    /// Keys with a live value, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, e)| e.value.is_some())
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn get_all_states(&self) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .filter_map(|(k, e)| Some((k.clone(), e.value.clone()?)))
            .collect()
    }

    /// Encodes one entry, deletions included. Empty when `key` is unknown.
    pub fn encode(&self, key: &str) -> Vec<u8> {
        let wire: Vec<WireEntry> = self
            .entries
            .get(key)
            .map(|e| WireEntry {
                key: key.to_string(),
                value: e.value.clone(),
                timestamp: e.timestamp,
            })
            .into_iter()
            .collect();
        if wire.is_empty() {
            return Vec::new();
        }
        encode_wire(&wire)
    }

    pub fn encode_all(&self) -> Vec<u8> {
        let wire: Vec<WireEntry> = self
            .entries
            .iter()
            .map(|(k, e)| WireEntry {
                key: k.clone(),
                value: e.value.clone(),
                timestamp: e.timestamp,
            })
            .collect();
        encode_wire(&wire)
    }

    /// Merges entries received from a peer. Older or expired entries lose.
    pub fn apply(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let wire: Vec<WireEntry> = ciborium::de::from_reader(bytes)
            .map_err(|e| DocError::Decode(DecodeError::Body(e.to_string())))?;
        let now = now_ms();
        let mut event = EphemeralEvent {
            by: EphemeralEventTrigger::Import,
            added: Vec::new(),
            updated: Vec::new(),
            removed: Vec::new(),
        };
        for WireEntry {
            key,
            value,
            timestamp,
        } in wire
        {
            if now - timestamp > self.timeout_ms {
                trace!(%key, "expired entry ignored");
                continue;
            }
            let previous = self.entries.get(&key);
            if previous.is_some_and(|p| p.timestamp >= timestamp) {
                continue;
            }
            let existed = previous.is_some_and(|p| p.value.is_some());
            match (existed, value.is_some()) {
                (true, true) => event.updated.push(key.clone()),
                (false, true) => event.added.push(key.clone()),
                (true, false) => event.removed.push(key.clone()),
                (false, false) => {}
            }
            self.entries.insert(key, Entry { value, timestamp });
        }
        self.notify(&event);
        Ok(())
    }

    /// Drops entries older than the timeout.
    pub fn remove_outdated(&mut self) {
        let now = now_ms();
        let timeout = self.timeout_ms;
        let mut removed = Vec::new();
        self.entries.retain(|key, entry| {
            let keep = now - entry.timestamp <= timeout;
            if !keep && entry.value.is_some() {
                removed.push(key.clone());
            }
            keep
        });
        debug!(removed = removed.len(), "outdated ephemeral entries removed");
        self.notify(&EphemeralEvent {
            by: EphemeralEventTrigger::Timeout,
            added: Vec::new(),
            updated: Vec::new(),
            removed,
        });
    }

    /// Calls `callback` with the encoded entry after every local write.
    pub fn subscribe_local_updates(&self, callback: impl Fn(&[u8]) + Send + Sync + 'static) -> Subscription {
        self.local_updates.insert((), Arc::new(callback))
    }

    /// Calls `callback` whenever keys are added, updated or removed.
    pub fn subscribe(&self, callback: impl Fn(&EphemeralEvent) + Send + Sync + 'static) -> Subscription {
        self.observers.insert((), Arc::new(callback))
    }

    fn notify(&self, event: &EphemeralEvent) {
        if !event.is_empty() {
            self.observers.emit(|_| true, |_, cb| cb(event));
        }
    }
}

impl std::fmt::Debug for EphemeralStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralStore")
            .field("timeout_ms", &self.timeout_ms)
            .field("entries", &self.entries)
            .finish()
    }
}

fn encode_wire(wire: &[WireEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    // Writing CBOR into a Vec cannot fail.
    let _ = ciborium::ser::into_writer(wire, &mut out);
    out
}
