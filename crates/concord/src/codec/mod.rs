//! Export payloads.
//!
//! Binary layout:
//!
//! ```text
//! "CNCD" | version: u8 | mode: u8 | CBOR body
//! ```
//!
//! The body is the CBOR encoding of the exported changes in causal order.
//! Snapshot and update payloads share the body format; the mode byte only
//! records what the exporter asked for. Decoding is all-or-nothing: any
//! framing, CBOR or structural error rejects the whole payload.

pub mod json;

use crate::change::Change;
use crate::error::{DecodeError, DocError};
use crate::version::{Counter, Frontiers, PeerId, VersionVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

pub const MAGIC: &[u8; 4] = b"CNCD";
pub const FORMAT_VERSION: u8 = 1;
const HEADER_LEN: usize = 6;

/// What [`Document::export`](crate::Document::export) serializes.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportMode {
    /// The whole history; imports into an empty document reproduce the
    /// exporter's state.
    Snapshot,
    /// Everything the exporter holds beyond `from`. An empty `from`
    /// exports the full history.
    Updates { from: VersionVector },
    /// Changes in `to` but not in `from`; `to` must be covered locally.
    UpdatesInRange {
        from: VersionVector,
        to: VersionVector,
    },
    /// The history up to and including `frontiers`.
    SnapshotAt { frontiers: Frontiers },
}

impl ExportMode {
    pub fn all_updates() -> Self {
        ExportMode::Updates {
            from: VersionVector::new(),
        }
    }

    pub fn updates(from: &VersionVector) -> Self {
        ExportMode::Updates { from: from.clone() }
    }

    pub fn updates_in_range(from: &VersionVector, to: &VersionVector) -> Self {
        ExportMode::UpdatesInRange {
            from: from.clone(),
            to: to.clone(),
        }
    }

    pub fn snapshot_at(frontiers: &Frontiers) -> Self {
        ExportMode::SnapshotAt {
            frontiers: frontiers.clone(),
        }
    }
}

/// Mode byte of an encoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodedMode {
    Snapshot,
    Updates,
}

impl EncodedMode {
    fn to_byte(self) -> u8 {
        match self {
            EncodedMode::Snapshot => 0,
            EncodedMode::Updates => 1,
        }
    }

    fn from_byte(byte: u8) -> Result<Self, DecodeError> {
        match byte {
            0 => Ok(EncodedMode::Snapshot),
            1 => Ok(EncodedMode::Updates),
            other => Err(DecodeError::UnknownMode(other)),
        }
    }
}

/// Summary of a payload, readable without importing it.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobMeta {
    pub mode: EncodedMode,
    /// Earliest counter per peer in the payload.
    pub start_vv: VersionVector,
    /// End (exclusive) counter per peer in the payload.
    pub end_vv: VersionVector,
    pub change_num: usize,
    /// Smallest and largest change timestamps, `(0, 0)` when empty.
    pub timestamp_range: (i64, i64),
}

pub(crate) fn encode(mode: EncodedMode, changes: &[Change]) -> Result<Vec<u8>, DocError> {
    let mut out = Vec::with_capacity(HEADER_LEN + changes.len() * 32);
    out.extend_from_slice(MAGIC);
    out.push(FORMAT_VERSION);
    out.push(mode.to_byte());
    ciborium::ser::into_writer(changes, &mut out).map_err(|e| DocError::Export(e.to_string()))?;
    debug!(?mode, changes = changes.len(), bytes = out.len(), "encoded payload");
    Ok(out)
}

pub(crate) fn decode(bytes: &[u8]) -> Result<(EncodedMode, Vec<Change>), DecodeError> {
    if bytes.len() < HEADER_LEN {
        return Err(if bytes.len() >= 4 && &bytes[..4] != MAGIC {
            DecodeError::BadMagic
        } else {
            DecodeError::Truncated
        });
    }
    if &bytes[..4] != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    if bytes[4] != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion(bytes[4]));
    }
    let mode = EncodedMode::from_byte(bytes[5])?;
    let mut body = &bytes[HEADER_LEN..];
    let changes: Vec<Change> =
        ciborium::de::from_reader(&mut body).map_err(|e| DecodeError::Body(e.to_string()))?;
    if !body.is_empty() {
        return Err(DecodeError::TrailingBytes(body.len()));
    }
    let changes = normalize(changes)?;
    Ok((mode, changes))
}

/// Re-sorts deps and runs structural checks on every decoded change.
pub(crate) fn normalize(changes: Vec<Change>) -> Result<Vec<Change>, DecodeError> {
    changes
        .into_iter()
        .map(|mut change| {
            change.deps = change.deps.iter().copied().collect();
            change.origin = None;
            change.check()?;
            Ok(change)
        })
        .collect()
}

pub fn decode_blob_meta(bytes: &[u8]) -> Result<BlobMeta, DecodeError> {
    let (mode, changes) = decode(bytes)?;
    let mut starts: BTreeMap<PeerId, Counter> = BTreeMap::new();
    let mut end_vv = VersionVector::new();
    for change in &changes {
        starts
            .entry(change.peer())
            .and_modify(|s| *s = (*s).min(change.id.counter))
            .or_insert(change.id.counter);
        end_vv.extend_to(change.peer(), change.ctr_end());
    }
    let start_vv: VersionVector = starts.into_iter().collect();
    let timestamp_range = changes
        .iter()
        .map(|c| c.timestamp)
        .fold(None, |acc: Option<(i64, i64)>, t| match acc {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        })
        .unwrap_or((0, 0));
    Ok(BlobMeta {
        mode,
        start_vv,
        end_vv,
        change_num: changes.len(),
        timestamp_range,
    })
}
