//! Replica-convergent document engine.
//!
//! A [`Document`] holds named root containers (rich text, maps, lists,
//! movable lists, trees and counters). Every local edit becomes an op in a
//! causal change log; replicas exchange log segments through
//! [`Document::export`] and [`Document::import`] and converge to the same
//! state regardless of delivery order.

pub mod awareness;
pub mod change;
pub mod codec;
pub mod cursor;
pub mod diff;
pub mod doc;
pub mod error;
pub mod event;
pub mod fractional_index;
pub mod handler;
pub mod oplog;
pub mod state;
pub mod subscription;
pub mod undo;
pub mod value;
pub mod version;

pub use awareness::{EphemeralEvent, EphemeralEventTrigger, EphemeralStore};
pub use change::ChangeMeta;
pub use codec::{decode_blob_meta, BlobMeta, EncodedMode, ExportMode};
pub use cursor::{Cursor, PosQueryResult, Side};
pub use diff::DiffSet;
pub use doc::{
    CommitInfo, CommitOptions, Configure, Document, ExpandType, ImportStatus, StyleConfigMap,
};
pub use error::{DecodeError, DocError, Result};
pub use event::{
    ContainerDiff, Diff, DocEvent, EventTriggerKind, ListDiffItem, MapDelta, TextDelta, TreeDiff,
    TreeDiffItem, TreeExternalDiff,
};
pub use handler::{
    CounterHandler, IntoContainerId, ListHandler, MapHandler, MovableListHandler, TextHandler,
    TreeHandler, UpdateOptions,
};
pub use state::{TreeId, TreeParentId};
pub use subscription::Subscription;
pub use undo::{UndoItemMeta, UndoManager};
pub use value::{ContainerId, ContainerType, Index, Value};
pub use version::{
    Counter, Frontiers, IdLp, IdSpan, Lamport, OpId, PeerId, VersionOrdering, VersionRange,
    VersionVector,
};

/// Returns the crate version at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
