use crate::value::{ContainerId, ContainerType};
use crate::version::OpId;
use thiserror::Error;

/// Errors surfaced by [`Document`](crate::Document) and its handlers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DocError {
    #[error("container `{name}` is a {existing}, not a {requested}")]
    TypeMismatch {
        name: String,
        existing: ContainerType,
        requested: ContainerType,
    },
    #[error("causal gap: {0}")]
    CausalGap(String),
    #[error("moving tree node {target} under {parent} would create a cycle")]
    CycleRejected { target: OpId, parent: OpId },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("export failed: {0}")]
    Export(String),
    #[error("index {pos} out of bounds (length {len})")]
    OutOfBounds { pos: usize, len: usize },
    #[error("container {0} not found")]
    ContainerNotFound(ContainerId),
    #[error("tree node {0} not found")]
    TreeNodeNotFound(OpId),
    #[error("tree node {0} is deleted")]
    TreeNodeDeleted(OpId),
    #[error("list element {0} not found")]
    ElementNotFound(OpId),
    #[error("cannot change the peer id while uncommitted operations are buffered")]
    TxnPending,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Reasons an import payload is rejected. Rejection leaves the document
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload truncated")]
    Truncated,
    #[error("invalid magic bytes")]
    BadMagic,
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown export mode {0}")]
    UnknownMode(u8),
    #[error("malformed body: {0}")]
    Body(String),
    #[error("{0} trailing bytes after body")]
    TrailingBytes(usize),
    #[error("invalid change {id}: {reason}")]
    InvalidChange { id: OpId, reason: String },
    #[error("malformed json: {0}")]
    Json(String),
}

pub type Result<T, E = DocError> = std::result::Result<T, E>;
