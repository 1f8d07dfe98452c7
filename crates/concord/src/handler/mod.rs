//! Borrowed container handles.
//!
//! A handler pairs `&mut Document` with a container id. Every mutation goes
//! through [`Document::apply_local_with`], so ops land in the open
//! transaction and the state in one step; reads go straight to the state.

mod counter;
mod list;
mod map;
mod movable_list;
mod text;
mod tree;

pub use counter::CounterHandler;
pub use list::ListHandler;
pub use map::MapHandler;
pub use movable_list::MovableListHandler;
pub use text::{TextHandler, UpdateOptions};
pub use tree::TreeHandler;

use crate::error::{DocError, Result};
use crate::value::{ContainerId, ContainerType, Value};

/// Anything that names a container once its type is known: a root name or
/// a full [`ContainerId`].
pub trait IntoContainerId {
    fn into_container_id(self, container_type: ContainerType) -> ContainerId;
}

impl IntoContainerId for &str {
    fn into_container_id(self, container_type: ContainerType) -> ContainerId {
        ContainerId::new_root(self, container_type)
    }
}

impl IntoContainerId for String {
    fn into_container_id(self, container_type: ContainerType) -> ContainerId {
        ContainerId::new_root(&self, container_type)
    }
}

impl IntoContainerId for &String {
    fn into_container_id(self, container_type: ContainerType) -> ContainerId {
        ContainerId::new_root(self, container_type)
    }
}

impl IntoContainerId for ContainerId {
    fn into_container_id(self, _: ContainerType) -> ContainerId {
        self
    }
}

impl IntoContainerId for &ContainerId {
    fn into_container_id(self, _: ContainerType) -> ContainerId {
        self.clone()
    }
}

fn check_pos(pos: usize, len: usize) -> Result<()> {
    if pos > len {
        return Err(DocError::OutOfBounds { pos, len });
    }
    Ok(())
}

fn check_range(pos: usize, count: usize, len: usize) -> Result<()> {
    match pos.checked_add(count) {
        Some(end) if end <= len => Ok(()),
        _ => Err(DocError::OutOfBounds {
            pos: pos.saturating_add(count),
            len,
        }),
    }
}

/// Container links are only created by the `*_container` methods, which
/// derive the child id from the op that links it.
fn plain_value(value: Value) -> Result<Value> {
    if let Value::Container(child) = &value {
        return Err(DocError::InvalidArgument(format!(
            "container {child} can only be linked by the op that creates it"
        )));
    }
    Ok(value)
}
