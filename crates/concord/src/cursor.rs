//! Stable positions in Text, List and MovableList containers.
//!
//! A cursor names an element by id instead of by index, so it keeps
//! pointing at the same place while concurrent edits shift indices around.

use crate::error::{DocError, Result};
use crate::state::ContainerState;
use crate::value::ContainerId;
use crate::version::OpId;
use serde::{Deserialize, Serialize};

/// Which side of the named element the cursor sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Before the element.
    Left,
    /// On the element (resolves like `Left`).
    Middle,
    /// After the element.
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
    pub container: ContainerId,
    /// `None` only in an empty container.
    pub id: Option<OpId>,
    pub side: Side,
}

/// Result of [`Document::get_cursor_pos`](crate::Document::get_cursor_pos).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosQueryResult {
    pub pos: usize,
    /// A fresh cursor when the original element was deleted.
    pub update: Option<Cursor>,
}

/// Element lookup shared by the three sequence containers.
struct Elements<'a> {
    state: &'a ContainerState,
}

impl Elements<'_> {
    fn visible(&self) -> Vec<OpId> {
        match self.state {
            ContainerState::Text(s) => s.seq().iter_visible().map(|i| i.id).collect(),
            ContainerState::List(s) => s.seq().iter_visible().map(|i| i.id).collect(),
            ContainerState::MovableList(s) => s.entries().into_iter().map(|e| e.elem).collect(),
            _ => Vec::new(),
        }
    }

    /// Visible elements before `id` and whether `id` itself is visible.
    fn locate(&self, id: OpId) -> Option<(usize, bool)> {
        match self.state {
            ContainerState::Text(s) => {
                let full = s.seq().find(id)?;
                Some((s.seq().visible_before(full), !s.seq().items()[full].deleted))
            }
            ContainerState::List(s) => {
                let full = s.seq().find(id)?;
                Some((s.seq().visible_before(full), !s.seq().items()[full].deleted))
            }
            ContainerState::MovableList(s) => {
                let element = s.element(id)?;
                let full = s.positions().find(element.pos)?;
                Some((s.positions().visible_before(full), !element.deleted))
            }
            _ => None,
        }
    }
}

fn supports_cursors(state: &ContainerState) -> bool {
    matches!(
        state,
        ContainerState::Text(_) | ContainerState::List(_) | ContainerState::MovableList(_)
    )
}

/// A cursor that resolves to `pos` right now.
pub(crate) fn at(container: &ContainerId, state: &ContainerState, pos: usize, side: Side) -> Option<Cursor> {
    if !supports_cursors(state) {
        return None;
    }
    let ids = Elements { state }.visible();
    if pos > ids.len() {
        return None;
    }
    let (id, side) = match side {
        Side::Right if pos > 0 => (Some(ids[pos - 1]), Side::Right),
        _ if pos < ids.len() => (Some(ids[pos]), if side == Side::Right { Side::Left } else { side }),
        _ => (ids.last().copied(), Side::Right),
    };
    Some(Cursor {
        container: container.clone(),
        id,
        side,
    })
}

pub(crate) fn resolve(state: &ContainerState, cursor: &Cursor) -> Result<PosQueryResult> {
    if !supports_cursors(state) {
        return Err(DocError::InvalidArgument(format!(
            "{} has no cursor positions",
            cursor.container
        )));
    }
    let elements = Elements { state };
    let Some(id) = cursor.id else {
        return Ok(PosQueryResult { pos: 0, update: None });
    };
    let (before, alive) = elements.locate(id).ok_or(DocError::ElementNotFound(id))?;
    if alive {
        let pos = if cursor.side == Side::Right { before + 1 } else { before };
        return Ok(PosQueryResult { pos, update: None });
    }
    Ok(PosQueryResult {
        pos: before,
        update: at(&cursor.container, state, before, cursor.side),
    })
}
