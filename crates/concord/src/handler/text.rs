use super::{check_pos, check_range};
use crate::change::{Anchor, OpContent};
use crate::cursor::{Cursor, Side};
use crate::doc::Document;
use crate::error::{DocError, Result};
use crate::event::{Attributes, TextDelta};
use crate::state::{ContainerState, TextState};
use crate::value::{ContainerId, Value};
use crate::version::ids_to_spans;
use concord_util::diff::{diff_chars, diff_lines, split_lines, DiffOp};
use std::collections::BTreeSet;
use std::fmt;

/// Options for [`TextHandler::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Full Myers diff when `true`; common prefix/suffix only otherwise.
    pub use_refined_diff: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            use_refined_diff: true,
        }
    }
}

/// Rich text container handle. Positions count Unicode scalar values.
pub struct TextHandler<'a> {
    doc: &'a mut Document,
    id: ContainerId,
}

impl<'a> TextHandler<'a> {
    pub(crate) fn new(doc: &'a mut Document, id: ContainerId) -> Self {
        Self { doc, id }
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    fn state(&self) -> Result<&TextState> {
        match self.doc.container_state(&self.id) {
            Some(ContainerState::Text(s)) => Ok(s),
            _ => Err(DocError::ContainerNotFound(self.id.clone())),
        }
    }

    pub fn len_unicode(&self) -> usize {
        self.state().map_or(0, TextState::len_unicode)
    }

    pub fn len_utf8(&self) -> usize {
        self.state().map_or(0, TextState::len_utf8)
    }

    pub fn is_empty(&self) -> bool {
        self.len_unicode() == 0
    }

    pub fn char_at(&self, pos: usize) -> Option<char> {
        self.state().ok()?.char_at(pos)
    }

    /// Chars in `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> Result<String> {
        let len = self.len_unicode();
        check_pos(end, len)?;
        if start > end {
            return Err(DocError::OutOfBounds { pos: start, len: end });
        }
        Ok(self.state()?.slice(start, end))
    }

    pub fn get_value(&self) -> Value {
        self.doc.get_container_value(&self.id)
    }

    pub fn insert(&mut self, pos: usize, text: &str) -> Result<()> {
        check_pos(pos, self.len_unicode())?;
        if text.is_empty() {
            return Ok(());
        }
        let (left, right) = self.state()?.seq().origins_at(pos);
        let text = text.to_string();
        self.doc
            .apply_local(&self.id, OpContent::TextInsert { left, right, text })?;
        Ok(())
    }

    pub fn delete(&mut self, pos: usize, len: usize) -> Result<()> {
        check_range(pos, len, self.len_unicode())?;
        if len == 0 {
            return Ok(());
        }
        let targets = ids_to_spans(self.state()?.seq().visible_ids(pos, len));
        self.doc
            .apply_local(&self.id, OpContent::TextDelete { targets })?;
        Ok(())
    }

    /// Replaces `len` chars at `pos` with `text`; returns what was removed.
    pub fn splice(&mut self, pos: usize, len: usize, text: &str) -> Result<String> {
        check_range(pos, len, self.len_unicode())?;
        let removed = self.state()?.slice(pos, pos + len);
        self.delete(pos, len)?;
        self.insert(pos, text)?;
        Ok(removed)
    }

    /// Sets style `key` to `value` on `[start, end)`.
    ///
    /// Whether text typed at either edge later inherits the style follows
    /// the key's [`ExpandType`](crate::ExpandType).
    pub fn mark(&mut self, start: usize, end: usize, key: &str, value: impl Into<Value>) -> Result<()> {
        let len = self.len_unicode();
        check_pos(end, len)?;
        if start > end {
            return Err(DocError::OutOfBounds { pos: start, len: end });
        }
        if start == end {
            return Ok(());
        }
        let expand = self.doc.config().expand_for(key);
        let seq = self.state()?.seq();
        let (Some(first), Some(last)) = (seq.visible_to_full(start), seq.visible_to_full(end - 1))
        else {
            return Err(DocError::OutOfBounds { pos: end, len });
        };
        let items = seq.items();
        let start_anchor = if expand.expands_before() {
            first
                .checked_sub(1)
                .map_or(Anchor::Start, |prev| Anchor::After(items[prev].id))
        } else {
            Anchor::Before(items[first].id)
        };
        let end_anchor = if expand.expands_after() {
            items
                .get(last + 1)
                .map_or(Anchor::End, |next| Anchor::Before(next.id))
        } else {
            Anchor::After(items[last].id)
        };
        self.doc.apply_local(
            &self.id,
            OpContent::TextMark {
                start: start_anchor,
                end: end_anchor,
                key: key.to_string(),
                value: value.into(),
            },
        )?;
        Ok(())
    }

    /// Removes style `key` from `[start, end)`.
    pub fn unmark(&mut self, start: usize, end: usize, key: &str) -> Result<()> {
        self.mark(start, end, key, Value::Null)
    }

    /// The rich-text view as insert segments.
    pub fn to_delta(&self) -> Vec<TextDelta> {
        self.state().map(TextState::to_delta).unwrap_or_default()
    }

    /// Applies a Quill-style delta to the current content.
    pub fn apply_delta(&mut self, delta: &[TextDelta]) -> Result<()> {
        let mut pos = 0;
        for segment in delta {
            match segment {
                TextDelta::Retain { retain, attributes } => {
                    check_range(pos, *retain, self.len_unicode())?;
                    if let Some(attrs) = attributes {
                        for (key, value) in attrs {
                            self.mark(pos, pos + retain, key, value.clone())?;
                        }
                    }
                    pos += retain;
                }
                TextDelta::Insert { insert, attributes } => {
                    let n = insert.chars().count();
                    self.insert(pos, insert)?;
                    self.restyle(pos, pos + n, attributes.as_ref())?;
                    pos += n;
                }
                TextDelta::Delete { delete } => self.delete(pos, *delete)?,
            }
        }
        Ok(())
    }

    /// Makes `[start, end)` carry exactly `attributes`, dropping styles the
    /// inserted chars inherited from their neighbours.
    fn restyle(&mut self, start: usize, end: usize, attributes: Option<&Attributes>) -> Result<()> {
        let empty = Attributes::new();
        let wanted = attributes.unwrap_or(&empty);
        let inherited: BTreeSet<String> = self
            .state()?
            .styled_chars()
            .into_iter()
            .skip(start)
            .take(end - start)
            .flat_map(|c| c.attributes.into_keys())
            .filter(|k| !wanted.contains_key(k))
            .collect();
        for key in inherited {
            self.unmark(start, end, &key)?;
        }
        for (key, value) in wanted {
            self.mark(start, end, key, value.clone())?;
        }
        Ok(())
    }

    /// Rewrites the content to `new` with a char-level edit script.
    pub fn update(&mut self, new: &str, options: UpdateOptions) -> Result<()> {
        let old = self.to_string();
        let new_chars: Vec<char> = new.chars().collect();
        for op in diff_chars(&old, new, options.use_refined_diff) {
            match op {
                DiffOp::Equal { .. } => {}
                DiffOp::Delete {
                    old_len, new_index, ..
                } => self.delete(new_index, old_len)?,
                DiffOp::Insert {
                    new_index, new_len, ..
                } => {
                    let text: String = new_chars[new_index..new_index + new_len].iter().collect();
                    self.insert(new_index, &text)?;
                }
            }
        }
        Ok(())
    }

    /// Like [`update`](Self::update) but diffs whole lines, which is much
    /// cheaper on large documents.
    pub fn update_by_line(&mut self, new: &str) -> Result<()> {
        let old = self.to_string();
        let old_lines = split_lines(&old);
        let new_lines = split_lines(new);
        let offsets = |lines: &[&str]| {
            let mut out = Vec::with_capacity(lines.len() + 1);
            let mut acc = 0;
            out.push(0);
            for line in lines {
                acc += line.chars().count();
                out.push(acc);
            }
            out
        };
        let old_off = offsets(&old_lines);
        let new_off = offsets(&new_lines);
        for op in diff_lines(&old, new) {
            match op {
                DiffOp::Equal { .. } => {}
                DiffOp::Delete {
                    old_index,
                    old_len,
                    new_index,
                } => {
                    let len = old_off[old_index + old_len] - old_off[old_index];
                    self.delete(new_off[new_index], len)?;
                }
                DiffOp::Insert {
                    new_index, new_len, ..
                } => {
                    let text = new_lines[new_index..new_index + new_len].concat();
                    self.insert(new_off[new_index], &text)?;
                }
            }
        }
        Ok(())
    }

    /// A stable position that survives concurrent edits.
    pub fn get_cursor(&self, pos: usize, side: Side) -> Option<Cursor> {
        self.doc.cursor_at(&self.id, pos, side)
    }
}

impl fmt::Display for TextHandler<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state() {
            Ok(s) => write!(f, "{s}"),
            Err(_) => Ok(()),
        }
    }
}
