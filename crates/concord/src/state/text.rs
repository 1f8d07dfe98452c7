//! Rich text: a char sequence plus interval style marks.
//!
//! A mark covers the chars between its two anchors in the full
//! (tombstoned) sequence. For each char and key the covering mark with the
//! greatest `IdLp` wins; a `Null` value clears the key.

use super::sequence::{SeqItem, Sequence};
use crate::change::Anchor;
use crate::event::{Attributes, TextDelta};
use crate::value::Value;
use crate::version::{IdLp, OpId};

#[derive(Debug, Clone, PartialEq)]
pub struct StyleMark {
    pub lp: IdLp,
    pub start: Anchor,
    pub end: Anchor,
    pub key: String,
    pub value: Value,
}

/// A visible char with its id and effective attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledChar {
    pub id: OpId,
    pub ch: char,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextState {
    seq: Sequence<char>,
    marks: Vec<StyleMark>,
}

impl TextState {
    pub fn seq(&self) -> &Sequence<char> {
        &self.seq
    }

    pub fn marks(&self) -> &[StyleMark] {
        &self.marks
    }

    pub fn insert(
        &mut self,
        id: OpId,
        left: Option<OpId>,
        right: Option<OpId>,
        text: &str,
        tombstone: bool,
    ) {
        let mut left = left;
        for (i, ch) in text.chars().enumerate() {
            let char_id = id.inc(i as u32);
            self.seq.integrate(SeqItem {
                id: char_id,
                left,
                right,
                value: ch,
                deleted: tombstone,
            });
            left = Some(char_id);
        }
    }

    pub fn delete(&mut self, id: OpId) -> bool {
        self.seq.delete(id).is_some()
    }

    pub fn mark(&mut self, mark: StyleMark) {
        match self.marks.binary_search_by(|m| m.lp.cmp(&mark.lp)) {
            Ok(_) => {}
            Err(pos) => self.marks.insert(pos, mark),
        }
    }

    pub fn len_unicode(&self) -> usize {
        self.seq.len()
    }

    pub fn len_utf8(&self) -> usize {
        self.seq.iter_visible().map(|item| item.value.len_utf8()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    pub fn char_at(&self, pos: usize) -> Option<char> {
        self.seq.iter_visible().nth(pos).map(|item| item.value)
    }

    pub fn slice(&self, start: usize, end: usize) -> String {
        self.seq
            .iter_visible()
            .skip(start)
            .take(end.saturating_sub(start))
            .map(|item| item.value)
            .collect()
    }

    /// Full-sequence boundary of an anchor, `None` if its char is unknown.
    fn boundary(&self, anchor: &Anchor) -> Option<usize> {
        match anchor {
            Anchor::Start => Some(0),
            Anchor::End => Some(self.seq.full_len()),
            Anchor::Before(id) => self.seq.find(*id),
            Anchor::After(id) => self.seq.find(*id).map(|i| i + 1),
        }
    }

    /// Visible chars with ids and effective attributes.
    pub fn styled_chars(&self) -> Vec<StyledChar> {
        let ranges: Vec<(usize, usize, &StyleMark)> = self
            .marks
            .iter()
            .filter_map(|m| Some((self.boundary(&m.start)?, self.boundary(&m.end)?, m)))
            .filter(|(s, e, _)| s < e)
            .collect();
        self.seq
            .items()
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.deleted)
            .map(|(full, item)| {
                let mut attributes = Attributes::new();
                for (s, e, mark) in &ranges {
                    if *s <= full && full < *e {
                        attributes.insert(mark.key.clone(), mark.value.clone());
                    }
                }
                attributes.retain(|_, v| !v.is_null());
                StyledChar {
                    id: item.id,
                    ch: item.value,
                    attributes,
                }
            })
            .collect()
    }

    /// The rich-text view: consecutive chars with equal attributes grouped
    /// into insert segments.
    pub fn to_delta(&self) -> Vec<TextDelta> {
        let mut out: Vec<TextDelta> = Vec::new();
        for sc in self.styled_chars() {
            let attrs = (!sc.attributes.is_empty()).then_some(sc.attributes);
            match out.last_mut() {
                Some(TextDelta::Insert { insert, attributes }) if *attributes == attrs => {
                    insert.push(sc.ch)
                }
                _ => out.push(TextDelta::Insert {
                    insert: sc.ch.to_string(),
                    attributes: attrs,
                }),
            }
        }
        out
    }
}

impl std::fmt::Display for TextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for item in self.seq.iter_visible() {
            write!(f, "{}", item.value)?;
        }
        Ok(())
    }
}
