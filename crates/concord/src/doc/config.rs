use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a style mark grows when text is typed at its edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpandType {
    /// Text typed right before the mark joins it.
    Before,
    /// Text typed right after the mark joins it (bold, italic).
    After,
    Both,
    /// The mark never grows (links, comments).
    None,
}

impl ExpandType {
    pub fn expands_before(self) -> bool {
        matches!(self, ExpandType::Before | ExpandType::Both)
    }

    pub fn expands_after(self) -> bool {
        matches!(self, ExpandType::After | ExpandType::Both)
    }
}

/// Per-key expand behaviour for style marks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleConfigMap(BTreeMap<String, ExpandType>);

impl StyleConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Common rich-text keys: inline formats grow after, links and
    /// comments never grow.
    pub fn default_rich_text() -> Self {
        let mut map = Self::new();
        for key in ["bold", "italic", "underline", "strike", "code"] {
            map.insert(key, ExpandType::After);
        }
        for key in ["link", "comment"] {
            map.insert(key, ExpandType::None);
        }
        map
    }

    pub fn insert(&mut self, key: &str, expand: ExpandType) {
        self.0.insert(key.to_string(), expand);
    }

    pub fn get(&self, key: &str) -> Option<ExpandType> {
        self.0.get(key).copied()
    }
}

/// Document configuration.
///
/// Deserializes from JSON with every field optional:
/// `{"record_timestamp": true, "text_style": {"bold": "after"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configure {
    /// Stamp local changes with the current Unix time.
    pub record_timestamp: bool,
    /// Expand behaviour for style keys missing from `text_style`.
    pub default_expand: ExpandType,
    pub text_style: StyleConfigMap,
}

impl Default for Configure {
    fn default() -> Self {
        Self {
            record_timestamp: false,
            default_expand: ExpandType::After,
            text_style: StyleConfigMap::default_rich_text(),
        }
    }
}

impl Configure {
    pub fn expand_for(&self, key: &str) -> ExpandType {
        self.text_style.get(key).unwrap_or(self.default_expand)
    }
}

/// Options of one commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// Local-only tag passed to subscribers and the undo manager.
    pub origin: Option<String>,
    /// Stored with the change and exported.
    pub message: Option<String>,
    /// Overrides the recorded Unix timestamp.
    pub timestamp: Option<i64>,
}

impl CommitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin(mut self, origin: &str) -> Self {
        self.origin = Some(origin.to_string());
        self
    }

    pub fn message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}
