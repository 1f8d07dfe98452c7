//! Human-readable update interchange.
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "start_version": {"7": 0},
//!   "changes": [{"id": {"peer": 7, "counter": 0}, "lamport": 0, ...}]
//! }
//! ```
//!
//! Binary values inside changes travel as base64 strings.

use crate::change::Change;
use crate::error::{DecodeError, DocError};
use crate::version::VersionVector;
use serde::{Deserialize, Serialize};

pub const JSON_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    pub schema_version: u8,
    /// Version the receiver must already hold.
    pub start_version: VersionVector,
    pub changes: Vec<Change>,
}

impl JsonSchema {
    pub fn new(start_version: VersionVector, changes: Vec<Change>) -> Self {
        Self {
            schema_version: JSON_SCHEMA_VERSION,
            start_version,
            changes,
        }
    }

    pub fn to_json_string(&self) -> Result<String, DocError> {
        serde_json::to_string(self).map_err(|e| DocError::Export(e.to_string()))
    }

    pub fn to_json_string_pretty(&self) -> Result<String, DocError> {
        serde_json::to_string_pretty(self).map_err(|e| DocError::Export(e.to_string()))
    }

    pub fn parse(json: &str) -> Result<Self, DecodeError> {
        let schema: JsonSchema =
            serde_json::from_str(json).map_err(|e| DecodeError::Json(e.to_string()))?;
        if schema.schema_version != JSON_SCHEMA_VERSION {
            return Err(DecodeError::UnsupportedVersion(schema.schema_version));
        }
        let changes = super::normalize(schema.changes)?;
        Ok(JsonSchema { changes, ..schema })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{Op, OpContent};
    use crate::value::{ContainerId, ContainerType, Value};
    use crate::version::{Frontiers, OpId};

    fn binary_change() -> Change {
        Change {
            id: OpId::new(3, 0),
            lamport: 0,
            deps: Frontiers::new(),
            timestamp: 0,
            message: None,
            ops: vec![Op {
                counter: 0,
                container: ContainerId::new_root("m", ContainerType::Map),
                content: OpContent::MapSet {
                    key: "blob".into(),
                    value: Some(Value::Binary(vec![1, 2, 3])),
                },
            }],
            origin: None,
        }
    }

    #[test]
    fn binary_values_are_base64() {
        let schema = JsonSchema::new(VersionVector::new(), vec![binary_change()]);
        let text = schema.to_json_string().unwrap();
        assert!(text.contains("AQID"));
        let back = JsonSchema::parse(&text).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn rejects_bad_json_and_versions() {
        assert!(matches!(JsonSchema::parse("{"), Err(DecodeError::Json(_))));
        let mut schema = JsonSchema::new(VersionVector::new(), vec![]);
        schema.schema_version = 2;
        let text = schema.to_json_string().unwrap();
        assert_eq!(JsonSchema::parse(&text), Err(DecodeError::UnsupportedVersion(2)));
    }
}
