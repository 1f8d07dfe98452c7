//! Values stored in containers and container identifiers.

use crate::version::{Counter, OpId, PeerId};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The six container kinds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum ContainerType {
    Text,
    Map,
    List,
    MovableList,
    Tree,
    Counter,
}

impl ContainerType {
    pub fn name(&self) -> &'static str {
        match self {
            ContainerType::Text => "Text",
            ContainerType::Map => "Map",
            ContainerType::List => "List",
            ContainerType::MovableList => "MovableList",
            ContainerType::Tree => "Tree",
            ContainerType::Counter => "Counter",
        }
    }

    /// Materialized value of an empty container of this kind.
    pub fn empty_value(&self) -> Value {
        match self {
            ContainerType::Text => Value::String(String::new()),
            ContainerType::Map => Value::Map(BTreeMap::new()),
            ContainerType::List | ContainerType::MovableList | ContainerType::Tree => {
                Value::List(Vec::new())
            }
            ContainerType::Counter => Value::Double(0.0),
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifies a container.
///
/// Root containers are named; nested ones are named by the id of the op
/// that created them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerId {
    Root {
        name: String,
        container_type: ContainerType,
    },
    Normal {
        peer: PeerId,
        counter: Counter,
        container_type: ContainerType,
    },
}

impl ContainerId {
    pub fn new_root(name: &str, container_type: ContainerType) -> Self {
        ContainerId::Root {
            name: name.to_string(),
            container_type,
        }
    }

    pub fn new_normal(id: OpId, container_type: ContainerType) -> Self {
        ContainerId::Normal {
            peer: id.peer,
            counter: id.counter,
            container_type,
        }
    }

    pub fn container_type(&self) -> ContainerType {
        match self {
            ContainerId::Root { container_type, .. } | ContainerId::Normal { container_type, .. } => {
                *container_type
            }
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, ContainerId::Root { .. })
    }

    pub fn root_name(&self) -> Option<&str> {
        match self {
            ContainerId::Root { name, .. } => Some(name),
            ContainerId::Normal { .. } => None,
        }
    }

    /// Creating op of a nested container.
    pub fn op_id(&self) -> Option<OpId> {
        match self {
            ContainerId::Normal { peer, counter, .. } => Some(OpId::new(*peer, *counter)),
            ContainerId::Root { .. } => None,
        }
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerId::Root {
                name,
                container_type,
            } => write!(f, "cid:root-{name}:{container_type}"),
            ContainerId::Normal {
                peer,
                counter,
                container_type,
            } => write!(f, "cid:{counter}@{peer}:{container_type}"),
        }
    }
}

/// Position of a child inside its parent container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Index {
    Key(String),
    Seq(usize),
    Node(OpId),
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Index::Key(key) => f.write_str(key),
            Index::Seq(i) => write!(f, "{i}"),
            Index::Node(id) => write!(f, "{id}"),
        }
    }
}

/// A value held by a map entry, list element or movable-list element.
///
/// `Container` links a nested container; deep reads replace it with the
/// child's own value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Double(f64),
    I64(i64),
    String(String),
    Binary(#[serde(with = "bytes")] Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Container(ContainerId),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_container(&self) -> Option<&ContainerId> {
        match self {
            Value::Container(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::I64(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Converts to JSON. Binary becomes base64, a container link becomes
    /// its id string and non-finite doubles become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Double(v) => serde_json::Number::from_f64(*v).map_or(Json::Null, Json::Number),
            Value::I64(v) => Json::from(*v),
            Value::String(s) => Json::String(s.clone()),
            Value::Binary(b) => {
                Json::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Container(id) => Json::String(id.to_string()),
        }
    }

    /// Converts from JSON; integers that fit `i64` stay integers.
    pub fn from_json(json: &serde_json::Value) -> Value {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::I64(i),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I64(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(v: BTreeMap<String, Value>) -> Self {
        Value::Map(v)
    }
}

impl From<ContainerId> for Value {
    fn from(id: ContainerId) -> Self {
        Value::Container(id)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(&json)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(v: &Value) -> Self {
        v.to_json()
    }
}

/// Binary payloads: base64 in human-readable formats, raw bytes otherwise.
mod bytes {
    use base64::Engine;
    use serde::de::{self, SeqAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(v: &[u8], s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(v))
        } else {
            s.serialize_bytes(v)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        if d.is_human_readable() {
            d.deserialize_str(Base64Visitor)
        } else {
            d.deserialize_bytes(BytesVisitor)
        }
    }

    struct Base64Visitor;

    impl Visitor<'_> for Base64Visitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a base64 string")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Vec<u8>, E> {
            base64::engine::general_purpose::STANDARD
                .decode(v)
                .map_err(E::custom)
        }
    }

    struct BytesVisitor;

    impl<'de> Visitor<'de> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a byte string")
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
            Ok(v)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u8>, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(b) = seq.next_element::<u8>()? {
                out.push(b);
            }
            Ok(out)
        }
    }
}
