use super::plain_value;
use crate::change::OpContent;
use crate::doc::Document;
use crate::error::{DocError, Result};
use crate::state::{ContainerState, MapState};
use crate::value::{ContainerId, ContainerType, Value};

/// Last-writer-wins map handle.
pub struct MapHandler<'a> {
    doc: &'a mut Document,
    id: ContainerId,
}

impl<'a> MapHandler<'a> {
    pub(crate) fn new(doc: &'a mut Document, id: ContainerId) -> Self {
        Self { doc, id }
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    fn state(&self) -> Option<&MapState> {
        match self.doc.container_state(&self.id) {
            Some(ContainerState::Map(s)) => Some(s),
            _ => None,
        }
    }

    /// Sets `key`. Writing the value already visible records nothing.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        let value = plain_value(value.into())?;
        if self.state().and_then(|s| s.get(key)) == Some(&value) {
            return Ok(());
        }
        self.doc.apply_local(
            &self.id,
            OpContent::MapSet {
                key: key.to_string(),
                value: Some(value),
            },
        )?;
        Ok(())
    }

    /// Links a new child container under `key` and returns its id.
    pub fn insert_container(&mut self, key: &str, container_type: ContainerType) -> Result<ContainerId> {
        let key = key.to_string();
        let op = self.doc.apply_local_with(&self.id, |id| OpContent::MapSet {
            key,
            value: Some(Value::Container(ContainerId::new_normal(id, container_type))),
        })?;
        Ok(ContainerId::new_normal(op, container_type))
    }

    /// The child container under `key`, creating it when the key is unset
    /// or holds something else.
    pub fn get_or_create_container(
        &mut self,
        key: &str,
        container_type: ContainerType,
    ) -> Result<ContainerId> {
        if let Some(Value::Container(existing)) = self.get(key) {
            if existing.container_type() == container_type {
                return Ok(existing);
            }
        }
        self.insert_container(key, container_type)
    }

    /// Deletes `key`; deleting an absent key records nothing.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        if !self.contains_key(key) {
            return Ok(());
        }
        self.doc.apply_local(
            &self.id,
            OpContent::MapSet {
                key: key.to_string(),
                value: None,
            },
        )?;
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        for key in self.keys() {
            self.delete(&key)?;
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state()?.get(key).cloned()
    }

    /// Value under `key` with nested containers materialized.
    pub fn get_deep(&self, key: &str) -> Option<Value> {
        match self.get(key)? {
            Value::Container(child) => Some(self.doc.get_container_deep_value(&child)),
            other => Some(other),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state().is_some_and(|s| s.contains_key(key))
    }

    pub fn keys(&self) -> Vec<String> {
        self.state()
            .map(|s| s.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default()
    }

    pub fn values(&self) -> Vec<Value> {
        self.state()
            .map(|s| s.iter().map(|(_, v)| v.clone()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.state().map_or(0, MapState::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get_value(&self) -> Value {
        self.doc.get_container_value(&self.id)
    }

    pub fn get_deep_value(&self) -> Value {
        self.doc.get_container_deep_value(&self.id)
    }

    /// Child container under `key`, if the key holds one.
    pub fn get_container(&self, key: &str) -> Result<ContainerId> {
        match self.get(key) {
            Some(Value::Container(child)) => Ok(child),
            _ => Err(DocError::InvalidArgument(format!(
                "key `{key}` of {} does not hold a container",
                self.id
            ))),
        }
    }
}
