use crate::change::OpContent;
use crate::doc::Document;
use crate::error::{DocError, Result};
use crate::state::{ContainerState, CounterState};
use crate::value::ContainerId;

/// Counter handle.
pub struct CounterHandler<'a> {
    doc: &'a mut Document,
    id: ContainerId,
}

impl<'a> CounterHandler<'a> {
    pub(crate) fn new(doc: &'a mut Document, id: ContainerId) -> Self {
        Self { doc, id }
    }

    pub fn id(&self) -> &ContainerId {
        &self.id
    }

    pub fn increment(&mut self, delta: f64) -> Result<()> {
        if !delta.is_finite() {
            return Err(DocError::InvalidArgument(format!("counter delta {delta}")));
        }
        self.doc
            .apply_local(&self.id, OpContent::CounterIncrement { delta })?;
        Ok(())
    }

    pub fn decrement(&mut self, delta: f64) -> Result<()> {
        self.increment(-delta)
    }

    pub fn value(&self) -> f64 {
        match self.doc.container_state(&self.id) {
            Some(ContainerState::Counter(s)) => s.value(),
            _ => 0.0,
        }
    }

    /// Number of increments folded into the value.
    pub fn len(&self) -> usize {
        match self.doc.container_state(&self.id) {
            Some(ContainerState::Counter(s)) => CounterState::len(s),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
