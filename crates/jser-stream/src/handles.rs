//! Handle table: wire handle to element resolution.

use tracing::trace;

use crate::{ElementId, StreamError, BASE_WIRE_HANDLE};

/// Registry of referenceable elements in stream-encounter order.
///
/// The element registered `n`-th after the header (or the last reset) has
/// handle `BASE_WIRE_HANDLE + n`. Handles are never reused until a reset.
#[derive(Debug, Clone, Default)]
pub struct HandleTable {
    entries: Vec<ElementId>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `id` and returns the handle it was given.
    pub fn register(&mut self, id: ElementId) -> u32 {
        let handle = BASE_WIRE_HANDLE + self.entries.len() as u32;
        self.entries.push(id);
        trace!(handle, element = %id, "registered handle");
        handle
    }

    pub fn resolve(&self, handle: u32) -> Result<ElementId, StreamError> {
        handle
            .checked_sub(BASE_WIRE_HANDLE)
            .and_then(|index| self.entries.get(index as usize))
            .copied()
            .ok_or(StreamError::InvalidHandle(handle))
    }

    /// Forgets every registration; the next handle is the base again.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered elements, in handle order.
    pub fn entries(&self) -> &[ElementId] {
        &self.entries
    }
}
