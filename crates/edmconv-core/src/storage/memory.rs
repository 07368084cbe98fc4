//! In-memory writer backend.
//!
//! Clones of a `MemoryWriter` share one buffer, so a caller can keep a handle
//! while the output stream owns another and inspect what was committed.

use super::StoredEvent;
use crate::output::EventWriter;
use crate::records::CollectionKind;
use crate::store::{EventStore, Parameters};
use crate::ConvertError;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryBuffer {
    write_list: BTreeMap<String, CollectionKind>,
    events: Vec<StoredEvent>,
    collection_metadata: BTreeMap<String, Parameters>,
    finish_count: usize,
}

/// Event writer that keeps everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    buffer: Arc<Mutex<MemoryBuffer>>,
}

impl MemoryWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(&self) -> Result<MutexGuard<'_, MemoryBuffer>, ConvertError> {
        self.buffer
            .lock()
            .map_err(|_| ConvertError::Storage("memory writer lock poisoned".to_string()))
    }

    /// Snapshot of every committed event in commit order.
    #[must_use]
    pub fn events(&self) -> Vec<StoredEvent> {
        self.buffer()
            .map(|buffer| buffer.events.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        self.buffer().map(|buffer| buffer.events.len()).unwrap_or(0)
    }

    /// Names on the write list with their kinds.
    #[must_use]
    pub fn write_list(&self) -> Vec<(String, CollectionKind)> {
        self.buffer()
            .map(|buffer| {
                buffer
                    .write_list
                    .iter()
                    .map(|(name, kind)| (name.clone(), *kind))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Last seen metadata of collection `name`.
    #[must_use]
    pub fn collection_metadata(&self, name: &str) -> Option<Parameters> {
        self.buffer()
            .ok()
            .and_then(|buffer| buffer.collection_metadata.get(name).cloned())
    }

    /// How many times `finish` was called.
    #[must_use]
    pub fn finish_count(&self) -> usize {
        self.buffer().map(|buffer| buffer.finish_count).unwrap_or(0)
    }
}

impl EventWriter for MemoryWriter {
    fn register_for_write(
        &mut self,
        name: &str,
        kind: CollectionKind,
    ) -> Result<(), ConvertError> {
        self.buffer()?.write_list.insert(name.to_string(), kind);
        Ok(())
    }

    fn write_event(&mut self, store: &EventStore) -> Result<(), ConvertError> {
        let mut buffer = self.buffer()?;
        let event = StoredEvent::capture(store, &buffer.write_list)?;
        for name in buffer.write_list.keys().cloned().collect::<Vec<_>>() {
            if let Some(metadata) = store.collection_metadata(&name) {
                buffer.collection_metadata.insert(name, metadata.clone());
            }
        }
        buffer.events.push(event);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ConvertError> {
        self.buffer()?.finish_count += 1;
        Ok(())
    }
}
