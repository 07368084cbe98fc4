//! # Output Stream
//!
//! The output stream is shared by every converter instance of a run (one
//! per simulation worker thread). All operations that touch it take its
//! mutex for the duration of that single operation:
//! - opening the writer (at most once)
//! - registering a collection for write
//! - committing one event
//! - finishing the writer (exactly once)
//!
//! Event conversion itself only touches the instance's own `EventStore` and
//! never takes the lock.

use crate::records::CollectionKind;
use crate::storage::{MemoryWriter, RedbWriter};
use crate::store::EventStore;
use crate::ConvertError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

// =============================================================================
// WRITER TRAIT
// =============================================================================

/// A persisted-store writer.
///
/// `write_event` persists exactly the collections on the write list, taken
/// from `store` as they are at call time. Clearing the store afterwards is
/// the caller's job.
pub trait EventWriter: Send {
    /// Add collection `name` to the set written for every event.
    fn register_for_write(&mut self, name: &str, kind: CollectionKind)
    -> Result<(), ConvertError>;

    /// Persist one event.
    fn write_event(&mut self, store: &EventStore) -> Result<(), ConvertError>;

    /// Flush and release resources. Called exactly once.
    fn finish(&mut self) -> Result<(), ConvertError>;
}

/// Where an output stream writes to.
#[derive(Debug, Clone)]
pub enum OutputTarget {
    /// No output configured; the stream never opens.
    Disabled,
    /// Keep events in memory (the handle stays readable by the caller).
    Memory(MemoryWriter),
    /// A redb database file, recreated on open.
    Redb(PathBuf),
}

impl OutputTarget {
    fn open(&self) -> Result<Option<Box<dyn EventWriter>>, ConvertError> {
        match self {
            Self::Disabled => Ok(None),
            Self::Memory(writer) => Ok(Some(Box::new(writer.clone()))),
            Self::Redb(path) => Ok(Some(Box::new(RedbWriter::create(path)?))),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Disabled => "<disabled>".to_string(),
            Self::Memory(_) => "<memory>".to_string(),
            Self::Redb(path) => path.display().to_string(),
        }
    }
}

// =============================================================================
// OUTPUT STREAM
// =============================================================================

enum StreamState {
    Pending,
    Open(Box<dyn EventWriter>),
    Closed,
}

/// The shared output stream of one run.
pub struct OutputStream {
    target: OutputTarget,
    state: Mutex<StreamState>,
    events_written: AtomicU64,
    run_header_reported: AtomicBool,
}

impl std::fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStream")
            .field("target", &self.target.describe())
            .field("open", &self.is_open())
            .field("events_written", &self.events_written())
            .finish_non_exhaustive()
    }
}

impl OutputStream {
    /// Create a stream for `target`. Nothing is opened yet.
    #[must_use]
    pub fn new(target: OutputTarget) -> Self {
        Self {
            target,
            state: Mutex::new(StreamState::Pending),
            events_written: AtomicU64::new(0),
            run_header_reported: AtomicBool::new(false),
        }
    }

    /// Create a stream that keeps events in `writer`.
    #[must_use]
    pub fn memory(writer: MemoryWriter) -> Self {
        Self::new(OutputTarget::Memory(writer))
    }

    fn lock(&self) -> Result<MutexGuard<'_, StreamState>, ConvertError> {
        self.state
            .lock()
            .map_err(|_| ConvertError::StreamState("output stream lock poisoned".to_string()))
    }

    /// Open the writer unless it is already open.
    ///
    /// Returns `true` only for the call that actually opened it. A disabled
    /// target stays unopened. Reopening a closed stream is an error.
    pub fn open(&self) -> Result<bool, ConvertError> {
        let mut state = self.lock()?;
        match &*state {
            StreamState::Open(_) => Ok(false),
            StreamState::Closed => Err(ConvertError::StreamState(
                "output stream already closed".to_string(),
            )),
            StreamState::Pending => match self.target.open()? {
                Some(writer) => {
                    *state = StreamState::Open(writer);
                    tracing::info!(output = %self.target.describe(), "opened output stream");
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state
            .lock()
            .map(|state| matches!(*state, StreamState::Open(_)))
            .unwrap_or(false)
    }

    /// Number of events committed through this stream.
    #[must_use]
    pub fn events_written(&self) -> u64 {
        self.events_written.load(Ordering::Relaxed)
    }

    /// Add a collection to the writer's write list.
    pub fn register_for_write(&self, name: &str, kind: CollectionKind) -> Result<(), ConvertError> {
        let mut state = self.lock()?;
        match &mut *state {
            StreamState::Open(writer) => writer.register_for_write(name, kind),
            _ => Err(ConvertError::StreamState(format!(
                "cannot register '{name}' for write: stream is not open"
            ))),
        }
    }

    /// Write the event held in `store`, then clear its collections.
    ///
    /// The store is cleared even when the write fails, so a broken event
    /// never leaks records into the next one.
    pub fn commit(&self, store: &mut EventStore) -> Result<(), ConvertError> {
        let result = match self.lock() {
            Ok(mut state) => match &mut *state {
                StreamState::Open(writer) => writer.write_event(store),
                _ => Err(ConvertError::StreamState(
                    "failed to write output file: stream is not open".to_string(),
                )),
            },
            Err(e) => Err(e),
        };
        store.clear_collections();
        if result.is_ok() {
            self.events_written.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Finish the writer. Later calls are no-ops; later commits fail.
    pub fn close(&self) -> Result<(), ConvertError> {
        let mut state = self.lock()?;
        let previous = std::mem::replace(&mut *state, StreamState::Closed);
        match previous {
            StreamState::Open(mut writer) => {
                tracing::info!(
                    output = %self.target.describe(),
                    events = self.events_written(),
                    "closing output stream"
                );
                writer.finish()
            }
            StreamState::Pending | StreamState::Closed => Ok(()),
        }
    }

    /// Returns `true` the first time it is called for this stream.
    pub fn first_run_header_report(&self) -> bool {
        !self.run_header_reported.swap(true, Ordering::Relaxed)
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        let Ok(state) = self.state.get_mut() else {
            return;
        };
        if let StreamState::Open(writer) = state {
            if let Err(e) = writer.finish() {
                tracing::error!(error = %e, "failed to finish output stream on drop");
            }
            *state = StreamState::Closed;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
