//! # redb-backed Event Output
//!
//! Persists committed events into a redb database. Every event is written in
//! one ACID transaction, so a crash leaves the file at the last complete
//! event.
//!
//! ## Layout
//!
//! | Table                 | Key                   | Value                          |
//! |-----------------------|-----------------------|--------------------------------|
//! | `collections`         | `(event, name)`       | postcard `Collection`          |
//! | `event_metadata`      | `event`               | postcard `Parameters`          |
//! | `collection_metadata` | `name`                | postcard `Parameters`          |
//! | `write_list`          | `name`                | postcard `CollectionKind`      |
//! | `metadata`            | key string            | `u64` (`event_count`, `finished`) |

use super::StoredEvent;
use crate::output::EventWriter;
use crate::records::{Collection, CollectionKind};
use crate::store::{EventStore, Parameters};
use crate::ConvertError;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Table for collections: (event index, collection name) -> serialized Collection
const COLLECTIONS: TableDefinition<(u64, &str), &[u8]> = TableDefinition::new("collections");

/// Table for event metadata: event index -> serialized Parameters
const EVENT_METADATA: TableDefinition<u64, &[u8]> = TableDefinition::new("event_metadata");

/// Table for collection metadata: collection name -> serialized Parameters
const COLLECTION_METADATA: TableDefinition<&str, &[u8]> =
    TableDefinition::new("collection_metadata");

/// Table for the write list: collection name -> serialized CollectionKind
const WRITE_LIST: TableDefinition<&str, &[u8]> = TableDefinition::new("write_list");

/// Table for counters: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const EVENT_COUNT_KEY: &str = "event_count";
const FINISHED_KEY: &str = "finished";

fn storage_error(e: impl std::fmt::Display) -> ConvertError {
    ConvertError::Storage(e.to_string())
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, ConvertError> {
    postcard::to_allocvec(value).map_err(|e| ConvertError::Serialization(e.to_string()))
}

fn decode<'a, T: serde::Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, ConvertError> {
    postcard::from_bytes(bytes).map_err(|e| ConvertError::Serialization(e.to_string()))
}

// =============================================================================
// WRITER
// =============================================================================

/// Event writer backed by a redb database file.
pub struct RedbWriter {
    db: Database,
    path: PathBuf,
    write_list: BTreeMap<String, CollectionKind>,
    next_event: u64,
}

impl std::fmt::Debug for RedbWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbWriter")
            .field("path", &self.path)
            .field("write_list", &self.write_list.len())
            .field("next_event", &self.next_event)
            .finish_non_exhaustive()
    }
}

impl RedbWriter {
    /// Create a fresh database at `path`, replacing any existing file.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path).map_err(|e| ConvertError::Io(e.to_string()))?;
        }
        let db = Database::create(path).map_err(storage_error)?;

        {
            let write_txn = db.begin_write().map_err(storage_error)?;
            let _ = write_txn.open_table(COLLECTIONS).map_err(storage_error)?;
            let _ = write_txn.open_table(EVENT_METADATA).map_err(storage_error)?;
            let _ = write_txn
                .open_table(COLLECTION_METADATA)
                .map_err(storage_error)?;
            let _ = write_txn.open_table(WRITE_LIST).map_err(storage_error)?;
            {
                let mut meta = write_txn.open_table(METADATA).map_err(storage_error)?;
                meta.insert(EVENT_COUNT_KEY, 0u64).map_err(storage_error)?;
                meta.insert(FINISHED_KEY, 0u64).map_err(storage_error)?;
            }
            write_txn.commit().map_err(storage_error)?;
        }

        tracing::debug!(path = %path.display(), "created redb output");
        Ok(Self {
            db,
            path: path.to_path_buf(),
            write_list: BTreeMap::new(),
            next_event: 0,
        })
    }

    /// Number of events written so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.next_event
    }
}

impl EventWriter for RedbWriter {
    fn register_for_write(
        &mut self,
        name: &str,
        kind: CollectionKind,
    ) -> Result<(), ConvertError> {
        let bytes = encode(&kind)?;
        let write_txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut table = write_txn.open_table(WRITE_LIST).map_err(storage_error)?;
            table
                .insert(name, bytes.as_slice())
                .map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)?;
        self.write_list.insert(name.to_string(), kind);
        Ok(())
    }

    fn write_event(&mut self, store: &EventStore) -> Result<(), ConvertError> {
        let event = StoredEvent::capture(store, &self.write_list)?;
        let index = self.next_event;

        // Encode everything before the transaction opens.
        let mut encoded = Vec::with_capacity(event.collections.len());
        for (name, collection) in &event.collections {
            encoded.push((name.as_str(), encode(collection)?));
        }
        let metadata = encode(&event.metadata)?;
        let mut collection_metadata = Vec::new();
        for name in self.write_list.keys() {
            if let Some(params) = store.collection_metadata(name) {
                collection_metadata.push((name.as_str(), encode(params)?));
            }
        }

        let write_txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut table = write_txn.open_table(COLLECTIONS).map_err(storage_error)?;
            for (name, bytes) in &encoded {
                table
                    .insert((index, *name), bytes.as_slice())
                    .map_err(storage_error)?;
            }

            let mut event_md = write_txn.open_table(EVENT_METADATA).map_err(storage_error)?;
            event_md
                .insert(index, metadata.as_slice())
                .map_err(storage_error)?;

            let mut coll_md = write_txn
                .open_table(COLLECTION_METADATA)
                .map_err(storage_error)?;
            for (name, bytes) in &collection_metadata {
                coll_md
                    .insert(*name, bytes.as_slice())
                    .map_err(storage_error)?;
            }

            let mut meta = write_txn.open_table(METADATA).map_err(storage_error)?;
            meta.insert(EVENT_COUNT_KEY, index + 1)
                .map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)?;

        self.next_event = index + 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ConvertError> {
        let write_txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut meta = write_txn.open_table(METADATA).map_err(storage_error)?;
            meta.insert(FINISHED_KEY, 1u64).map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)?;
        tracing::debug!(
            path = %self.path.display(),
            events = self.next_event,
            "finished redb output"
        );
        Ok(())
    }
}

// =============================================================================
// READER
// =============================================================================

/// Read access to a database produced by `RedbWriter`.
pub struct RedbReader {
    db: Database,
}

impl std::fmt::Debug for RedbReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbReader").finish_non_exhaustive()
    }
}

impl RedbReader {
    /// Open an existing output database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConvertError> {
        let db = Database::open(path.as_ref()).map_err(storage_error)?;
        Ok(Self { db })
    }

    fn counter(&self, key: &str) -> Result<u64, ConvertError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(METADATA).map_err(storage_error)?;
        Ok(table
            .get(key)
            .map_err(storage_error)?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    /// Number of committed events.
    pub fn event_count(&self) -> Result<u64, ConvertError> {
        self.counter(EVENT_COUNT_KEY)
    }

    /// Whether the writer was finished cleanly.
    pub fn is_finished(&self) -> Result<bool, ConvertError> {
        Ok(self.counter(FINISHED_KEY)? != 0)
    }

    /// Registered collection names with their kinds, in name order.
    pub fn write_list(&self) -> Result<Vec<(String, CollectionKind)>, ConvertError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(WRITE_LIST).map_err(storage_error)?;
        let mut list = Vec::new();
        for entry in table.iter().map_err(storage_error)? {
            let (key, value) = entry.map_err(storage_error)?;
            let kind: CollectionKind = decode(value.value())?;
            list.push((key.value().to_string(), kind));
        }
        Ok(list)
    }

    /// Metadata of collection `name`.
    pub fn collection_metadata(&self, name: &str) -> Result<Option<Parameters>, ConvertError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn
            .open_table(COLLECTION_METADATA)
            .map_err(storage_error)?;
        match table.get(name).map_err(storage_error)? {
            Some(bytes) => Ok(Some(decode(bytes.value())?)),
            None => Ok(None),
        }
    }

    /// Event number `index` (commit order), or `None` past the end.
    pub fn read_event(&self, index: u64) -> Result<Option<StoredEvent>, ConvertError> {
        if index >= self.event_count()? {
            return Ok(None);
        }
        let names = self.write_list()?;

        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(COLLECTIONS).map_err(storage_error)?;
        let mut collections = BTreeMap::new();
        for (name, _) in &names {
            if let Some(bytes) = table
                .get((index, name.as_str()))
                .map_err(storage_error)?
            {
                let collection: Collection = decode(bytes.value())?;
                collections.insert(name.clone(), collection);
            }
        }

        let event_md = read_txn.open_table(EVENT_METADATA).map_err(storage_error)?;
        let metadata = match event_md.get(index).map_err(storage_error)? {
            Some(bytes) => decode(bytes.value())?,
            None => Parameters::default(),
        };

        Ok(Some(StoredEvent {
            collections,
            metadata,
        }))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::records::{EventHeader, SimTrackerHit};
    use tempfile::TempDir;

    fn filled_store(event_number: i32) -> EventStore {
        let mut store = EventStore::new();
        store
            .register_collection("EventHeader", CollectionKind::EventHeader)
            .unwrap();
        store
            .register_collection("TrackerHits", CollectionKind::SimTrackerHits)
            .unwrap();
        store.headers_mut("EventHeader").unwrap().push(EventHeader {
            event_number,
            run_number: 2,
            time_stamp: 1_700_000_000,
        });
        store
            .tracker_hits_mut("TrackerHits")
            .unwrap()
            .push(SimTrackerHit {
                cell_id: 42,
                e_dep: 0.5,
                ..SimTrackerHit::default()
            });
        store
            .collection_metadata_mut("TrackerHits")
            .set_string("CellIDEncodingString", "system:8,layer:4");
        store.event_metadata_mut().set_int("seed", 11);
        store
    }

    #[test]
    fn write_then_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.redb");

        {
            let mut writer = RedbWriter::create(&path).unwrap();
            writer
                .register_for_write("EventHeader", CollectionKind::EventHeader)
                .unwrap();
            writer
                .register_for_write("TrackerHits", CollectionKind::SimTrackerHits)
                .unwrap();
            writer.write_event(&filled_store(0)).unwrap();
            writer.write_event(&filled_store(1)).unwrap();
            writer.finish().unwrap();
            assert_eq!(writer.event_count(), 2);
        }

        let reader = RedbReader::open(&path).unwrap();
        assert_eq!(reader.event_count().unwrap(), 2);
        assert!(reader.is_finished().unwrap());
        assert_eq!(reader.write_list().unwrap().len(), 2);

        let second = reader.read_event(1).unwrap().unwrap();
        assert_eq!(second.header("EventHeader").unwrap().event_number, 1);
        assert_eq!(second.tracker_hits("TrackerHits").unwrap()[0].cell_id, 42);
        assert_eq!(second.metadata.get_int("seed"), Some(11));
        assert!(reader.read_event(2).unwrap().is_none());

        let md = reader.collection_metadata("TrackerHits").unwrap().unwrap();
        assert_eq!(
            md.get_string("CellIDEncodingString"),
            Some("system:8,layer:4")
        );
    }

    #[test]
    fn create_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.redb");

        {
            let mut writer = RedbWriter::create(&path).unwrap();
            writer
                .register_for_write("EventHeader", CollectionKind::EventHeader)
                .unwrap();
            writer.write_event(&filled_store(0)).unwrap();
        }
        {
            let _writer = RedbWriter::create(&path).unwrap();
        }

        let reader = RedbReader::open(&path).unwrap();
        assert_eq!(reader.event_count().unwrap(), 0);
        assert!(!reader.is_finished().unwrap());
    }
}
