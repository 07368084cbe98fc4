//! # Writer Backends
//!
//! Two `EventWriter` implementations:
//! - `MemoryWriter`: keeps committed events in a shared in-process buffer
//! - `RedbWriter`: persists events into a redb database (read back with `RedbReader`)
//!
//! Both persist the same unit, a `StoredEvent`: the write-listed collections
//! of one event plus that event's metadata.

pub mod memory;
pub mod redb_store;

pub use memory::MemoryWriter;
pub use redb_store::{RedbReader, RedbWriter};

use crate::records::{
    CaloHitContribution, Collection, CollectionKind, EventHeader, McParticleCollection,
    SimCalorimeterHit, SimTrackerHit,
};
use crate::store::{EventStore, Parameters};
use crate::ConvertError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One committed event as a writer persists it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StoredEvent {
    pub collections: BTreeMap<String, Collection>,
    pub metadata: Parameters,
}

impl StoredEvent {
    /// Snapshot the write-listed collections of `store`.
    ///
    /// The write list is shared by every instance writing to one stream, so
    /// a store may lack some listed names; those are left out of the event.
    /// A listed name holding a different record kind is an error.
    pub fn capture(
        store: &EventStore,
        write_list: &BTreeMap<String, CollectionKind>,
    ) -> Result<Self, ConvertError> {
        let mut collections = BTreeMap::new();
        for (name, kind) in write_list {
            let Some(collection) = store.get(name) else {
                continue;
            };
            if collection.kind() != *kind {
                return Err(ConvertError::KindMismatch {
                    name: name.clone(),
                    expected: *kind,
                    found: collection.kind(),
                });
            }
            collections.insert(name.clone(), collection.clone());
        }
        Ok(Self {
            collections,
            metadata: store.event_metadata().clone(),
        })
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    /// The single header record of the event.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&EventHeader> {
        match self.collections.get(name) {
            Some(Collection::EventHeader(headers)) => headers.first(),
            _ => None,
        }
    }

    #[must_use]
    pub fn particles(&self, name: &str) -> Option<&McParticleCollection> {
        match self.collections.get(name) {
            Some(Collection::McParticles(particles)) => Some(particles),
            _ => None,
        }
    }

    #[must_use]
    pub fn tracker_hits(&self, name: &str) -> Option<&[SimTrackerHit]> {
        match self.collections.get(name) {
            Some(Collection::SimTrackerHits(hits)) => Some(hits),
            _ => None,
        }
    }

    #[must_use]
    pub fn calorimeter_hits(&self, name: &str) -> Option<&[SimCalorimeterHit]> {
        match self.collections.get(name) {
            Some(Collection::SimCalorimeterHits(hits)) => Some(hits),
            _ => None,
        }
    }

    #[must_use]
    pub fn contributions(&self, name: &str) -> Option<&[CaloHitContribution]> {
        match self.collections.get(name) {
            Some(Collection::CaloHitContributions(contributions)) => Some(contributions),
            _ => None,
        }
    }
}
