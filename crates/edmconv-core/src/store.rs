//! # Event Store
//!
//! The working set of one converter instance: every registered collection by
//! name, collection-level metadata, and the metadata of the event currently
//! being filled.
//!
//! Collections are registered once and live as long as the store. After each
//! commit they are cleared, never removed, so the next event fills the same
//! handles again.

use crate::records::{
    CaloHitContribution, Collection, CollectionKind, EventHeader, McParticleCollection,
    SimCalorimeterHit, SimTrackerHit,
};
use crate::ConvertError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// TYPED PARAMETERS
// =============================================================================

/// Typed key/value parameters, one value list per key and type.
///
/// The same key may appear once per type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Parameters {
    ints: BTreeMap<String, Vec<i32>>,
    floats: BTreeMap<String, Vec<f32>>,
    strings: BTreeMap<String, Vec<String>>,
}

impl Parameters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i32) {
        self.ints.insert(key.into(), vec![value]);
    }

    pub fn set_ints(&mut self, key: impl Into<String>, values: Vec<i32>) {
        self.ints.insert(key.into(), values);
    }

    pub fn set_float(&mut self, key: impl Into<String>, value: f32) {
        self.floats.insert(key.into(), vec![value]);
    }

    pub fn set_floats(&mut self, key: impl Into<String>, values: Vec<f32>) {
        self.floats.insert(key.into(), values);
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.strings.insert(key.into(), vec![value.into()]);
    }

    pub fn set_strings(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.strings.insert(key.into(), values);
    }

    /// First int value stored under `key`.
    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i32> {
        self.ints.get(key).and_then(|v| v.first().copied())
    }

    #[must_use]
    pub fn get_ints(&self, key: &str) -> Option<&[i32]> {
        self.ints.get(key).map(Vec::as_slice)
    }

    /// First float value stored under `key`.
    #[must_use]
    pub fn get_float(&self, key: &str) -> Option<f32> {
        self.floats.get(key).and_then(|v| v.first().copied())
    }

    #[must_use]
    pub fn get_floats(&self, key: &str) -> Option<&[f32]> {
        self.floats.get(key).map(Vec::as_slice)
    }

    /// First string value stored under `key`.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.strings
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    #[must_use]
    pub fn get_strings(&self, key: &str) -> Option<&[String]> {
        self.strings.get(key).map(Vec::as_slice)
    }

    /// Number of keys over all types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ints.len() + self.floats.len() + self.strings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.ints.clear();
        self.floats.clear();
        self.strings.clear();
    }
}

// =============================================================================
// EVENT STORE
// =============================================================================

/// Named collections plus metadata for one converter instance.
#[derive(Debug, Default)]
pub struct EventStore {
    collections: BTreeMap<String, Collection>,
    collection_metadata: BTreeMap<String, Parameters>,
    event_metadata: Parameters,
}

impl EventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty collection of `kind` under `name`.
    ///
    /// Names are unique; registering a taken name is an error and leaves the
    /// existing collection untouched.
    pub fn register_collection(
        &mut self,
        name: &str,
        kind: CollectionKind,
    ) -> Result<(), ConvertError> {
        if self.collections.contains_key(name) {
            return Err(ConvertError::Storage(format!(
                "collection '{name}' is already registered"
            )));
        }
        self.collections
            .insert(name.to_string(), Collection::empty(kind));
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    /// Registered collections in name order.
    pub fn collections(&self) -> impl Iterator<Item = (&str, &Collection)> {
        self.collections
            .iter()
            .map(|(name, collection)| (name.as_str(), collection))
    }

    #[must_use]
    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    /// Metadata of collection `name`, if any was set.
    #[must_use]
    pub fn collection_metadata(&self, name: &str) -> Option<&Parameters> {
        self.collection_metadata.get(name)
    }

    /// Mutable metadata of collection `name`.
    pub fn collection_metadata_mut(&mut self, name: &str) -> &mut Parameters {
        self.collection_metadata
            .entry(name.to_string())
            .or_default()
    }

    /// All collection metadata in name order.
    pub fn all_collection_metadata(&self) -> impl Iterator<Item = (&str, &Parameters)> {
        self.collection_metadata
            .iter()
            .map(|(name, params)| (name.as_str(), params))
    }

    #[must_use]
    pub fn event_metadata(&self) -> &Parameters {
        &self.event_metadata
    }

    pub fn event_metadata_mut(&mut self) -> &mut Parameters {
        &mut self.event_metadata
    }

    /// Clear every collection and the event metadata.
    ///
    /// Collections stay registered; collection metadata is kept.
    pub fn clear_collections(&mut self) {
        for collection in self.collections.values_mut() {
            collection.clear();
        }
        self.event_metadata.clear();
    }

    /// Total number of records over all collections.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.collections.values().map(Collection::len).sum()
    }

    // -------------------------------------------------------------------------
    // Typed access
    // -------------------------------------------------------------------------

    pub fn particles(&self, name: &str) -> Result<&McParticleCollection, ConvertError> {
        match self.collections.get(name) {
            Some(Collection::McParticles(particles)) => Ok(particles),
            Some(other) => Err(mismatch(name, CollectionKind::McParticles, other)),
            None => Err(ConvertError::MissingCollection(name.to_string())),
        }
    }

    pub fn particles_mut(&mut self, name: &str) -> Result<&mut McParticleCollection, ConvertError> {
        match self.collections.get_mut(name) {
            Some(Collection::McParticles(particles)) => Ok(particles),
            Some(other) => Err(mismatch(name, CollectionKind::McParticles, other)),
            None => Err(ConvertError::MissingCollection(name.to_string())),
        }
    }

    pub fn headers_mut(&mut self, name: &str) -> Result<&mut Vec<EventHeader>, ConvertError> {
        match self.collections.get_mut(name) {
            Some(Collection::EventHeader(headers)) => Ok(headers),
            Some(other) => Err(mismatch(name, CollectionKind::EventHeader, other)),
            None => Err(ConvertError::MissingCollection(name.to_string())),
        }
    }

    pub fn tracker_hits_mut(&mut self, name: &str) -> Result<&mut Vec<SimTrackerHit>, ConvertError> {
        match self.collections.get_mut(name) {
            Some(Collection::SimTrackerHits(hits)) => Ok(hits),
            Some(other) => Err(mismatch(name, CollectionKind::SimTrackerHits, other)),
            None => Err(ConvertError::MissingCollection(name.to_string())),
        }
    }

    pub fn calorimeter_hits_mut(
        &mut self,
        name: &str,
    ) -> Result<&mut Vec<SimCalorimeterHit>, ConvertError> {
        match self.collections.get_mut(name) {
            Some(Collection::SimCalorimeterHits(hits)) => Ok(hits),
            Some(other) => Err(mismatch(name, CollectionKind::SimCalorimeterHits, other)),
            None => Err(ConvertError::MissingCollection(name.to_string())),
        }
    }

    pub fn contributions_mut(
        &mut self,
        name: &str,
    ) -> Result<&mut Vec<CaloHitContribution>, ConvertError> {
        match self.collections.get_mut(name) {
            Some(Collection::CaloHitContributions(contributions)) => Ok(contributions),
            Some(other) => Err(mismatch(name, CollectionKind::CaloHitContributions, other)),
            None => Err(ConvertError::MissingCollection(name.to_string())),
        }
    }
}

fn mismatch(name: &str, expected: CollectionKind, found: &Collection) -> ConvertError {
    ConvertError::KindMismatch {
        name: name.to_string(),
        expected,
        found: found.kind(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
