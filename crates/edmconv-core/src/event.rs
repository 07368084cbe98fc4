//! # Simulation Input
//!
//! What the simulation hands over at the end of each event: the particle
//! table, the hit streams of every sensitive detector, and optionally an
//! `EventParameters` extension set by the event generator reader.
//!
//! Raw hit quantities are in native units (MeV, mm, ns).

use crate::particles::ParticleTable;
use crate::Vector3d;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// RUN / EVENT
// =============================================================================

/// Identification of the simulation run an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RunInfo {
    pub run_id: i32,
}

/// Run/event numbers and typed parameters attached by the input reader.
///
/// When present, its numbers take precedence over the run and event IDs of
/// the simulation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EventParameters {
    pub run_number: i32,
    pub event_number: i32,
    pub int_parameters: BTreeMap<String, Vec<i32>>,
    pub float_parameters: BTreeMap<String, Vec<f32>>,
    pub string_parameters: BTreeMap<String, Vec<String>>,
}

/// One simulated event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SimEvent {
    pub event_id: i32,
    pub particles: ParticleTable,
    pub hit_streams: Vec<HitStream>,
    pub parameters: Option<EventParameters>,
}

// =============================================================================
// SENSITIVE DETECTORS
// =============================================================================

/// How much per-step detail a sensitive detector keeps in its hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HitCreationMode {
    #[default]
    Simple,
    Medium,
    /// Contributions keep the PDG code and exact position of each step.
    Detailed,
}

/// The sensitive detector a hit stream was produced by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SensitiveDetector {
    pub name: String,
    pub hit_creation_mode: HitCreationMode,
    /// Cell-ID encoding string from the detector's readout, if it has one.
    pub encoding: Option<String>,
}

// =============================================================================
// RAW HITS
// =============================================================================

/// One step's energy deposit inside a hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HitContribution {
    /// Simulation track ID (not a particle ID).
    pub track_id: i32,
    pub pdg: i32,
    pub deposit: f64,
    pub time: f64,
    pub length: f64,
    /// Step position.
    pub position: Vector3d,
}

/// A raw tracker hit. `truth` is the single contribution that made it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrackerHit {
    pub cell_id: u64,
    pub energy_deposit: f64,
    pub length: f64,
    pub position: Vector3d,
    pub momentum: Vector3d,
    pub truth: HitContribution,
}

/// A raw calorimeter hit with one contribution per depositing step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CalorimeterHit {
    pub cell_id: u64,
    pub energy_deposit: f64,
    pub position: Vector3d,
    pub truth: Vec<HitContribution>,
}

/// The hits of one stream, tagged by their declared element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "hits", rename_all = "snake_case")]
pub enum HitPayload {
    Tracker(Vec<TrackerHit>),
    Calorimeter(Vec<CalorimeterHit>),
    /// Any other element type; carries the type name for diagnostics.
    Unsupported(String),
}

impl HitPayload {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Tracker(hits) => hits.len(),
            Self::Calorimeter(hits) => hits.len(),
            Self::Unsupported(_) => 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human readable element type name.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Tracker(_) => "Tracker::Hit",
            Self::Calorimeter(_) => "Calorimeter::Hit",
            Self::Unsupported(name) => name,
        }
    }
}

/// A named stream of raw hits from one sensitive detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitStream {
    pub name: String,
    #[serde(default)]
    pub sensitive: Option<SensitiveDetector>,
    pub payload: HitPayload,
}

impl HitStream {
    /// A tracker stream backed by `sensitive`.
    #[must_use]
    pub fn tracker(
        name: impl Into<String>,
        sensitive: SensitiveDetector,
        hits: Vec<TrackerHit>,
    ) -> Self {
        Self {
            name: name.into(),
            sensitive: Some(sensitive),
            payload: HitPayload::Tracker(hits),
        }
    }

    /// A calorimeter stream backed by `sensitive`.
    #[must_use]
    pub fn calorimeter(
        name: impl Into<String>,
        sensitive: SensitiveDetector,
        hits: Vec<CalorimeterHit>,
    ) -> Self {
        Self {
            name: name.into(),
            sensitive: Some(sensitive),
            payload: HitPayload::Calorimeter(hits),
        }
    }

    /// Hit creation mode of the backing detector; `Simple` if there is none.
    #[must_use]
    pub fn hit_creation_mode(&self) -> HitCreationMode {
        self.sensitive
            .as_ref()
            .map(|sd| sd.hit_creation_mode)
            .unwrap_or_default()
    }
}
