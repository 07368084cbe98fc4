//! # Core Type Definitions
//!
//! This module contains the small shared vocabulary of the converter:
//! - Particle identifiers (`SourceId`, `ParticleIndex`)
//! - Status bit masks (`StatusMask`)
//! - Three-vectors in double and single precision (`Vector3d`, `Vector3f`)
//! - Error types (`ConvertError`)
//!
//! ## Identifier Spaces
//!
//! Two identifier spaces must never be mixed:
//! - `SourceId` is assigned by the simulation. Unique within an event,
//!   neither contiguous nor stable across events.
//! - `ParticleIndex` is the dense, zero-based position of a particle in the
//!   output `MCParticles` collection.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::records::CollectionKind;

// =============================================================================
// PARTICLE IDENTIFIERS
// =============================================================================

/// Particle identifier assigned by the simulation.
///
/// Negative values are reserved: a parent ID below zero means "no parent".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SourceId(pub i32);

impl SourceId {
    /// Whether this ID is the reserved "no parent" marker.
    #[must_use]
    pub const fn is_none_marker(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dense position of a particle inside the output particle collection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ParticleIndex(pub usize);

impl ParticleIndex {
    /// Get the raw index value.
    #[must_use]
    pub const fn value(self) -> usize {
        self.0
    }
}

impl fmt::Display for ParticleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// STATUS MASK
// =============================================================================

/// Particle status bit mask as produced by the simulation's truth handler.
///
/// The generator-class bits describe what the event generator said about a
/// particle; the simulation-class bits describe what happened to it while it
/// was tracked through the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StatusMask(pub i32);

impl StatusMask {
    pub const GEN_EMPTY: i32 = 1 << 1;
    pub const GEN_PRIMARY: i32 = 1 << 2;
    pub const GEN_SECONDARY: i32 = 1 << 3;
    pub const GEN_DOCUMENTATION: i32 = 1 << 4;
    pub const GEN_STABLE: i32 = 1 << 5;
    pub const GEN_DECAYED: i32 = 1 << 6;
    pub const GEN_BEAM: i32 = 1 << 7;
    pub const GEN_OTHER: i32 = 1 << 8;
    pub const SIM_CREATED: i32 = 1 << 9;
    pub const SIM_BACKSCATTER: i32 = 1 << 10;
    pub const SIM_PARENT_RADIATED: i32 = 1 << 11;
    pub const SIM_DECAY_CALO: i32 = 1 << 12;
    pub const SIM_DECAY_TRACKER: i32 = 1 << 13;
    pub const SIM_STOPPED: i32 = 1 << 14;
    pub const SIM_LEFT_DETECTOR: i32 = 1 << 15;

    /// Create a mask from raw bits.
    #[must_use]
    pub const fn new(bits: i32) -> Self {
        Self(bits)
    }

    /// Check whether every bit of `flag` is set.
    #[must_use]
    pub const fn is_set(self, flag: i32) -> bool {
        self.0 & flag == flag
    }

    /// Return a copy with `flag` set.
    #[must_use]
    pub const fn with(self, flag: i32) -> Self {
        Self(self.0 | flag)
    }
}

// =============================================================================
// THREE-VECTORS
// =============================================================================

/// Double precision three-vector (positions, vertices).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vector3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3d {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Apply `f` to every component.
    #[must_use]
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.x), f(self.y), f(self.z))
    }

    /// Narrow to single precision.
    #[must_use]
    pub fn to_f32(self) -> Vector3f {
        Vector3f::new(self.x as f32, self.y as f32, self.z as f32)
    }
}

impl From<[f64; 3]> for Vector3d {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Single precision three-vector (momenta, spin, step positions).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vector3f {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3f {
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Vector3f {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Which side of a parent/daughter link failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Parent,
    Daughter,
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parent => f.write_str("parent"),
            Self::Daughter => f.write_str("daughter"),
        }
    }
}

/// Errors that can occur while converting and writing events.
///
/// Only `StreamState`, `Storage`, `Serialization` and `Io` are escalated to
/// the caller of a commit. Every other variant is local to one link, one
/// parameter or one hit stream: it is logged, the offending item is skipped,
/// and the rest of the event is still written.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// A hit stream cannot be mapped to an output collection.
    #[error("Schema error in hit stream '{stream}': {reason}")]
    Schema { stream: String, reason: String },

    /// A parent or daughter ID has no entry in the particle table.
    #[error("Particle {particle}: failed to find {relation} with ID {missing}")]
    DanglingReference {
        particle: SourceId,
        relation: Relation,
        missing: SourceId,
    },

    /// A configured event parameter does not parse into its declared type.
    #[error("Event parameter '{name}': failed to convert '{value}' to {expected}")]
    Parse {
        name: String,
        value: String,
        expected: &'static str,
    },

    /// The output stream is not open (or already closed).
    #[error("Output stream error: {0}")]
    StreamState(String),

    /// The output schema has no place for the requested content.
    #[error("Not supported by the output schema: {0}")]
    CapabilityGap(String),

    /// A hit stream reached conversion without a registered collection.
    #[error("Collection not registered: {0}")]
    MissingCollection(String),

    /// A registered collection holds a different record kind than expected.
    #[error("Collection '{name}' holds {found}, expected {expected}")]
    KindMismatch {
        name: String,
        expected: CollectionKind,
        found: CollectionKind,
    },

    /// The backing store rejected an operation.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The configuration could not be read.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl ConvertError {
    /// Whether the error invalidates the output stream rather than one item.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::StreamState(_) | Self::Storage(_) | Self::Serialization(_) | Self::Io(_)
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_source_id_is_none_marker() {
        assert!(SourceId(-1).is_none_marker());
        assert!(!SourceId(0).is_none_marker());
        assert!(!SourceId(17).is_none_marker());
    }

    #[test]
    fn status_mask_bits() {
        let mask = StatusMask::new(StatusMask::GEN_STABLE).with(StatusMask::SIM_CREATED);
        assert!(mask.is_set(StatusMask::GEN_STABLE));
        assert!(mask.is_set(StatusMask::SIM_CREATED));
        assert!(!mask.is_set(StatusMask::GEN_DECAYED));
    }

    #[test]
    fn narrowing_keeps_components() {
        let v = Vector3d::new(1.5, -2.0, 3.25).to_f32();
        assert_eq!(v, Vector3f::new(1.5, -2.0, 3.25));
    }

    #[test]
    fn only_stream_errors_are_fatal() {
        assert!(ConvertError::StreamState("closed".into()).is_fatal());
        assert!(
            !ConvertError::MissingCollection("VertexBarrelHits".into()).is_fatal()
        );
        let dangling = ConvertError::DanglingReference {
            particle: SourceId(3),
            relation: Relation::Daughter,
            missing: SourceId(99),
        };
        assert!(!dangling.is_fatal());
        assert_eq!(
            dangling.to_string(),
            "Particle 3: failed to find daughter with ID 99"
        );
    }
}
