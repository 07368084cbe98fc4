//! # edmconv-core
//!
//! Converts simulated detector events into named, typed record collections
//! and commits them, one event at a time, to a persisted store.
//!
//! ## Pipeline
//!
//! ```text
//! SimEvent ──> CollectionRegistry (first event only)
//!          ──> ParticleGraphBuilder ──> MCParticles + IdRemap
//!          ──> HitConverter (IdRemap) ──> hit collections
//!          ──> OutputStream::commit ──> EventWriter (memory / redb)
//! ```
//!
//! ## Architectural Constraints
//!
//! - Synchronous and deterministic: BTreeMap ordering throughout
//! - One `EventAssembler` per worker; workers share one `OutputStream`
//! - The set of record kinds is closed (`Collection` is an enum)
//! - Per-record problems are reported and skipped, never fatal to the event

// =============================================================================
// MODULES
// =============================================================================

pub mod assembler;
pub mod config;
pub mod event;
pub mod hits;
pub mod output;
pub mod particles;
pub mod primitives;
pub mod records;
pub mod registry;
pub mod storage;
pub mod store;
pub mod types;
pub mod units;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    ConvertError, ParticleIndex, Relation, SourceId, StatusMask, Vector3d, Vector3f,
};

// =============================================================================
// RE-EXPORTS: Conversion
// =============================================================================

pub use assembler::{EventAssembler, EventPhase, EventReport, SchemaState};
pub use config::OutputConfig;
pub use event::{
    CalorimeterHit, EventParameters, HitContribution, HitCreationMode, HitPayload, HitStream,
    RunInfo, SensitiveDetector, SimEvent, TrackerHit,
};
pub use hits::HitConverter;
pub use particles::{IdRemap, ParticleGraph, ParticleGraphBuilder, ParticleTable, SourceParticle};
pub use records::{
    CaloHitContribution, Collection, CollectionKind, EventHeader, McParticle,
    McParticleCollection, SimCalorimeterHit, SimTrackerHit,
};
pub use registry::{CollectionRegistry, DiscoveryReport, HitKind};
pub use store::{EventStore, Parameters};

// =============================================================================
// RE-EXPORTS: Output
// =============================================================================

pub use output::{EventWriter, OutputStream, OutputTarget};
pub use storage::{MemoryWriter, RedbReader, RedbWriter, StoredEvent};
