//! # Output Records
//!
//! The persisted event data model: one record type per output collection
//! kind, and the tagged `Collection` handle that stores a homogeneous list of
//! them under a name.
//!
//! Relations between records are dense indices into sibling collections of
//! the same event (`ParticleIndex` into `MCParticles`, plain `usize` into a
//! `...Contributions` collection). They are only meaningful together with the
//! event they were written in.

use crate::{ParticleIndex, Vector3d, Vector3f};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// MC PARTICLE
// =============================================================================

/// A Monte Carlo truth particle in the output collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct McParticle {
    pub pdg: i32,
    pub generator_status: i32,
    pub created_in_simulation: bool,
    pub backscatter: bool,
    pub vertex_is_not_endpoint_of_parent: bool,
    pub decayed_in_tracker: bool,
    pub decayed_in_calorimeter: bool,
    pub has_left_detector: bool,
    pub stopped: bool,
    pub overlay: bool,
    pub charge: f32,
    /// Creation time in ns.
    pub time: f32,
    /// Mass in GeV.
    pub mass: f64,
    /// Production vertex in mm.
    pub vertex: Vector3d,
    /// End point in mm.
    pub endpoint: Vector3d,
    /// Momentum at the production vertex in GeV.
    pub momentum: Vector3f,
    /// Momentum at the end point in GeV.
    pub momentum_at_endpoint: Vector3f,
    pub spin: Vector3f,
    pub color_flow: [i32; 2],
    pub parents: Vec<ParticleIndex>,
    pub daughters: Vec<ParticleIndex>,
}

/// The dense particle collection with its parent/daughter relations.
///
/// Links are only added through [`McParticleCollection::link`], which keeps
/// both directions in sync: `a` lists `b` as daughter exactly when `b` lists
/// `a` as parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct McParticleCollection {
    particles: Vec<McParticle>,
}

impl McParticleCollection {
    /// Create an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a particle and return its index.
    ///
    /// Relation lists on the pushed record are discarded; use `link`.
    pub fn push(&mut self, mut particle: McParticle) -> ParticleIndex {
        particle.parents.clear();
        particle.daughters.clear();
        let index = ParticleIndex(self.particles.len());
        self.particles.push(particle);
        index
    }

    /// Record `daughter` as a daughter of `parent` and vice versa.
    ///
    /// Returns `false` (and changes nothing) if either index is out of range.
    /// A link that already exists is not duplicated.
    pub fn link(&mut self, parent: ParticleIndex, daughter: ParticleIndex) -> bool {
        if parent.0 >= self.particles.len() || daughter.0 >= self.particles.len() {
            return false;
        }
        let daughters = &mut self.particles[parent.0].daughters;
        if !daughters.contains(&daughter) {
            daughters.push(daughter);
        }
        let parents = &mut self.particles[daughter.0].parents;
        if !parents.contains(&parent) {
            parents.push(parent);
        }
        true
    }

    #[must_use]
    pub fn get(&self, index: ParticleIndex) -> Option<&McParticle> {
        self.particles.get(index.0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &McParticle> {
        self.particles.iter()
    }

    /// Remove all particles, keeping the allocation.
    pub fn clear(&mut self) {
        self.particles.clear();
    }
}

// =============================================================================
// EVENT HEADER
// =============================================================================

/// Run and event identification of one committed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EventHeader {
    pub event_number: i32,
    pub run_number: i32,
    /// Seconds since the Unix epoch at conversion time.
    pub time_stamp: u64,
}

// =============================================================================
// HITS
// =============================================================================

/// A tracker hit: one particle crossing one sensitive cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SimTrackerHit {
    pub cell_id: u64,
    /// Energy deposit in GeV.
    pub e_dep: f32,
    pub time: f32,
    pub path_length: f32,
    pub position: Vector3d,
    pub momentum: Vector3f,
    pub particle: Option<ParticleIndex>,
    /// The particle that produced this hit was not kept in the truth record;
    /// `particle` points to the ancestor it was folded into.
    pub produced_by_secondary: bool,
}

/// An aggregated calorimeter cell hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SimCalorimeterHit {
    pub cell_id: u64,
    /// Total energy in GeV.
    pub energy: f32,
    pub position: Vector3f,
    /// Indices into the companion contribution collection.
    pub contributions: Vec<usize>,
}

/// One simulation step's share of a calorimeter hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaloHitContribution {
    /// Only filled in detailed hit creation mode.
    pub pdg: i32,
    pub energy: f32,
    pub time: f32,
    /// Only filled in detailed hit creation mode.
    pub step_position: Vector3f,
    pub particle: Option<ParticleIndex>,
}

// =============================================================================
// COLLECTIONS
// =============================================================================

/// The closed set of record kinds a collection can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CollectionKind {
    McParticles,
    EventHeader,
    SimTrackerHits,
    SimCalorimeterHits,
    CaloHitContributions,
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::McParticles => "MCParticleCollection",
            Self::EventHeader => "EventHeaderCollection",
            Self::SimTrackerHits => "SimTrackerHitCollection",
            Self::SimCalorimeterHits => "SimCalorimeterHitCollection",
            Self::CaloHitContributions => "CaloHitContributionCollection",
        };
        f.pad(name)
    }
}

/// A named collection's contents, tagged by record kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Collection {
    McParticles(McParticleCollection),
    EventHeader(Vec<EventHeader>),
    SimTrackerHits(Vec<SimTrackerHit>),
    SimCalorimeterHits(Vec<SimCalorimeterHit>),
    CaloHitContributions(Vec<CaloHitContribution>),
}

impl Collection {
    /// Create an empty collection of the given kind.
    #[must_use]
    pub fn empty(kind: CollectionKind) -> Self {
        match kind {
            CollectionKind::McParticles => Self::McParticles(McParticleCollection::new()),
            CollectionKind::EventHeader => Self::EventHeader(Vec::new()),
            CollectionKind::SimTrackerHits => Self::SimTrackerHits(Vec::new()),
            CollectionKind::SimCalorimeterHits => Self::SimCalorimeterHits(Vec::new()),
            CollectionKind::CaloHitContributions => Self::CaloHitContributions(Vec::new()),
        }
    }

    #[must_use]
    pub fn kind(&self) -> CollectionKind {
        match self {
            Self::McParticles(_) => CollectionKind::McParticles,
            Self::EventHeader(_) => CollectionKind::EventHeader,
            Self::SimTrackerHits(_) => CollectionKind::SimTrackerHits,
            Self::SimCalorimeterHits(_) => CollectionKind::SimCalorimeterHits,
            Self::CaloHitContributions(_) => CollectionKind::CaloHitContributions,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::McParticles(c) => c.len(),
            Self::EventHeader(c) => c.len(),
            Self::SimTrackerHits(c) => c.len(),
            Self::SimCalorimeterHits(c) => c.len(),
            Self::CaloHitContributions(c) => c.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all records, keeping the collection (and its allocation) alive.
    pub fn clear(&mut self) {
        match self {
            Self::McParticles(c) => c.clear(),
            Self::EventHeader(c) => c.clear(),
            Self::SimTrackerHits(c) => c.clear(),
            Self::SimCalorimeterHits(c) => c.clear(),
            Self::CaloHitContributions(c) => c.clear(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
