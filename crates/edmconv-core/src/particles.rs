//! # Particle Graph Builder
//!
//! Turns the sparse, ID-keyed particle table of one event into the dense
//! `MCParticles` collection.
//!
//! The table stores relations as source IDs. The output stores them as dense
//! indices. Conversion therefore runs in two passes over the table:
//!
//! 1. Convert every particle and record `SourceId -> ParticleIndex`.
//! 2. Resolve every daughter and parent ID through that map and link the
//!    two output particles in both directions.
//!
//! An ID that does not resolve drops that single link. The rest of the graph
//! is still built; the dropped links are returned with the result.

use crate::primitives::{
    GEN_STATUS_BEAM, GEN_STATUS_DECAYED, GEN_STATUS_DOCUMENTATION, GEN_STATUS_NONE,
    GEN_STATUS_OTHER, GEN_STATUS_STABLE,
};
use crate::records::{McParticle, McParticleCollection};
use crate::{ConvertError, ParticleIndex, Relation, SourceId, StatusMask, Vector3d, Vector3f, units};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// SOURCE PARTICLE TABLE
// =============================================================================

/// A particle as recorded by the simulation's truth handler.
///
/// Kinematics are in native units (MeV, mm, ns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SourceParticle {
    /// Track ID the simulation originally assigned to this particle.
    pub original_track_id: i32,
    pub pdg: i32,
    /// Charge from the particle definition, `None` when no definition exists.
    pub charge: Option<f64>,
    pub status: StatusMask,
    /// Explicit generator status; zero means "derive from `status`".
    pub gen_status: i32,
    pub momentum: Vector3d,
    pub end_momentum: Vector3d,
    pub vertex: Vector3d,
    pub end_vertex: Vector3d,
    pub time: f64,
    pub mass: f64,
    pub spin: Vector3f,
    pub color_flow: [i32; 2],
    pub parents: Vec<SourceId>,
    pub daughters: Vec<SourceId>,
}

/// Serialized shape of a [`ParticleTable`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ParticleTableData {
    particles: BTreeMap<SourceId, SourceParticle>,
    #[serde(default)]
    equivalent_tracks: BTreeMap<i32, SourceId>,
}

/// The per-event particle table.
///
/// Iteration order is ascending `SourceId`; that is the order in which
/// output indices are assigned. IDs are unique by construction.
///
/// Besides the particles, the table keeps the track equivalence map: the
/// simulation drops uninteresting secondaries from the truth record and
/// folds their tracks into a surviving ancestor. Hits keep the raw track ID,
/// so they resolve their owner through [`ParticleTable::particle_id`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(from = "ParticleTableData", into = "ParticleTableData")]
pub struct ParticleTable {
    particles: BTreeMap<SourceId, SourceParticle>,
    equivalent_tracks: BTreeMap<i32, SourceId>,
}

impl From<ParticleTableData> for ParticleTable {
    fn from(data: ParticleTableData) -> Self {
        let mut table = Self {
            particles: BTreeMap::new(),
            equivalent_tracks: data.equivalent_tracks,
        };
        for (id, particle) in data.particles {
            table.insert(id, particle);
        }
        table
    }
}

impl From<ParticleTable> for ParticleTableData {
    fn from(table: ParticleTable) -> Self {
        Self {
            particles: table.particles,
            equivalent_tracks: table.equivalent_tracks,
        }
    }
}

impl ParticleTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a particle under `id`, returning any particle it replaced.
    ///
    /// A positive `original_track_id` is registered as equivalent to `id`
    /// unless an explicit equivalence for that track already exists.
    pub fn insert(&mut self, id: SourceId, particle: SourceParticle) -> Option<SourceParticle> {
        if particle.original_track_id > 0 {
            self.equivalent_tracks
                .entry(particle.original_track_id)
                .or_insert(id);
        }
        self.particles.insert(id, particle)
    }

    /// Declare that hits of `track_id` belong to particle `id`.
    pub fn add_equivalent_track(&mut self, track_id: i32, id: SourceId) {
        self.equivalent_tracks.insert(track_id, id);
    }

    /// Resolve a simulation track ID to the ID of the particle that owns it.
    #[must_use]
    pub fn particle_id(&self, track_id: i32) -> Option<SourceId> {
        self.equivalent_tracks.get(&track_id).copied()
    }

    #[must_use]
    pub fn get(&self, id: SourceId) -> Option<&SourceParticle> {
        self.particles.get(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Particles in table order.
    pub fn iter(&self) -> impl Iterator<Item = (SourceId, &SourceParticle)> {
        self.particles.iter().map(|(id, particle)| (*id, particle))
    }
}

// =============================================================================
// ID REMAP
// =============================================================================

/// Source ID to output index map for one event.
///
/// Built by [`ParticleGraphBuilder::populate`] and passed explicitly to hit
/// conversion; never shared between events.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdRemap(BTreeMap<SourceId, ParticleIndex>);

impl IdRemap {
    #[must_use]
    pub fn get(&self, id: SourceId) -> Option<ParticleIndex> {
        self.0.get(&id).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SourceId, ParticleIndex)> + '_ {
        self.0.iter().map(|(id, index)| (*id, *index))
    }

    fn insert(&mut self, id: SourceId, index: ParticleIndex) {
        self.0.insert(id, index);
    }
}

/// Outcome of populating a particle collection.
#[derive(Debug, Default)]
pub struct ParticleGraph {
    /// Where every source particle landed.
    pub remap: IdRemap,
    /// Links that were dropped because an ID did not resolve.
    pub errors: Vec<ConvertError>,
}

// =============================================================================
// BUILDER
// =============================================================================

/// Converts particle tables into `MCParticles` collections.
pub struct ParticleGraphBuilder;

impl ParticleGraphBuilder {
    /// Build a fresh collection from `table`.
    #[must_use]
    pub fn build(table: &ParticleTable) -> (McParticleCollection, ParticleGraph) {
        let mut particles = McParticleCollection::new();
        let graph = Self::populate(table, &mut particles);
        (particles, graph)
    }

    /// Append the particles of `table` to `particles` and link them.
    ///
    /// An empty table leaves the collection untouched and yields an empty
    /// remap.
    pub fn populate(table: &ParticleTable, particles: &mut McParticleCollection) -> ParticleGraph {
        let mut graph = ParticleGraph::default();

        // Pass 1: convert and index
        for (id, source) in table.iter() {
            let index = particles.push(Self::convert(source));
            graph.remap.insert(id, index);
        }

        // Pass 2: relations
        for (id, source) in table.iter() {
            let Some(index) = graph.remap.get(id) else {
                continue;
            };

            for &daughter_id in &source.daughters {
                match graph.remap.get(daughter_id) {
                    Some(daughter) => {
                        particles.link(index, daughter);
                    }
                    None => graph.errors.push(Self::dangling(id, Relation::Daughter, daughter_id)),
                }
            }

            for &parent_id in &source.parents {
                if parent_id.is_none_marker() {
                    continue;
                }
                match graph.remap.get(parent_id) {
                    Some(parent) => {
                        particles.link(parent, index);
                    }
                    None => graph.errors.push(Self::dangling(id, Relation::Parent, parent_id)),
                }
            }
        }

        graph
    }

    /// Convert the scalar and kinematic fields of one particle.
    #[must_use]
    pub fn convert(source: &SourceParticle) -> McParticle {
        let mask = source.status;
        let created_in_simulation = mask.is_set(StatusMask::SIM_CREATED);

        McParticle {
            pdg: source.pdg,
            generator_status: if created_in_simulation {
                GEN_STATUS_NONE
            } else {
                Self::generator_status(source)
            },
            created_in_simulation,
            backscatter: mask.is_set(StatusMask::SIM_BACKSCATTER),
            vertex_is_not_endpoint_of_parent: mask.is_set(StatusMask::SIM_PARENT_RADIATED),
            decayed_in_tracker: mask.is_set(StatusMask::SIM_DECAY_TRACKER),
            decayed_in_calorimeter: mask.is_set(StatusMask::SIM_DECAY_CALO),
            has_left_detector: mask.is_set(StatusMask::SIM_LEFT_DETECTOR),
            stopped: mask.is_set(StatusMask::SIM_STOPPED),
            overlay: false,
            charge: source.charge.unwrap_or(0.0) as f32,
            time: units::to_time(source.time) as f32,
            mass: units::to_energy(source.mass),
            vertex: units::length_vector(source.vertex),
            endpoint: units::length_vector(source.end_vertex),
            momentum: units::energy_vector(source.momentum),
            momentum_at_endpoint: units::energy_vector(source.end_momentum),
            spin: source.spin,
            color_flow: source.color_flow,
            parents: Vec::new(),
            daughters: Vec::new(),
        }
    }

    /// Generator status before the simulation-created override.
    ///
    /// An explicit non-zero status wins; otherwise the first matching
    /// generator bit in the order stable, decayed, documentation, beam, other.
    #[must_use]
    pub fn generator_status(source: &SourceParticle) -> i32 {
        if source.gen_status != 0 {
            return source.gen_status;
        }
        let mask = source.status;
        [
            (StatusMask::GEN_STABLE, GEN_STATUS_STABLE),
            (StatusMask::GEN_DECAYED, GEN_STATUS_DECAYED),
            (StatusMask::GEN_DOCUMENTATION, GEN_STATUS_DOCUMENTATION),
            (StatusMask::GEN_BEAM, GEN_STATUS_BEAM),
            (StatusMask::GEN_OTHER, GEN_STATUS_OTHER),
        ]
        .into_iter()
        .find(|(flag, _)| mask.is_set(*flag))
        .map(|(_, status)| status)
        .unwrap_or(GEN_STATUS_NONE)
    }

    fn dangling(particle: SourceId, relation: Relation, missing: SourceId) -> ConvertError {
        tracing::error!(
            particle = particle.0,
            %relation,
            missing = missing.0,
            "failed to resolve particle relation, link dropped"
        );
        ConvertError::DanglingReference {
            particle,
            relation,
            missing,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(parents: &[i32], daughters: &[i32]) -> SourceParticle {
        SourceParticle {
            parents: parents.iter().copied().map(SourceId).collect(),
            daughters: daughters.iter().copied().map(SourceId).collect(),
            ..SourceParticle::default()
        }
    }

    #[test]
    fn empty_table_builds_empty_collection() {
        let (particles, graph) = ParticleGraphBuilder::build(&ParticleTable::new());
        assert!(particles.is_empty());
        assert!(graph.remap.is_empty());
        assert!(graph.errors.is_empty());
    }

    #[test]
    fn two_particle_chain() {
        let mut table = ParticleTable::new();
        table.insert(SourceId(1), particle(&[], &[2]));
        table.insert(SourceId(2), particle(&[1], &[]));

        let (particles, graph) = ParticleGraphBuilder::build(&table);
        assert_eq!(particles.len(), 2);
        assert!(graph.errors.is_empty());
        assert_eq!(
            particles.get(ParticleIndex(0)).expect("p0").daughters,
            vec![ParticleIndex(1)]
        );
        assert_eq!(
            particles.get(ParticleIndex(1)).expect("p1").parents,
            vec![ParticleIndex(0)]
        );
    }

    #[test]
    fn sparse_ids_map_to_dense_indices() {
        let mut table = ParticleTable::new();
        table.insert(SourceId(40), particle(&[-1], &[7]));
        table.insert(SourceId(7), particle(&[40], &[]));
        table.insert(SourceId(1000), particle(&[], &[]));

        let (_, graph) = ParticleGraphBuilder::build(&table);
        assert_eq!(graph.remap.get(SourceId(7)), Some(ParticleIndex(0)));
        assert_eq!(graph.remap.get(SourceId(40)), Some(ParticleIndex(1)));
        assert_eq!(graph.remap.get(SourceId(1000)), Some(ParticleIndex(2)));
    }

    #[test]
    fn no_parent_marker_is_not_resolved() {
        let mut table = ParticleTable::new();
        table.insert(SourceId(0), particle(&[-1], &[]));

        let (particles, graph) = ParticleGraphBuilder::build(&table);
        assert!(graph.errors.is_empty());
        assert!(particles.get(ParticleIndex(0)).expect("p0").parents.is_empty());
    }

    #[test]
    fn dangling_daughter_is_dropped_and_reported() {
        let mut table = ParticleTable::new();
        table.insert(SourceId(1), particle(&[], &[2, 99]));
        table.insert(SourceId(2), particle(&[1], &[]));

        let (particles, graph) = ParticleGraphBuilder::build(&table);
        assert_eq!(graph.errors.len(), 1);
        assert!(matches!(
            graph.errors[0],
            ConvertError::DanglingReference {
                relation: Relation::Daughter,
                missing: SourceId(99),
                ..
            }
        ));
        assert_eq!(
            particles.get(ParticleIndex(0)).expect("p0").daughters,
            vec![ParticleIndex(1)]
        );
    }

    #[test]
    fn generator_status_priority() {
        let mut source = SourceParticle {
            status: StatusMask::new(StatusMask::GEN_BEAM | StatusMask::GEN_DECAYED),
            ..SourceParticle::default()
        };
        assert_eq!(ParticleGraphBuilder::generator_status(&source), 2);

        source.status = StatusMask::new(StatusMask::GEN_OTHER);
        assert_eq!(ParticleGraphBuilder::generator_status(&source), 9);

        source.gen_status = 23;
        assert_eq!(ParticleGraphBuilder::generator_status(&source), 23);

        source.gen_status = 0;
        source.status = StatusMask::default();
        assert_eq!(ParticleGraphBuilder::generator_status(&source), 0);
    }

    #[test]
    fn simulation_created_forces_status_zero() {
        let source = SourceParticle {
            gen_status: 1,
            status: StatusMask::new(StatusMask::GEN_STABLE | StatusMask::SIM_CREATED),
            ..SourceParticle::default()
        };
        let converted = ParticleGraphBuilder::convert(&source);
        assert_eq!(converted.generator_status, 0);
        assert!(converted.created_in_simulation);
    }

    #[test]
    fn kinematics_are_normalized() {
        let source = SourceParticle {
            pdg: 11,
            charge: None,
            momentum: Vector3d::new(0.0, 0.0, 5000.0),
            vertex: Vector3d::new(1.0, 2.0, 3.0),
            time: 0.5,
            mass: 0.511,
            status: StatusMask::new(StatusMask::SIM_LEFT_DETECTOR | StatusMask::SIM_BACKSCATTER),
            ..SourceParticle::default()
        };
        let converted = ParticleGraphBuilder::convert(&source);
        assert_eq!(converted.momentum, Vector3f::new(0.0, 0.0, 5.0));
        assert_eq!(converted.vertex, Vector3d::new(1.0, 2.0, 3.0));
        assert!((converted.mass - 0.000_511).abs() < 1e-12);
        assert_eq!(converted.charge, 0.0);
        assert!(converted.has_left_detector);
        assert!(converted.backscatter);
        assert!(!converted.stopped);
        assert!(!converted.overlay);
    }

    #[test]
    fn insert_registers_own_track() {
        let mut table = ParticleTable::new();
        table.add_equivalent_track(12, SourceId(3));
        table.insert(
            SourceId(3),
            SourceParticle {
                original_track_id: 12,
                ..SourceParticle::default()
            },
        );
        table.insert(
            SourceId(4),
            SourceParticle {
                original_track_id: 15,
                ..SourceParticle::default()
            },
        );
        table.add_equivalent_track(31, SourceId(4));

        assert_eq!(table.particle_id(12), Some(SourceId(3)));
        assert_eq!(table.particle_id(15), Some(SourceId(4)));
        assert_eq!(table.particle_id(31), Some(SourceId(4)));
        assert_eq!(table.particle_id(77), None);
    }
}
