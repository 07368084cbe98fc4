//! # Hit Conversion
//!
//! Turns the raw hits of one stream into output records. Hits point at
//! particles through simulation track IDs, which are resolved in two steps:
//! track ID to source particle ID via the table's track equivalences, then
//! source ID to output index via the event's `IdRemap`. An unresolved track
//! leaves the hit without a particle reference.

use crate::event::{CalorimeterHit, HitCreationMode, HitPayload, HitStream, TrackerHit};
use crate::particles::{IdRemap, ParticleTable};
use crate::primitives::contributions_name;
use crate::records::{CaloHitContribution, SimCalorimeterHit, SimTrackerHit};
use crate::registry::HitKind;
use crate::store::EventStore;
use crate::units::{energy_vector, length_vector, length_vector_f32, to_energy, to_length, to_time};
use crate::{ConvertError, ParticleIndex, SourceId, Vector3f};

/// Converts hit streams into tracker and calorimeter collections.
pub struct HitConverter;

impl HitConverter {
    /// Append the hits of `stream` to its collection(s) in `store`.
    ///
    /// `kind` is the kind cached at schema discovery; a payload of a
    /// different family is rejected. Returns the number of hits written.
    pub fn convert(
        stream: &HitStream,
        kind: HitKind,
        store: &mut EventStore,
        table: &ParticleTable,
        remap: &IdRemap,
    ) -> Result<usize, ConvertError> {
        let written = match (kind, &stream.payload) {
            (HitKind::Tracker, HitPayload::Tracker(hits)) => {
                Self::convert_tracker(&stream.name, hits, store, table, remap)
            }
            (HitKind::Calorimeter, HitPayload::Calorimeter(hits)) => Self::convert_calorimeter(
                &stream.name,
                hits,
                stream.hit_creation_mode(),
                store,
                table,
                remap,
            ),
            (_, payload) => Err(ConvertError::Schema {
                stream: stream.name.clone(),
                reason: format!(
                    "cannot convert '{}' hits into a {kind:?} collection",
                    payload.type_name()
                ),
            }),
        }
        .inspect_err(|e| tracing::error!(stream = %stream.name, "{e}"))?;

        tracing::debug!(collection = %stream.name, entries = written, "saved hit collection");
        Ok(written)
    }

    /// Tracker hits: one record per raw hit, owner from the truth contribution.
    pub fn convert_tracker(
        name: &str,
        hits: &[TrackerHit],
        store: &mut EventStore,
        table: &ParticleTable,
        remap: &IdRemap,
    ) -> Result<usize, ConvertError> {
        let collection = store.tracker_hits_mut(name)?;
        collection.reserve(hits.len());

        for hit in hits {
            let truth = &hit.truth;
            let owner = Self::resolve(truth.track_id, table, remap);
            let produced_by_secondary = owner
                .and_then(|(id, _)| table.get(id))
                .is_some_and(|particle| particle.original_track_id != truth.track_id);

            collection.push(SimTrackerHit {
                cell_id: hit.cell_id,
                e_dep: to_energy(hit.energy_deposit) as f32,
                time: to_time(truth.time) as f32,
                path_length: to_length(hit.length) as f32,
                position: length_vector(hit.position),
                momentum: energy_vector(hit.momentum),
                particle: owner.map(|(_, index)| index),
                produced_by_secondary,
            });
        }

        Ok(hits.len())
    }

    /// Calorimeter hits plus one contribution record per truth entry.
    ///
    /// PDG code and step position of a contribution are only kept in
    /// detailed hit creation mode.
    pub fn convert_calorimeter(
        name: &str,
        hits: &[CalorimeterHit],
        mode: HitCreationMode,
        store: &mut EventStore,
        table: &ParticleTable,
        remap: &IdRemap,
    ) -> Result<usize, ConvertError> {
        let companion = contributions_name(name);
        let mut next_contribution = store.contributions_mut(&companion)?.len();
        // Fails early if the hit collection is missing or of another kind.
        store.calorimeter_hits_mut(name)?;

        let detailed = mode == HitCreationMode::Detailed;
        let mut records = Vec::with_capacity(hits.len());
        let mut contributions = Vec::new();

        for hit in hits {
            let mut indices = Vec::with_capacity(hit.truth.len());
            for step in &hit.truth {
                let owner = Self::resolve(step.track_id, table, remap);
                contributions.push(CaloHitContribution {
                    pdg: if detailed { step.pdg } else { 0 },
                    energy: to_energy(step.deposit) as f32,
                    time: to_time(step.time) as f32,
                    step_position: if detailed {
                        length_vector_f32(step.position)
                    } else {
                        Vector3f::default()
                    },
                    particle: owner.map(|(_, index)| index),
                });
                indices.push(next_contribution);
                next_contribution += 1;
            }

            records.push(SimCalorimeterHit {
                cell_id: hit.cell_id,
                energy: to_energy(hit.energy_deposit) as f32,
                position: length_vector_f32(hit.position),
                contributions: indices,
            });
        }

        store.contributions_mut(&companion)?.extend(contributions);
        store.calorimeter_hits_mut(name)?.extend(records);
        Ok(hits.len())
    }

    /// Track ID to (source ID, output index), if both steps resolve.
    fn resolve(
        track_id: i32,
        table: &ParticleTable,
        remap: &IdRemap,
    ) -> Option<(SourceId, ParticleIndex)> {
        let Some(id) = table.particle_id(track_id) else {
            tracing::debug!(track_id, "track has no particle in the truth record");
            return None;
        };
        remap.get(id).map(|index| (id, index))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::event::{HitContribution, SensitiveDetector};
    use crate::particles::{ParticleGraphBuilder, SourceParticle};
    use crate::records::{Collection, CollectionKind};
    use crate::Vector3d;

    fn table_with_folded_track() -> ParticleTable {
        let mut table = ParticleTable::new();
        table.insert(
            SourceId(0),
            SourceParticle {
                original_track_id: 1,
                pdg: 11,
                ..SourceParticle::default()
            },
        );
        // Track 7 was not kept; its hits belong to particle 0.
        table.add_equivalent_track(7, SourceId(0));
        table
    }

    fn store_with(name: &str, kind: CollectionKind) -> EventStore {
        let mut store = EventStore::new();
        store.register_collection(name, kind).expect("register");
        if kind == CollectionKind::SimCalorimeterHits {
            store
                .register_collection(
                    &contributions_name(name),
                    CollectionKind::CaloHitContributions,
                )
                .expect("register companion");
        }
        store
    }

    fn tracker_hit(track_id: i32) -> TrackerHit {
        TrackerHit {
            cell_id: 99,
            energy_deposit: 2.0,
            length: 0.3,
            position: Vector3d::new(1.0, 2.0, 3.0),
            momentum: Vector3d::new(1000.0, 0.0, 0.0),
            truth: HitContribution {
                track_id,
                time: 4.0,
                ..HitContribution::default()
            },
        }
    }

    #[test]
    fn tracker_hits_resolve_owner_and_secondary_flag() {
        let table = table_with_folded_track();
        let (_, graph) = ParticleGraphBuilder::build(&table);
        let mut store = store_with("TrackerHits", CollectionKind::SimTrackerHits);

        let hits = vec![tracker_hit(1), tracker_hit(7), tracker_hit(42)];
        let written =
            HitConverter::convert_tracker("TrackerHits", &hits, &mut store, &table, &graph.remap)
                .expect("convert");
        assert_eq!(written, 3);

        let Some(Collection::SimTrackerHits(out)) = store.get("TrackerHits") else {
            panic!("wrong collection");
        };
        assert_eq!(out[0].particle, Some(ParticleIndex(0)));
        assert!(!out[0].produced_by_secondary);
        assert_eq!(out[1].particle, Some(ParticleIndex(0)));
        assert!(out[1].produced_by_secondary);
        assert_eq!(out[2].particle, None);
        assert!(!out[2].produced_by_secondary);

        assert!((out[0].e_dep - 0.002).abs() < 1e-6);
        assert!((out[0].momentum.x - 1.0).abs() < 1e-6);
        assert!((out[0].time - 4.0).abs() < 1e-6);
    }

    #[test]
    fn detailed_mode_keeps_pdg_and_step_position() {
        let table = table_with_folded_track();
        let (_, graph) = ParticleGraphBuilder::build(&table);
        let step = HitContribution {
            track_id: 1,
            pdg: 22,
            deposit: 500.0,
            time: 1.5,
            length: 0.0,
            position: Vector3d::new(5.0, 6.0, 7.0),
        };
        let hit = CalorimeterHit {
            cell_id: 3,
            energy_deposit: 1000.0,
            position: Vector3d::new(10.0, 0.0, 0.0),
            truth: vec![step.clone(), step],
        };

        for (mode, pdg) in [(HitCreationMode::Detailed, 22), (HitCreationMode::Simple, 0)] {
            let mut store = store_with("EcalHits", CollectionKind::SimCalorimeterHits);
            let stream = HitStream::calorimeter(
                "EcalHits",
                SensitiveDetector {
                    hit_creation_mode: mode,
                    ..SensitiveDetector::default()
                },
                vec![hit.clone()],
            );
            HitConverter::convert(&stream, HitKind::Calorimeter, &mut store, &table, &graph.remap)
                .expect("convert");

            let Some(Collection::CaloHitContributions(contribs)) =
                store.get("EcalHitsContributions")
            else {
                panic!("missing contributions");
            };
            assert_eq!(contribs.len(), 2);
            assert_eq!(contribs[0].pdg, pdg);
            assert!((contribs[0].energy - 0.5).abs() < 1e-6);
            assert_eq!(contribs[0].particle, Some(ParticleIndex(0)));
            let expected_x = if mode == HitCreationMode::Detailed { 5.0 } else { 0.0 };
            assert!((contribs[0].step_position.x - expected_x).abs() < 1e-6);

            let Some(Collection::SimCalorimeterHits(cells)) = store.get("EcalHits") else {
                panic!("missing hits");
            };
            assert_eq!(cells[0].contributions, vec![0, 1]);
            assert!((cells[0].energy - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn contribution_indices_continue_across_calls() {
        let table = ParticleTable::new();
        let remap = IdRemap::default();
        let mut store = store_with("HcalHits", CollectionKind::SimCalorimeterHits);
        let hit = CalorimeterHit {
            truth: vec![HitContribution::default()],
            ..CalorimeterHit::default()
        };

        for _ in 0..2 {
            HitConverter::convert_calorimeter(
                "HcalHits",
                std::slice::from_ref(&hit),
                HitCreationMode::Simple,
                &mut store,
                &table,
                &remap,
            )
            .expect("convert");
        }

        let Some(Collection::SimCalorimeterHits(cells)) = store.get("HcalHits") else {
            panic!("missing hits");
        };
        assert_eq!(cells[1].contributions, vec![1]);
    }

    #[test]
    fn payload_of_other_family_is_rejected() {
        let table = ParticleTable::new();
        let remap = IdRemap::default();
        let mut store = store_with("TrackerHits", CollectionKind::SimTrackerHits);
        let stream = HitStream::calorimeter(
            "TrackerHits",
            SensitiveDetector::default(),
            vec![CalorimeterHit::default()],
        );

        let result = HitConverter::convert(&stream, HitKind::Tracker, &mut store, &table, &remap);
        assert!(matches!(result, Err(ConvertError::Schema { .. })));
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn unregistered_stream_is_missing() {
        let table = ParticleTable::new();
        let remap = IdRemap::default();
        let mut store = EventStore::new();

        let result =
            HitConverter::convert_tracker("Nowhere", &[tracker_hit(1)], &mut store, &table, &remap);
        assert!(matches!(result, Err(ConvertError::MissingCollection(_))));
    }
}
