//! # Collection Registry
//!
//! First-event schema discovery. The output schema is fixed by whatever the
//! first converted event of an instance contains:
//! - `MCParticles` and `EventHeader` are always created
//! - every hit stream with a supported payload gets one collection named
//!   after the stream, its kind inferred from the payload variant
//! - every calorimeter stream also gets a `<name>Contributions` companion
//!
//! The inferred kind is cached per stream name so later events never
//! re-inspect payloads. Discovery is idempotent: names already present are
//! skipped. A stream whose collection name (or companion name) is already
//! held by another collection gets nothing.

use crate::event::{HitPayload, HitStream, SimEvent};
use crate::output::OutputStream;
use crate::primitives::{CELL_ID_ENCODING_KEY, EVENT_HEADER, MC_PARTICLES, contributions_name};
use crate::records::CollectionKind;
use crate::store::EventStore;
use crate::ConvertError;
use std::collections::{BTreeMap, BTreeSet};

/// The hit families the converter supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HitKind {
    Tracker,
    Calorimeter,
}

impl HitKind {
    /// Kind of a payload, `None` for unsupported element types.
    #[must_use]
    pub fn of(payload: &HitPayload) -> Option<Self> {
        match payload {
            HitPayload::Tracker(_) => Some(Self::Tracker),
            HitPayload::Calorimeter(_) => Some(Self::Calorimeter),
            HitPayload::Unsupported(_) => None,
        }
    }

    /// The collection kind hits of this family are stored in.
    #[must_use]
    pub fn collection_kind(self) -> CollectionKind {
        match self {
            Self::Tracker => CollectionKind::SimTrackerHits,
            Self::Calorimeter => CollectionKind::SimCalorimeterHits,
        }
    }
}

/// Outcome of one discovery pass.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Collections created by this pass, in creation order.
    pub created: Vec<String>,
    /// Per-stream problems; the stream got no collection.
    pub skipped: Vec<ConvertError>,
}

/// Tracks which collections exist and the kind of every hit stream.
#[derive(Debug, Default)]
pub struct CollectionRegistry {
    kinds: BTreeMap<String, HitKind>,
    skipped: BTreeSet<String>,
    /// Collection name to the hit stream it was created for.
    owners: BTreeMap<String, String>,
}

impl CollectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached kind of stream `name`.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<HitKind> {
        self.kinds.get(name).copied()
    }

    /// Whether stream `name` was seen at discovery and given no collection.
    #[must_use]
    pub fn was_skipped(&self, name: &str) -> bool {
        self.skipped.contains(name)
    }

    /// Stream names with a collection, in name order.
    pub fn streams(&self) -> impl Iterator<Item = (&str, HitKind)> {
        self.kinds.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    /// Create every collection `event` needs and register it for write.
    ///
    /// Only errors from the output stream are returned as `Err`; problems
    /// with single hit streams end up in `DiscoveryReport::skipped`.
    pub fn ensure_collections(
        &mut self,
        event: &SimEvent,
        store: &mut EventStore,
        stream: &OutputStream,
    ) -> Result<DiscoveryReport, ConvertError> {
        let mut report = DiscoveryReport::default();

        Self::create(MC_PARTICLES, CollectionKind::McParticles, store, stream, &mut report)?;
        Self::create(EVENT_HEADER, CollectionKind::EventHeader, store, stream, &mut report)?;

        for hits in &event.hit_streams {
            if self.kinds.contains_key(&hits.name) || self.skipped.contains(&hits.name) {
                continue;
            }
            let inspected = Self::inspect(hits)
                .and_then(|found| self.check_names(hits, found.0, store).map(|()| found));
            match inspected {
                Ok((kind, encoding)) => {
                    self.owners.insert(hits.name.clone(), hits.name.clone());
                    Self::create(&hits.name, kind.collection_kind(), store, stream, &mut report)?;
                    store
                        .collection_metadata_mut(&hits.name)
                        .set_string(CELL_ID_ENCODING_KEY, encoding);
                    if kind == HitKind::Calorimeter {
                        let companion = contributions_name(&hits.name);
                        self.owners.insert(companion.clone(), hits.name.clone());
                        Self::create(
                            &companion,
                            CollectionKind::CaloHitContributions,
                            store,
                            stream,
                            &mut report,
                        )?;
                    }
                    self.kinds.insert(hits.name.clone(), kind);
                }
                Err(e) => {
                    match &e {
                        ConvertError::Schema { .. } if HitKind::of(&hits.payload).is_none() => {
                            tracing::warn!(stream = %hits.name, "{e}");
                        }
                        _ => tracing::error!(stream = %hits.name, "{e}"),
                    }
                    self.skipped.insert(hits.name.clone());
                    report.skipped.push(e);
                }
            }
        }

        Ok(report)
    }

    fn inspect(hits: &HitStream) -> Result<(HitKind, &str), ConvertError> {
        let schema = |reason: String| ConvertError::Schema {
            stream: hits.name.clone(),
            reason,
        };
        let kind = HitKind::of(&hits.payload).ok_or_else(|| {
            schema(format!(
                "unsupported hit type '{}', no collection created",
                hits.payload.type_name()
            ))
        })?;
        let sensitive = hits
            .sensitive
            .as_ref()
            .ok_or_else(|| schema("no sensitive detector".to_string()))?;
        let encoding = sensitive.encoding.as_deref().ok_or_else(|| {
            schema(format!(
                "sensitive detector '{}' has no cell ID encoding",
                sensitive.name
            ))
        })?;
        Ok((kind, encoding))
    }

    /// Every name the stream would create must be free or already its own.
    fn check_names(
        &self,
        hits: &HitStream,
        kind: HitKind,
        store: &EventStore,
    ) -> Result<(), ConvertError> {
        let mut names = vec![hits.name.clone()];
        if kind == HitKind::Calorimeter {
            names.push(contributions_name(&hits.name));
        }
        let taken = names.into_iter().find(|name| {
            store.contains(name) && self.owners.get(name) != Some(&hits.name)
        });
        match taken {
            Some(name) => Err(ConvertError::Schema {
                stream: hits.name.clone(),
                reason: format!("collection name '{name}' is already in use, no collection created"),
            }),
            None => Ok(()),
        }
    }

    fn create(
        name: &str,
        kind: CollectionKind,
        store: &mut EventStore,
        stream: &OutputStream,
        report: &mut DiscoveryReport,
    ) -> Result<(), ConvertError> {
        if store.contains(name) {
            return Ok(());
        }
        stream.register_for_write(name, kind)?;
        store.register_collection(name, kind)?;
        tracing::debug!(collection = name, kind = %kind, "created collection");
        report.created.push(name.to_string());
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CalorimeterHit, SensitiveDetector, TrackerHit};
    use crate::records::Collection;
    use crate::storage::MemoryWriter;

    fn detector(name: &str, encoding: Option<&str>) -> SensitiveDetector {
        SensitiveDetector {
            name: name.to_string(),
            encoding: encoding.map(str::to_string),
            ..SensitiveDetector::default()
        }
    }

    fn open_stream() -> (OutputStream, MemoryWriter) {
        let writer = MemoryWriter::new();
        let stream = OutputStream::memory(writer.clone());
        stream.open().expect("open");
        (stream, writer)
    }

    fn sample_event() -> SimEvent {
        SimEvent {
            hit_streams: vec![
                HitStream::tracker(
                    "VertexBarrelHits",
                    detector("VertexBarrel", Some("system:5,layer:4")),
                    vec![TrackerHit::default()],
                ),
                HitStream::calorimeter(
                    "EcalBarrelHits",
                    detector("EcalBarrel", Some("system:5,module:8")),
                    vec![CalorimeterHit::default()],
                ),
            ],
            ..SimEvent::default()
        }
    }

    #[test]
    fn discovery_creates_fixed_and_stream_collections() {
        let (stream, writer) = open_stream();
        let mut store = EventStore::new();
        let mut registry = CollectionRegistry::new();

        let report = registry
            .ensure_collections(&sample_event(), &mut store, &stream)
            .expect("discovery");

        assert!(report.skipped.is_empty());
        assert_eq!(
            report.created,
            vec![
                "MCParticles",
                "EventHeader",
                "VertexBarrelHits",
                "EcalBarrelHits",
                "EcalBarrelHitsContributions"
            ]
        );
        assert_eq!(registry.kind_of("EcalBarrelHits"), Some(HitKind::Calorimeter));
        assert_eq!(writer.write_list().len(), 5);
        assert_eq!(
            store
                .collection_metadata("VertexBarrelHits")
                .and_then(|md| md.get_string(CELL_ID_ENCODING_KEY)),
            Some("system:5,layer:4")
        );
    }

    #[test]
    fn discovery_is_idempotent() {
        let (stream, writer) = open_stream();
        let mut store = EventStore::new();
        let mut registry = CollectionRegistry::new();
        let event = sample_event();

        registry
            .ensure_collections(&event, &mut store, &stream)
            .expect("first");
        let again = registry
            .ensure_collections(&event, &mut store, &stream)
            .expect("second");

        assert!(again.created.is_empty());
        assert_eq!(store.collection_count(), 5);
        assert_eq!(writer.write_list().len(), 5);
    }

    #[test]
    fn unsupported_and_broken_streams_are_skipped() {
        let (stream, _writer) = open_stream();
        let mut store = EventStore::new();
        let mut registry = CollectionRegistry::new();
        let event = SimEvent {
            hit_streams: vec![
                HitStream {
                    name: "OpticalHits".to_string(),
                    sensitive: Some(detector("Rich", Some("system:5"))),
                    payload: HitPayload::Unsupported("Optical::Hit".to_string()),
                },
                HitStream {
                    name: "OrphanHits".to_string(),
                    sensitive: None,
                    payload: HitPayload::Tracker(Vec::new()),
                },
                HitStream::tracker("NoEncodingHits", detector("Muon", None), Vec::new()),
            ],
            ..SimEvent::default()
        };

        let report = registry
            .ensure_collections(&event, &mut store, &stream)
            .expect("discovery");

        assert_eq!(report.skipped.len(), 3);
        assert!(
            report
                .skipped
                .iter()
                .all(|e| matches!(e, ConvertError::Schema { .. }))
        );
        assert_eq!(store.collection_count(), 2);
        assert!(registry.was_skipped("OpticalHits"));
        assert!(registry.kind_of("OrphanHits").is_none());
    }

    #[test]
    fn discovery_needs_an_open_stream() {
        let stream = OutputStream::memory(MemoryWriter::new());
        let mut store = EventStore::new();
        let mut registry = CollectionRegistry::new();

        let result = registry.ensure_collections(&sample_event(), &mut store, &stream);
        assert!(matches!(result, Err(ConvertError::StreamState(_))));
        assert_eq!(store.collection_count(), 0);
    }

    #[test]
    fn names_already_in_use_are_not_reused() {
        let (stream, writer) = open_stream();
        let mut store = EventStore::new();
        let mut registry = CollectionRegistry::new();
        let event = SimEvent {
            hit_streams: vec![
                HitStream::tracker(
                    "EcalContributions",
                    detector("Preshower", Some("system:5")),
                    vec![TrackerHit::default()],
                ),
                HitStream::calorimeter(
                    "Ecal",
                    detector("Ecal", Some("system:5,module:8")),
                    vec![CalorimeterHit::default()],
                ),
                HitStream::tracker(
                    "MCParticles",
                    detector("Bogus", Some("system:5")),
                    Vec::new(),
                ),
            ],
            ..SimEvent::default()
        };

        let report = registry
            .ensure_collections(&event, &mut store, &stream)
            .expect("discovery");

        assert_eq!(report.skipped.len(), 2);
        assert!(report.skipped.iter().all(|e| matches!(
            e,
            ConvertError::Schema { stream, .. } if stream == "Ecal" || stream == "MCParticles"
        )));
        assert!(registry.was_skipped("Ecal"));
        assert!(registry.was_skipped("MCParticles"));
        assert!(registry.kind_of("Ecal").is_none());
        assert!(!store.contains("Ecal"));
        assert_eq!(
            registry.kind_of("EcalContributions"),
            Some(HitKind::Tracker)
        );
        assert!(
            store
                .collection_metadata("MCParticles")
                .and_then(|md| md.get_string(CELL_ID_ENCODING_KEY))
                .is_none()
        );
        assert_eq!(writer.write_list().len(), 3);
    }

    #[test]
    fn companion_name_blocks_later_tracker_stream() {
        let (stream, _writer) = open_stream();
        let mut store = EventStore::new();
        let mut registry = CollectionRegistry::new();
        let event = SimEvent {
            hit_streams: vec![
                HitStream::calorimeter(
                    "Ecal",
                    detector("Ecal", Some("system:5,module:8")),
                    Vec::new(),
                ),
                HitStream::tracker(
                    "EcalContributions",
                    detector("Preshower", Some("system:5")),
                    Vec::new(),
                ),
            ],
            ..SimEvent::default()
        };

        let report = registry
            .ensure_collections(&event, &mut store, &stream)
            .expect("discovery");

        assert_eq!(registry.kind_of("Ecal"), Some(HitKind::Calorimeter));
        assert!(registry.was_skipped("EcalContributions"));
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(
            store.get("EcalContributions").map(Collection::kind),
            Some(CollectionKind::CaloHitContributions)
        );
    }
}
