//! # Event Assembler
//!
//! Orchestrates the conversion of one event:
//!
//! 1. schema discovery (first event of the instance only)
//! 2. event header and event metadata
//! 3. particles
//! 4. hit streams
//! 5. commit through the shared output stream
//!
//! One assembler lives per simulation worker. It owns its `EventStore` and
//! shares only the `OutputStream` with the others.

use crate::config::OutputConfig;
use crate::event::{EventParameters, HitStream, RunInfo, SimEvent};
use crate::hits::HitConverter;
use crate::output::OutputStream;
use crate::particles::{IdRemap, ParticleGraphBuilder};
use crate::primitives::{EVENT_HEADER, MC_PARTICLES};
use crate::records::EventHeader;
use crate::registry::CollectionRegistry;
use crate::store::{EventStore, Parameters};
use crate::ConvertError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Whether the output schema has been discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    Uninitialized,
    Ready,
}

/// Progress of the event currently being assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPhase {
    Idle,
    SchemaReady,
    HeaderWritten,
    ParticlesWritten,
    HitsWritten,
    Committed,
}

/// What happened while converting one event.
#[derive(Debug, Default)]
pub struct EventReport {
    pub run_number: i32,
    pub event_number: i32,
    pub particles: usize,
    /// Hits written per stream name.
    pub hits: BTreeMap<String, usize>,
    /// Non-fatal problems; the affected items were skipped.
    pub errors: Vec<ConvertError>,
}

/// Converts events and commits them to a shared output stream.
#[derive(Debug)]
pub struct EventAssembler {
    config: OutputConfig,
    stream: Arc<OutputStream>,
    store: EventStore,
    registry: CollectionRegistry,
    schema: SchemaState,
    phase: EventPhase,
    run_id: i32,
    remap: IdRemap,
}

impl EventAssembler {
    #[must_use]
    pub fn new(config: OutputConfig, stream: Arc<OutputStream>) -> Self {
        Self {
            config,
            stream,
            store: EventStore::new(),
            registry: CollectionRegistry::new(),
            schema: SchemaState::Uninitialized,
            phase: EventPhase::Idle,
            run_id: 0,
            remap: IdRemap::default(),
        }
    }

    #[must_use]
    pub fn schema_state(&self) -> SchemaState {
        self.schema
    }

    #[must_use]
    pub fn phase(&self) -> EventPhase {
        self.phase
    }

    #[must_use]
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    #[must_use]
    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    /// Remap of the event currently being assembled.
    #[must_use]
    pub fn remap(&self) -> &IdRemap {
        &self.remap
    }

    // =========================================================================
    // RUN BOUNDARIES
    // =========================================================================

    /// Start a run: open the output stream (once per stream) and save the
    /// run header.
    pub fn begin_run(&mut self, run: RunInfo) -> Result<(), ConvertError> {
        self.run_id = run.run_id;
        self.stream.open()?;
        let _ = self.save_run(run);
        Ok(())
    }

    /// Run headers have no place in the output schema. Reported once per
    /// output stream; later calls return `None`.
    pub fn save_run(&self, run: RunInfo) -> Option<ConvertError> {
        if !self.stream.first_run_header_report() {
            return None;
        }
        let e = ConvertError::CapabilityGap(format!(
            "run header for run {} is not written ({} configured parameters dropped)",
            run.run_id,
            self.config.run_header.len()
        ));
        tracing::warn!("{e}");
        Some(e)
    }

    /// End of run. Nothing is flushed here; the stream is closed by its owner.
    pub fn end_run(&mut self, run: RunInfo) {
        tracing::debug!(run = run.run_id, "end of run");
    }

    // =========================================================================
    // EVENT
    // =========================================================================

    /// Discover the schema if needed, then write header, event metadata and
    /// particles of `event`.
    pub fn save_event(&mut self, event: &SimEvent) -> Result<EventReport, ConvertError> {
        let mut report = EventReport::default();

        if self.schema == SchemaState::Uninitialized {
            let discovery = self
                .registry
                .ensure_collections(event, &mut self.store, &self.stream)?;
            report.errors.extend(discovery.skipped);
            self.schema = SchemaState::Ready;
            self.phase = EventPhase::SchemaReady;
        }

        let (run_number, event_number) = self.numbers(event);
        report.run_number = run_number;
        report.event_number = event_number;
        tracing::info!(event = event_number, run = run_number, "saving event");

        let time_stamp = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        self.store.headers_mut(EVENT_HEADER)?.push(EventHeader {
            event_number,
            run_number,
            time_stamp,
        });

        let metadata = self.store.event_metadata_mut();
        if let Some(parameters) = &event.parameters {
            copy_event_parameters(parameters, metadata);
        }
        report
            .errors
            .extend(self.config.apply_event_parameters(metadata));
        self.phase = EventPhase::HeaderWritten;

        let particles = self.store.particles_mut(MC_PARTICLES)?;
        let graph = ParticleGraphBuilder::populate(&event.particles, particles);
        report.particles = graph.remap.len();
        report.errors.extend(graph.errors);
        self.remap = graph.remap;
        tracing::debug!(collection = MC_PARTICLES, entries = report.particles, "saved particles");
        self.phase = EventPhase::ParticlesWritten;

        Ok(report)
    }

    /// Convert one hit stream of `event` into its collection(s).
    ///
    /// Returns the number of hits written, or `None` for a stream that was
    /// given no collection at discovery. A stream that was never seen at
    /// discovery fails with `MissingCollection`.
    pub fn save_collection(
        &mut self,
        event: &SimEvent,
        stream: &HitStream,
    ) -> Result<Option<usize>, ConvertError> {
        if self.registry.was_skipped(&stream.name) {
            tracing::debug!(stream = %stream.name, "hit stream has no collection, ignored");
            return Ok(None);
        }
        let kind = self.registry.kind_of(&stream.name).ok_or_else(|| {
            let e = ConvertError::MissingCollection(stream.name.clone());
            tracing::error!("{e}");
            e
        })?;
        let written =
            HitConverter::convert(stream, kind, &mut self.store, &event.particles, &self.remap)?;
        self.phase = EventPhase::HitsWritten;
        Ok(Some(written))
    }

    /// Write the assembled event and clear the working collections.
    pub fn commit(&mut self) -> Result<(), ConvertError> {
        self.remap = IdRemap::default();
        self.phase = EventPhase::Committed;
        self.stream.commit(&mut self.store)
    }

    /// Convert and commit `event` in one go.
    ///
    /// Per-stream errors are collected in the report; only fatal errors
    /// abort the event.
    pub fn process(&mut self, event: &SimEvent) -> Result<EventReport, ConvertError> {
        let mut report = self.save_event(event)?;

        for stream in &event.hit_streams {
            match self.save_collection(event, stream) {
                Ok(Some(written)) => {
                    report.hits.insert(stream.name.clone(), written);
                }
                Ok(None) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => report.errors.push(e),
            }
        }

        self.commit()?;
        Ok(report)
    }

    fn numbers(&self, event: &SimEvent) -> (i32, i32) {
        let run_offset = self.config.run_offset();
        let event_offset = self.config.event_offset();
        match &event.parameters {
            Some(parameters) => (
                parameters.run_number.saturating_add(run_offset),
                parameters.event_number.saturating_add(event_offset),
            ),
            None => (
                self.run_id.saturating_add(run_offset),
                event.event_id.saturating_add(event_offset),
            ),
        }
    }
}

fn copy_event_parameters(parameters: &EventParameters, target: &mut Parameters) {
    for (key, values) in &parameters.int_parameters {
        target.set_ints(key.as_str(), values.clone());
    }
    for (key, values) in &parameters.float_parameters {
        target.set_floats(key.as_str(), values.clone());
    }
    for (key, values) in &parameters.string_parameters {
        target.set_strings(key.as_str(), values.clone());
    }
}

// =============================================================================
// TESTS
// =============================================================================
