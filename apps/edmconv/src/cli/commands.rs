//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::input::{InputFile, InputRun};
use edmconv_core::primitives::{CELL_ID_ENCODING_KEY, EVENT_HEADER};
use edmconv_core::{
    ConvertError, EventAssembler, EventReport, OutputConfig, OutputStream, OutputTarget,
    RedbReader,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Validate output path.
///
/// The parent directory must exist; the file itself is recreated.
fn validate_output_path(path: &Path) -> Result<PathBuf, ConvertError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        ConvertError::Io(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(ConvertError::Io(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| ConvertError::Io("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// CONVERT COMMAND
// =============================================================================

/// Arguments of the `convert` command.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub workers: usize,
    pub run_offset: Option<i32>,
    pub event_offset: Option<i32>,
}

/// Totals of one conversion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConvertSummary {
    pub output: String,
    pub runs: usize,
    pub events: u64,
    pub particles: usize,
    /// Hits written per collection.
    pub hits: BTreeMap<String, usize>,
    /// Items skipped because of non-fatal errors.
    pub skipped: usize,
}

impl ConvertSummary {
    fn add(&mut self, report: &EventReport) {
        self.particles += report.particles;
        for (name, count) in &report.hits {
            *self.hits.entry(name.clone()).or_default() += count;
        }
        self.skipped += report.errors.len();
    }
}

/// Load the config file (if any) and apply command-line overrides.
pub fn resolve_config(options: &ConvertOptions) -> Result<OutputConfig, ConvertError> {
    let mut config = match &options.config {
        Some(path) => OutputConfig::from_file(path)?,
        None => OutputConfig::default(),
    };
    if let Some(output) = &options.output {
        config.output = Some(output.clone());
    }
    if let Some(offset) = options.run_offset {
        config.run_number_offset = offset;
    }
    if let Some(offset) = options.event_offset {
        config.event_number_offset = offset;
    }
    Ok(config)
}

/// Convert every event of the input file into the configured output.
///
/// Each worker owns one `EventAssembler` for the whole conversion and takes
/// every `workers`-th event of each run. All workers commit through one
/// shared output stream, which is closed once at the end.
pub fn run_conversion(options: &ConvertOptions) -> Result<ConvertSummary, ConvertError> {
    let config = resolve_config(options)?;
    let output = config.output.clone().ok_or_else(|| {
        ConvertError::Config(
            "no output file given (use --output or set `output` in the config)".to_string(),
        )
    })?;
    let output = validate_output_path(&output)?;
    let input = InputFile::load(&options.input)?;
    let workers = options.workers.max(1);

    tracing::info!(
        input = %options.input.display(),
        output = %output.display(),
        events = input.event_count(),
        workers,
        "starting conversion"
    );

    let stream = Arc::new(OutputStream::new(OutputTarget::Redb(output.clone())));
    let mut assemblers: Vec<EventAssembler> = (0..workers)
        .map(|_| EventAssembler::new(config.clone(), Arc::clone(&stream)))
        .collect();

    let mut summary = ConvertSummary {
        output: output.display().to_string(),
        runs: input.runs.len(),
        ..ConvertSummary::default()
    };

    for run in &input.runs {
        let results: Vec<Result<Vec<EventReport>, ConvertError>> = std::thread::scope(|scope| {
            let handles: Vec<_> = assemblers
                .iter_mut()
                .enumerate()
                .map(|(worker, asm)| scope.spawn(move || convert_share(asm, run, worker, workers)))
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        Err(ConvertError::StreamState("worker thread panicked".to_string()))
                    })
                })
                .collect()
        });

        for reports in results {
            for report in reports? {
                summary.add(&report);
            }
        }
    }

    stream.close()?;
    summary.events = stream.events_written();
    Ok(summary)
}

/// Convert the events of `run` that belong to `worker`.
fn convert_share(
    asm: &mut EventAssembler,
    run: &InputRun,
    worker: usize,
    workers: usize,
) -> Result<Vec<EventReport>, ConvertError> {
    asm.begin_run(run.info())?;
    let mut reports = Vec::new();
    for event in run.events.iter().skip(worker).step_by(workers) {
        reports.push(asm.process(event)?);
    }
    asm.end_run(run.info());
    tracing::debug!(run = run.run_id, worker, events = reports.len(), "worker finished run");
    Ok(reports)
}

/// Convert events and report the totals.
pub fn cmd_convert(options: &ConvertOptions, json_mode: bool) -> Result<(), ConvertError> {
    let summary = run_conversion(options)?;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Converted {} events from {} runs", summary.events, summary.runs);
    println!("Output:    {}", summary.output);
    println!("Particles: {}", summary.particles);
    for (name, count) in &summary.hits {
        println!("  {:<32} {} hits", name, count);
    }
    if summary.skipped > 0 {
        println!("Skipped:   {} items (see log)", summary.skipped);
    }

    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Show the contents of an output database.
pub fn cmd_inspect(
    db_path: &Path,
    event: Option<u64>,
    json_mode: bool,
) -> Result<(), ConvertError> {
    let reader = RedbReader::open(db_path)?;
    let count = reader.event_count()?;
    let finished = reader.is_finished()?;

    let mut collections = Vec::new();
    for (name, kind) in reader.write_list()? {
        let encoding = reader
            .collection_metadata(&name)?
            .and_then(|md| md.get_string(CELL_ID_ENCODING_KEY).map(str::to_string));
        collections.push((name, kind, encoding));
    }

    let detail = match event {
        Some(index) => Some(
            reader
                .read_event(index)?
                .ok_or_else(|| ConvertError::Storage(format!("no event {index} in file")))?,
        ),
        None => None,
    };

    if json_mode {
        let output = serde_json::json!({
            "database": db_path.to_string_lossy(),
            "events": count,
            "finished": finished,
            "collections": collections
                .iter()
                .map(|(name, kind, encoding)| serde_json::json!({
                    "name": name,
                    "type": kind.to_string(),
                    "encoding": encoding,
                }))
                .collect::<Vec<_>>(),
            "event": detail.as_ref().map(|stored| serde_json::json!({
                "header": stored.header(EVENT_HEADER),
                "sizes": stored
                    .collections
                    .iter()
                    .map(|(name, c)| (name.clone(), c.len()))
                    .collect::<BTreeMap<_, _>>(),
                "metadata": stored.metadata,
            })),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("edmconv Output");
    println!("==============");
    println!("Database: {}", db_path.display());
    println!("Events:   {}", count);
    println!("Finished: {}", if finished { "yes" } else { "no" });
    println!();
    println!("Collections:");
    for (name, kind, encoding) in &collections {
        match encoding {
            Some(encoding) => println!("  {:<32} {:<32} {}", name, kind, encoding),
            None => println!("  {:<32} {}", name, kind),
        }
    }

    if let (Some(index), Some(stored)) = (event, detail) {
        println!();
        println!("Event {}:", index);
        if let Some(header) = stored.header(EVENT_HEADER) {
            println!(
                "  run {} event {} time {}",
                header.run_number, header.event_number, header.time_stamp
            );
        }
        for (name, collection) in &stored.collections {
            println!("  {:<32} {} entries", name, collection.len());
        }
        println!("  {} event parameters", stored.metadata.len());
    }

    Ok(())
}
