//! Integration tests for the edmconv command line.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use clap::Parser;
use edmconv::cli::{Cli, Commands, ConvertOptions, resolve_config, run_conversion};
use edmconv_core::{ConvertError, RedbReader};
use std::path::Path;
use tempfile::TempDir;

const INPUT: &str = r#"{
  "runs": [
    {
      "run_id": 7,
      "events": [
        {
          "event_id": 0,
          "particles": {
            "particles": {
              "1": { "original_track_id": 1, "pdg": 11, "daughters": [2] },
              "2": { "original_track_id": 2, "pdg": 22, "parents": [1] }
            },
            "equivalent_tracks": { "15": 2 }
          },
          "hit_streams": [
            {
              "name": "VertexBarrelHits",
              "sensitive": { "name": "VertexBarrel", "encoding": "system:5,layer:4" },
              "payload": { "kind": "tracker", "hits": [
                { "cell_id": 11, "energy_deposit": 0.02, "truth": { "track_id": 15 } }
              ] }
            },
            {
              "name": "EcalBarrelHits",
              "sensitive": {
                "name": "EcalBarrel",
                "hit_creation_mode": "detailed",
                "encoding": "system:5,module:8"
              },
              "payload": { "kind": "calorimeter", "hits": [
                { "cell_id": 4, "energy_deposit": 30.0, "truth": [
                  { "track_id": 1, "pdg": 11, "deposit": 10.0 },
                  { "track_id": 2, "pdg": 22, "deposit": 20.0 }
                ] }
              ] }
            }
          ]
        },
        { "event_id": 1 },
        { "event_id": 2 }
      ]
    }
  ]
}"#;

fn write_input(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("events.json");
    std::fs::write(&path, INPUT).unwrap();
    path
}

#[test]
fn test_cli_parses_convert() {
    let cli = Cli::try_parse_from([
        "edmconv",
        "--json-mode",
        "convert",
        "--input",
        "in.json",
        "--output",
        "out.redb",
        "--workers",
        "3",
        "--run-offset",
        "100",
    ])
    .unwrap();

    assert!(cli.json_mode);
    match cli.command {
        Commands::Convert {
            workers,
            run_offset,
            event_offset,
            ..
        } => {
            assert_eq!(workers, 3);
            assert_eq!(run_offset, Some(100));
            assert_eq!(event_offset, None);
        }
        Commands::Inspect { .. } => panic!("expected convert"),
    }
}

#[test]
fn test_cli_overrides_config_file() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("edmconv.toml");
    std::fs::write(
        &config_path,
        "output = \"from-config.redb\"\nrun_number_offset = 5\nevent_number_offset = 2\n",
    )
    .unwrap();

    let options = ConvertOptions {
        config: Some(config_path),
        output: Some(dir.path().join("from-cli.redb")),
        run_offset: Some(9),
        ..ConvertOptions::default()
    };
    let config = resolve_config(&options).unwrap();

    assert_eq!(config.output, Some(dir.path().join("from-cli.redb")));
    assert_eq!(config.run_number_offset, 9);
    assert_eq!(config.event_number_offset, 2);
}

#[test]
fn test_convert_writes_all_events() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.redb");
    let options = ConvertOptions {
        input: write_input(dir.path()),
        output: Some(output.clone()),
        workers: 2,
        event_offset: Some(10),
        ..ConvertOptions::default()
    };

    let summary = run_conversion(&options).unwrap();
    assert_eq!(summary.runs, 1);
    assert_eq!(summary.events, 3);
    assert_eq!(summary.particles, 2);
    assert_eq!(summary.hits.get("VertexBarrelHits"), Some(&1));
    assert_eq!(summary.hits.get("EcalBarrelHits"), Some(&1));

    let reader = RedbReader::open(&output).unwrap();
    assert_eq!(reader.event_count().unwrap(), 3);
    assert!(reader.is_finished().unwrap());

    let mut event_numbers = Vec::new();
    for index in 0..3 {
        let event = reader.read_event(index).unwrap().unwrap();
        let header = event.header("EventHeader").unwrap();
        assert_eq!(header.run_number, 7);
        event_numbers.push(header.event_number);

        if let Some(hits) = event.tracker_hits("VertexBarrelHits")
            && !hits.is_empty()
        {
            assert!(hits[0].produced_by_secondary);
            let contribs = event
                .contributions("EcalBarrelHitsContributions")
                .unwrap();
            assert_eq!(contribs.len(), 2);
            assert_eq!(contribs[1].pdg, 22);
        }
    }
    event_numbers.sort_unstable();
    assert_eq!(event_numbers, vec![10, 11, 12]);
}

#[test]
fn test_convert_without_output_is_config_error() {
    let dir = TempDir::new().unwrap();
    let options = ConvertOptions {
        input: write_input(dir.path()),
        workers: 1,
        ..ConvertOptions::default()
    };

    let result = run_conversion(&options);
    assert!(matches!(result, Err(ConvertError::Config(_))));
}

#[test]
fn test_inspect_missing_database_fails() {
    let dir = TempDir::new().unwrap();
    let result = edmconv::cli::cmd_inspect(&dir.path().join("nope.redb"), None, true);
    assert!(result.is_err());
}
