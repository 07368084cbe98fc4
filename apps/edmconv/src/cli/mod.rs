//! # edmconv CLI Module
//!
//! ## Available Commands
//!
//! - `convert` - Convert simulated events into an EDM output file
//! - `inspect` - Show the contents of an output file

mod commands;

use clap::{Parser, Subcommand};
use edmconv_core::ConvertError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// edmconv - simulated event to EDM collection converter
///
/// Turns per-event particle tables and detector hit streams into named,
/// typed record collections stored in a redb database.
#[derive(Parser, Debug)]
#[command(name = "edmconv")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert simulated events into an output database
    Convert {
        /// Input events (JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Output database; overrides `output` from the config file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Converter configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of worker threads sharing the output stream
        #[arg(short, long, default_value = "1")]
        workers: usize,

        /// Run number offset; overrides the config file
        #[arg(long)]
        run_offset: Option<i32>,

        /// Event number offset; overrides the config file
        #[arg(long)]
        event_offset: Option<i32>,
    },

    /// Show the contents of an output database
    Inspect {
        /// Output database to read
        #[arg(short = 'D', long)]
        database: PathBuf,

        /// Show one event in detail (commit order, zero-based)
        #[arg(short, long)]
        event: Option<u64>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), ConvertError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Commands::Convert {
            input,
            output,
            config,
            workers,
            run_offset,
            event_offset,
        } => {
            let options = ConvertOptions {
                input,
                output,
                config,
                workers,
                run_offset,
                event_offset,
            };
            cmd_convert(&options, json_mode)
        }
        Commands::Inspect { database, event } => cmd_inspect(&database, event, json_mode),
    }
}
