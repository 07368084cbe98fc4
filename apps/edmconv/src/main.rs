//! # edmconv
//!
//! Converts simulated detector events into named, typed EDM record
//! collections.
//!
//! ## Usage
//!
//! ```bash
//! # Convert with four worker threads
//! edmconv convert --input events.json --output events.redb --workers 4
//!
//! # Convert with a configuration file and shifted run numbers
//! edmconv convert -i events.json -c edmconv.toml --run-offset 1000
//!
//! # Look at the result
//! edmconv inspect --database events.redb --event 0
//! ```

use clap::Parser;
use edmconv::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // EDMCONV_LOG_FORMAT=json switches to machine-parseable output.
    let log_format = std::env::var("EDMCONV_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "edmconv=info,edmconv_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        r#"
  edmconv v{}
  simulated events -> EDM collections
"#,
        env!("CARGO_PKG_VERSION")
    );
}
