use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use logrelay::config as cfg;
use logrelay::keywords::KeywordLibrary;
use logrelay::relay::{LogRelay, RelayError, TracingLogger};
use logrelay::sources;

/// logrelay CLI
#[derive(Debug, Parser)]
#[command(
    name = logrelay::PKG_NAME,
    version = logrelay::PKG_VERSION,
    about = "Relay keyword log calls into an embedded script runtime"
)]
struct Args {
    /// Path to the JSON configuration file (defaults are used when omitted)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Set log level (e.g., trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Print the JSON Schema for the configuration and exit
    #[arg(long = "print-schema")]
    print_schema: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match &args.log_level {
        Some(level) => {
            let level = logrelay::parse_level(level).unwrap_or(tracing::Level::INFO);
            let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
        }
        None => logrelay::init_tracing(),
    }

    if args.print_schema {
        let schema = cfg::generate_schema();
        let json = serde_json::to_string_pretty(&schema)?;
        println!("{json}");
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => cfg::load_from_path_async(path).await?,
        None => cfg::Config::default(),
    };
    debug!(target: "logrelay", "Configuration loaded successfully");

    info!(
        version = logrelay::PKG_VERSION,
        sources = config.sources.len(),
        "Starting logrelay"
    );

    let relay = LogRelay::from_config(&config, Arc::new(TracingLogger));
    let library = KeywordLibrary::new(Arc::new(relay));

    let sources = sources::build_sources_from_config(&config);
    let (tx, mut rx) = mpsc::channel::<Value>(256);
    let _handles = sources::spawn_all_sources(&sources, tx);

    // Events are handled on this task one at a time, so every keyword runs on
    // the same thread and in arrival order.
    tokio::select! {
        _ = async {
            while let Some(event) = rx.recv().await {
                if let Err(err) = library.run_event(&event) {
                    let fatal = err
                        .downcast_ref::<RelayError>()
                        .is_some_and(RelayError::is_fatal);
                    if fatal {
                        error!(error = %format!("{err:#}"), event = %event, "Keyword lost its log message");
                    } else {
                        warn!(error = %format!("{err:#}"), event = %event, "Keyword failed");
                    }
                }
            }
        } => {
            info!("All sources finished");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    info!("logrelay exited");
    Ok(())
}
