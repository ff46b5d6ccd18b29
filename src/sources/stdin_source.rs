//! Stdin event source.
//!
//! Reads newline-delimited keyword events from standard input, e.g.:
//!     echo '{"keyword":"Warn","args":["disk almost full"]}' | logrelay

use serde_json::Value;
use tokio::{
    io::{self, BufReader},
    sync::mpsc::Sender,
    task::JoinHandle,
};
use tracing::info;

use super::{EventSource, pump_lines};

/// Source that reads newline-delimited JSON events from stdin.
#[derive(Debug, Clone, Default)]
pub struct StdinSource;

impl StdinSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl EventSource for StdinSource {
    fn name(&self) -> &'static str {
        "stdin"
    }

    fn start(&self, sender: Sender<Value>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let sent = pump_lines("stdin", BufReader::new(io::stdin()), &sender).await;
            info!(target: "logrelay::sources", sent, "Stdin closed; StdinSource ended");
        })
    }
}
