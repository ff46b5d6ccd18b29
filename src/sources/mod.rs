/*!
Keyword event sources (orchestration layer).

This module defines the `EventSource` trait and orchestration helpers
(`build_sources_from_config`, `spawn_all_sources`). Concrete implementations
live in their own files:

- `file.rs`         -> `FileSource`  (replay / follow an NDJSON file)
- `stdin_source.rs` -> `StdinSource` (NDJSON from standard input)

Each source is responsible for:
- Parsing raw lines into `serde_json::Value`
- Pushing events via `Sender<Value>` while respecting backpressure (`send().await`)
- Logging errors and continuing (never panicking inside tasks)
- Ending cleanly when the channel closes
*/

use serde_json::Value;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc::Sender,
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::config::{Config, SourceConfig};

pub mod file;
pub mod stdin_source;

pub use file::FileSource;
pub use stdin_source::StdinSource;

/// Trait implemented by all event sources.
///
/// A source spawns an asynchronous task that produces JSON events and sends
/// them into the provided channel.
pub trait EventSource: Send + Sync {
    /// Static human-readable identifier (used in logs).
    fn name(&self) -> &'static str;

    /// Start the source in the background.
    fn start(&self, sender: Sender<Value>) -> JoinHandle<()>;
}

/// Construct all configured sources, in config order.
/// Falls back to a single stdin source when none are configured.
pub fn build_sources_from_config(cfg: &Config) -> Vec<Box<dyn EventSource>> {
    if cfg.sources.is_empty() {
        return vec![Box::new(StdinSource::new())];
    }

    cfg.sources
        .iter()
        .map(|sc| -> Box<dyn EventSource> {
            match sc {
                SourceConfig::File {
                    path,
                    follow,
                    poll_ms,
                } => Box::new(FileSource::new(
                    path.clone(),
                    follow.unwrap_or(false),
                    *poll_ms,
                )),
                SourceConfig::Stdin => Box::new(StdinSource::new()),
            }
        })
        .collect()
}

/// Spawn every source, returning their `JoinHandle`s.
pub fn spawn_all_sources(
    sources: &[Box<dyn EventSource>],
    sender: Sender<Value>,
) -> Vec<JoinHandle<()>> {
    sources
        .iter()
        .map(|src| {
            info!(
                target: "logrelay::sources",
                source = %src.name(),
                "Starting source task"
            );
            src.start(sender.clone())
        })
        .collect()
}

/// Parse one NDJSON line. Blank lines yield `None`; malformed ones are
/// logged and skipped.
pub(crate) fn parse_line(source: &'static str, line: &str) -> Option<Value> {
    let raw = line.trim();
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                target: "logrelay::sources",
                source, error = %e, line = raw,
                "Failed to parse JSON line"
            );
            None
        }
    }
}

/// Forward every event line of `reader` into `sender` until EOF, a read
/// error, or a closed channel. Returns the number of events sent.
pub(crate) async fn pump_lines<R>(source: &'static str, reader: R, sender: &Sender<Value>) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sent = 0;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!(target: "logrelay::sources", source, sent, "End of input");
                break;
            }
            Err(e) => {
                warn!(target: "logrelay::sources", source, error = %e, "Read failed; stopping");
                break;
            }
        };
        let Some(value) = parse_line(source, &line) else {
            continue;
        };
        if sender.send(value).await.is_err() {
            debug!(target: "logrelay::sources", source, "Receiver gone; stopping");
            break;
        }
        sent += 1;
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_pump_lines_skips_noise_and_keeps_order() {
        let input: &[u8] = b"{\"keyword\":\"Info\",\"args\":[\"a\"]}\n\n  \n{oops\n{\"keyword\":\"Warn\",\"args\":[\"b\"]}";
        let (tx, mut rx) = mpsc::channel(8);

        assert_eq!(pump_lines("test", input, &tx).await, 2);
        drop(tx);

        assert_eq!(rx.recv().await, Some(json!({"keyword": "Info", "args": ["a"]})));
        assert_eq!(rx.recv().await, Some(json!({"keyword": "Warn", "args": ["b"]})));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_pump_lines_stops_when_receiver_is_gone() {
        let input: &[u8] = b"{\"n\":1}\n{\"n\":2}\n";
        let (tx, rx) = mpsc::channel(8);
        drop(rx);
        assert_eq!(pump_lines("test", input, &tx).await, 0);
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("t", "   "), None);
        assert_eq!(parse_line("t", "{not json"), None);
        assert_eq!(
            parse_line("t", " {\"keyword\":\"Info\",\"args\":[\"x\"]}\n"),
            Some(json!({"keyword": "Info", "args": ["x"]}))
        );
    }

    #[test]
    fn test_default_source_is_stdin() {
        let sources = build_sources_from_config(&Config::default());
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name(), "stdin");
    }

    #[test]
    fn test_sources_follow_config_order() {
        let cfg = Config {
            sources: vec![
                SourceConfig::Stdin,
                SourceConfig::File {
                    path: "a.ndjson".into(),
                    follow: None,
                    poll_ms: None,
                },
            ],
            ..Config::default()
        };
        let names: Vec<_> = build_sources_from_config(&cfg)
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(names, ["stdin", "file"]);
    }
}
