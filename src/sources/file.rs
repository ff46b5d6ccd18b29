//! File event source.
//!
//! Replays a newline-delimited JSON file of keyword events.
//!
//! Behavior:
//! - Every complete line is parsed and dispatched in file order.
//! - Blank lines are ignored; malformed lines are logged (warn) and skipped.
//! - Without `follow` the task ends at EOF (a final line without a trailing
//!   newline is still dispatched).
//! - With `follow` the file is polled for appended lines. A missing file is
//!   waited for quietly, and a file that shrinks is read again from the start.
//!
//! The task ends early if the receiver side of the channel is closed.

use std::io::{self, SeekFrom};
use std::time::Duration;

use serde_json::Value;
use tokio::{
    fs as afs,
    io::{AsyncReadExt, AsyncSeekExt},
    sync::mpsc::Sender,
    task::JoinHandle,
    time::sleep,
};
use tracing::{error, info, trace, warn};

use super::{EventSource, parse_line};

/// Source that replays (and optionally follows) an NDJSON file.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: String,
    follow: bool,
    poll_ms: u64,
}

impl FileSource {
    /// `poll_ms` defaults to 100ms with a 10ms minimum.
    pub fn new(path: String, follow: bool, poll_ms: Option<u64>) -> Self {
        Self {
            path,
            follow,
            poll_ms: poll_ms.unwrap_or(100).max(10),
        }
    }
}

/// Bytes appended since `offset`, plus whether the file was truncated.
async fn read_appended(path: &str, offset: u64) -> io::Result<(Vec<u8>, bool)> {
    let mut file = afs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let truncated = len < offset;
    let start = if truncated { 0 } else { offset };
    file.seek(SeekFrom::Start(start)).await?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).await?;
    Ok((buf, truncated))
}

/// Remove every complete line from `pending` and parse it.
fn drain_lines(pending: &mut Vec<u8>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = pending.drain(..=pos).collect();
        if let Some(value) = parse_line("file", &String::from_utf8_lossy(&line)) {
            out.push(value);
        }
    }
    out
}

impl EventSource for FileSource {
    fn name(&self) -> &'static str {
        "file"
    }

    fn start(&self, sender: Sender<Value>) -> JoinHandle<()> {
        let path = self.path.clone();
        let follow = self.follow;
        let interval = Duration::from_millis(self.poll_ms);

        tokio::spawn(async move {
            info!(target: "logrelay::sources", %path, follow, "FileSource task started");

            let mut offset: u64 = 0;
            let mut pending: Vec<u8> = Vec::new();

            'poll: loop {
                match read_appended(&path, offset).await {
                    Ok((bytes, truncated)) => {
                        if truncated {
                            info!(target: "logrelay::sources", %path, "File shrank; reading from start");
                            offset = 0;
                            pending.clear();
                        }
                        offset += bytes.len() as u64;
                        pending.extend_from_slice(&bytes);
                        if !follow && !pending.is_empty() && !pending.ends_with(b"\n") {
                            pending.push(b'\n');
                        }

                        for value in drain_lines(&mut pending) {
                            if let Err(e) = sender.send(value).await {
                                error!(
                                    target: "logrelay::sources",
                                    %path, error = %e,
                                    "Channel closed; FileSource terminating"
                                );
                                break 'poll;
                            }
                        }
                    }
                    Err(e) if follow && e.kind() == io::ErrorKind::NotFound => {
                        trace!(target: "logrelay::sources", %path, "File not there yet");
                    }
                    Err(e) => {
                        warn!(target: "logrelay::sources", %path, error = %e, "Failed to read file");
                        if !follow {
                            break;
                        }
                    }
                }

                if !follow {
                    break;
                }
                sleep(interval).await;
            }

            info!(target: "logrelay::sources", %path, "FileSource task ended");
        })
    }
}
