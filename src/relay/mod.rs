/*!
Log relay: forwards keyword log calls into the structured test logger that
lives inside an embedded script runtime.

Pieces, leaf first:
- `severity`: level name -> logger method and extra arguments
- `command`: escaping and the text of the generated commands
- `overflow`: temporary artifacts for messages over the inline limit
- `session`: one embedded runtime per calling thread
- `logger`: the destination logger trait and a `tracing` implementation

Flow of one call:

```text
log(msg, level) ─► severity::resolve ─► fits_inline?
                                          ├─ yes ─► LogCommand::inline
                                          └─ no  ─► OverflowChannel::spill ─► LogCommand::read_back
                 ─► session (this thread) .execute(command) ─► artifact removed
```
*/

pub mod command;
pub mod error;
pub mod logger;
pub mod overflow;
pub mod session;
pub mod severity;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, trace};

use crate::config::{Config, RuntimeLimits};

pub use command::{INLINE_LIMIT, LogCommand, encode_inline, fits_inline};
pub use error::RelayError;
pub use logger::{TestLogger, TracingLogger};
pub use overflow::{OverflowArtifact, OverflowChannel};
pub use session::{SessionId, SessionInfo};
pub use severity::{Destination, Severity};

use session::SessionBootstrap;

static NEXT_RELAY_ID: AtomicU64 = AtomicU64::new(1);

/// Entry point for relayed logging. Cheap to share: wrap it in an `Arc` and
/// call it from any number of threads; each thread gets its own session.
pub struct LogRelay {
    id: u64,
    bootstrap: SessionBootstrap,
    overflow: OverflowChannel,
}

impl LogRelay {
    /// Relay with default limits, spilling into the platform temp directory.
    pub fn new(logger: Arc<dyn TestLogger>) -> Self {
        Self::from_parts(logger, OverflowChannel::in_temp_dir(), RuntimeLimits::default())
    }

    /// Relay configured from `config`. Sweeps stale artifacts first when enabled.
    pub fn from_config(config: &Config, logger: Arc<dyn TestLogger>) -> Self {
        let dir = config
            .overflow
            .dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let overflow = OverflowChannel::new(dir, config.overflow.prefix.clone());
        if config.overflow.sweep_stale {
            overflow.sweep_stale(Duration::from_secs(config.overflow.stale_after_secs));
        }
        Self::from_parts(logger, overflow, config.runtime)
    }

    pub fn from_parts(
        logger: Arc<dyn TestLogger>,
        overflow: OverflowChannel,
        limits: RuntimeLimits,
    ) -> Self {
        let id = NEXT_RELAY_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: "logrelay::relay",
            relay = id, dir = %overflow.dir().display(),
            "Created log relay"
        );
        Self {
            id,
            bootstrap: SessionBootstrap::new(logger, limits),
            overflow,
        }
    }

    pub fn overflow(&self) -> &OverflowChannel {
        &self.overflow
    }

    /// Log `message` at `level` (trace, debug, info, html or warn; any case).
    ///
    /// Messages longer than [`INLINE_LIMIT`] characters are passed through a
    /// temporary file, which is gone again when this returns.
    pub fn log(&self, message: &str, level: &str) -> Result<(), RelayError> {
        let dest = severity::resolve(level)?;

        if fits_inline(message) {
            trace!(target: "logrelay::relay", %level, bytes = message.len(), "Inline log");
            return self.execute(LogCommand::inline(dest, message));
        }

        let artifact = self.overflow.spill(message)?;
        let command = self.overflow.read_back_command(&artifact, dest);
        trace!(target: "logrelay::relay", %level, path = artifact.path_str(), "Overflow log");
        let result = self.execute(command);
        artifact.remove();
        result
    }

    pub fn trace(&self, message: &str) -> Result<(), RelayError> {
        self.log(message, "trace")
    }

    pub fn debug(&self, message: &str) -> Result<(), RelayError> {
        self.log(message, "debug")
    }

    pub fn info(&self, message: &str) -> Result<(), RelayError> {
        self.log(message, "info")
    }

    pub fn html(&self, message: &str) -> Result<(), RelayError> {
        self.log(message, "html")
    }

    pub fn warn(&self, message: &str) -> Result<(), RelayError> {
        self.log(message, "warn")
    }

    /// The calling thread's session, started if this thread has none yet.
    pub fn current_session(&self) -> Result<SessionInfo, RelayError> {
        session::current_info(self.id, &self.bootstrap)
    }

    fn execute(&self, command: LogCommand) -> Result<(), RelayError> {
        session::execute_on_current(self.id, &self.bootstrap, command)
    }
}

impl Drop for LogRelay {
    // Sessions on other threads are pruned the next time those threads log,
    // or go away with the threads.
    fn drop(&mut self) {
        session::release_current(self.id);
    }
}
