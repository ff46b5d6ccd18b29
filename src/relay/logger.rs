use anyhow::Result;
use tracing::{debug, info, trace, warn};

/// The structured test logger that relayed messages end up in.
///
/// Each session binds one of these under the name `logger`; the generated
/// commands call these methods by name. Implementations are shared by every
/// thread the relay is used from.
pub trait TestLogger: Send + Sync {
    fn trace(&self, message: &str) -> Result<()>;

    fn debug(&self, message: &str) -> Result<()>;

    /// `html` marks the message as markup; `escape` says whether the logger
    /// should escape it before rendering.
    fn info(&self, message: &str, html: bool, escape: bool) -> Result<()>;

    fn warn(&self, message: &str) -> Result<()>;
}

/// Logger that turns every relayed message into a `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl TestLogger for TracingLogger {
    fn trace(&self, message: &str) -> Result<()> {
        trace!(target: "logrelay::test", "{message}");
        Ok(())
    }

    fn debug(&self, message: &str) -> Result<()> {
        debug!(target: "logrelay::test", "{message}");
        Ok(())
    }

    fn info(&self, message: &str, html: bool, escape: bool) -> Result<()> {
        if html {
            info!(target: "logrelay::test", html, escape, "{message}");
        } else {
            info!(target: "logrelay::test", "{message}");
        }
        Ok(())
    }

    fn warn(&self, message: &str) -> Result<()> {
        warn!(target: "logrelay::test", "{message}");
        Ok(())
    }
}
