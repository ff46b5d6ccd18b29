#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! logrelay — forwards test-keyword log calls into a structured logger that
//! lives inside an embedded script runtime.
//!
//! Every call becomes a small script run by a per-thread QuickJS session.
//! Messages too long to inline are written to a temporary file that the
//! script reads back, and the file is removed once the call returns.
//!
//! Modules:
//! - `relay`: severity table, command builder, overflow files, sessions, `LogRelay`.
//! - `keywords`: Robot-style keyword surface on top of the relay.
//! - `config`: configuration models, loader and schema helpers.
//! - `sources`: keyword event sources for the binary (file, stdin).
//!
//! Use `logrelay::prelude::*` to bring commonly used items into scope quickly.

/// Public module: configuration (models, loader, schema helpers).
pub mod config;
/// Public module: keyword surface.
pub mod keywords;
/// Public module: the log relay itself.
pub mod relay;
/// Public module: event sources (file, stdin).
pub mod sources;

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

/// Parse a simple level name (trace|debug|info|warn|warning|error).
pub fn parse_level(s: &str) -> Option<tracing::Level> {
    use tracing::Level;
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize tracing (logging) with a reasonable default.
/// - Honors the `RUST_LOG` environment variable if set.
/// - Falls back to `info` level.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| parse_level(&s))
        .unwrap_or(tracing::Level::INFO);

    // Ignore the error if the global subscriber was already set.
    let _ = tracing_subscriber::fmt().with_max_level(level).try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use logrelay::prelude::*;`
pub mod prelude {
    pub use anyhow::{Context, Error, Result, anyhow, bail, ensure};

    pub use tracing::{debug, error, info, instrument, trace, warn};

    pub use crate as logrelay;
    pub use crate::keywords::KeywordLibrary;
    pub use crate::relay::{LogRelay, RelayError, Severity, TestLogger, TracingLogger};
    pub use crate::{config, keywords, relay, sources};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("WARNING"), Some(tracing::Level::WARN));
        assert_eq!(parse_level("Trace"), Some(tracing::Level::TRACE));
        assert_eq!(parse_level("html"), None);
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
        assert_eq!(version(), PKG_VERSION);
    }
}
