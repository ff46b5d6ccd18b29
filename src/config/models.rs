use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the relay binary and library.
///
/// Deserialized from a JSON file. Every section has defaults, so `{}` is a
/// valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct Config {
    /// Where and how long messages are spilled to disk.
    #[serde(default)]
    pub overflow: OverflowConfig,

    /// Limits applied to every per-thread embedded runtime.
    #[serde(default)]
    pub runtime: RuntimeLimits,

    /// Keyword event sources for the binary (file, stdin).
    /// When empty the binary reads stdin.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Overflow artifact settings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct OverflowConfig {
    /// Directory for artifacts. Defaults to the platform temp directory.
    pub dir: Option<PathBuf>,

    /// File name prefix for artifacts (suffix is always `.log`).
    pub prefix: String,

    /// Remove stale artifacts left by earlier processes when a relay starts.
    pub sweep_stale: bool,

    /// Minimum age, in seconds, before a leftover artifact counts as stale.
    pub stale_after_secs: u64,
}

impl Default for OverflowConfig {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: crate::relay::overflow::DEFAULT_PREFIX.to_string(),
            sweep_stale: true,
            stale_after_secs: 3600,
        }
    }
}

/// Embedded runtime resource limits.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeLimits {
    /// Memory limit in megabytes. Unset means no limit.
    ///
    /// Overflow messages are read back whole inside the session, so a cap
    /// also bounds the largest message that can be relayed (roughly a third
    /// of the cap for non-ASCII text).
    pub memory_limit_mb: Option<usize>,

    /// Stack size limit in kilobytes.
    pub max_stack_size_kb: usize,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            memory_limit_mb: None,
            max_stack_size_kb: 512,
        }
    }
}

/// Keyword event source configuration.
/// Use `type` to select a variant:
/// - "file": replay a newline-delimited JSON file, optionally following it
/// - "stdin": read newline-delimited JSON from standard input
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    File {
        /// Absolute or relative path to the file.
        path: String,
        /// Keep polling for appended lines after reaching the end (default: false).
        #[serde(default)]
        follow: Option<bool>,
        /// Poll interval in milliseconds while following (default: 100).
        #[serde(default)]
        poll_ms: Option<u64>,
    },

    Stdin,
}

/// A keyword call carried by an event source.
///
/// Example: `{ "keyword": "Log", "args": ["hello", "WARN"] }`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct KeywordEvent {
    /// Keyword name (case and spaces/underscores are ignored).
    pub keyword: String,

    /// Positional arguments. Non-string values are logged as compact JSON.
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}
