use std::io;

use thiserror::Error;

/// Every failure the relay can report to a keyword caller.
///
/// All variants are recoverable at the process level. `OverflowIo` is the one
/// the relay treats as loud: a message that could not be spilled is lost, so
/// callers should surface it as a failed keyword rather than a warning.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The requested level name is not one of trace/debug/info/html/warn.
    #[error("Given log level {level} is invalid.")]
    InvalidSeverity { level: String },

    /// Creating, writing or reading back an overflow artifact failed.
    #[error("Error in handling temp file for long log message ({action})")]
    OverflowIo {
        action: &'static str,
        #[source]
        source: io::Error,
    },

    /// The embedded runtime rejected the command or the logger failed.
    #[error("Log command failed: {cause}\ncommand: {command}")]
    RuntimeExecution { command: String, cause: String },

    /// The embedded runtime for this thread could not be created.
    #[error("Failed to start embedded log runtime: {cause}")]
    SessionInit { cause: String },
}

impl RelayError {
    pub(crate) fn overflow(action: &'static str, source: io::Error) -> Self {
        Self::OverflowIo { action, source }
    }

    /// Returns true when the failure lost a message and should abort the keyword.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::OverflowIo { .. })
    }
}
