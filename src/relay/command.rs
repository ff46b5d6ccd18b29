//! Text of the commands sent to the embedded runtime.
//!
//! Everything that quotes or escapes lives here so it can be checked without
//! running a session. Two shapes exist:
//!
//! ```text
//! inline:     logger.info('it\'s ok\nline2')
//! read-back:  (function () {
//!                 const msg = readArtifact('/tmp/logrelay-x1y2.log');
//!                 logger.debug(msg);
//!             })();
//! ```

use std::fmt::{self, Write as _};

use super::severity::Destination;

/// Longest message, in characters, that may be embedded in a command.
///
/// Anything longer travels through an overflow artifact. This is tied to the
/// downstream parser and is not meant to be tuned.
pub const INLINE_LIMIT: usize = 1024;

/// Global name the destination logger is bound to in every session.
pub const LOGGER_BINDING: &str = "logger";

/// Host function sessions expose for reading an overflow artifact.
pub const READ_ARTIFACT_FN: &str = "readArtifact";

/// True when `message` is short enough for the inline path (character count).
pub fn fits_inline(message: &str) -> bool {
    message.chars().nth(INLINE_LIMIT).is_none()
}

/// Escape `message` for use inside a single-quoted literal.
///
/// Quotes and line breaks would end the literal early, a bare backslash
/// would start an escape sequence, and the runtime refuses scripts holding
/// NUL. Other control characters are written as `\xNN` so the script text
/// stays printable.
pub fn encode_inline(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 8);
    for c in message.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            other => out.push(other),
        }
    }
    out
}

/// A generated command, ready to run once against a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCommand {
    script: String,
}

impl LogCommand {
    /// `logger.<method>('<escaped message>'<extra>)`
    pub fn inline(dest: Destination, message: &str) -> Self {
        Self {
            script: format!(
                "{LOGGER_BINDING}.{}('{}'{})",
                dest.method,
                encode_inline(message),
                dest.extra_args
            ),
        }
    }

    /// A fixed-size script that reads the message from `artifact` and logs it.
    pub fn read_back(dest: Destination, artifact: &str) -> Self {
        Self {
            script: format!(
                "(function () {{\n    const msg = {READ_ARTIFACT_FN}('{}');\n    {LOGGER_BINDING}.{}(msg{});\n}})();",
                encode_inline(artifact),
                dest.method,
                dest.extra_args
            ),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.script
    }

    pub fn into_script(self) -> String {
        self.script
    }
}

impl fmt::Display for LogCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.script)
    }
}
