use std::fmt;
use std::str::FromStr;

use super::error::RelayError;

/// Severity a keyword caller may request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Html,
    Warn,
}

/// The logger method a severity is delivered to, plus any trailing arguments
/// appended verbatim after the message in the generated command.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Destination {
    pub method: &'static str,
    pub extra_args: &'static str,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Trace,
        Severity::Debug,
        Severity::Info,
        Severity::Html,
        Severity::Warn,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Html => "html",
            Severity::Warn => "warn",
        }
    }

    /// Html reuses `info` and flags the payload as markup that must not be escaped.
    pub const fn destination(self) -> Destination {
        match self {
            Severity::Trace => Destination {
                method: "trace",
                extra_args: "",
            },
            Severity::Debug => Destination {
                method: "debug",
                extra_args: "",
            },
            Severity::Info => Destination {
                method: "info",
                extra_args: "",
            },
            Severity::Html => Destination {
                method: "info",
                extra_args: ", true, false",
            },
            Severity::Warn => Destination {
                method: "warn",
                extra_args: "",
            },
        }
    }
}

impl FromStr for Severity {
    type Err = RelayError;

    fn from_str(level: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(level))
            .ok_or_else(|| RelayError::InvalidSeverity {
                level: level.to_string(),
            })
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve a caller-supplied level name (any case) to its destination.
pub fn resolve(level: &str) -> Result<Destination, RelayError> {
    level.parse::<Severity>().map(Severity::destination)
}
