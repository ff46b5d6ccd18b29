use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::KeywordEvent;
use crate::relay::{LogRelay, Severity};

/// Keyword names this library answers to, in their display form.
pub const KEYWORDS: [&str; 6] = ["Trace", "Debug", "Info", "Html", "Warn", "Log"];

/// Robot-style keyword surface over a [`LogRelay`].
///
/// Names are matched ignoring case, spaces and underscores, so `Log`,
/// `log` and `L O G` are the same keyword.
#[derive(Clone)]
pub struct KeywordLibrary {
    relay: Arc<LogRelay>,
}

impl KeywordLibrary {
    pub fn new(relay: Arc<LogRelay>) -> Self {
        Self { relay }
    }

    pub fn relay(&self) -> &LogRelay {
        &self.relay
    }

    /// Handle a raw event JSON object of the form
    /// `{"keyword": "...", "args": [...]}`.
    pub fn run_event(&self, event: &Value) -> Result<()> {
        let event: KeywordEvent = serde_json::from_value(event.clone())
            .context("Event is not a keyword call ({\"keyword\": ..., \"args\": [...]})")?;
        self.run_keyword(&event.keyword, &event.args)
    }

    /// Run one keyword with positional arguments.
    pub fn run_keyword(&self, name: &str, args: &[Value]) -> Result<()> {
        let keyword = normalize(name);
        trace!(target: "logrelay::keywords", %name, args = args.len(), "Running keyword");

        let (message, level) = match keyword.as_str() {
            "log" => {
                let message = arg_string(name, args, 0)?;
                let level = match args.get(1) {
                    Some(v) => json_value_to_string(v),
                    None => Severity::Info.as_str().to_string(),
                };
                expect_at_most(name, args, 2)?;
                (message, level)
            }
            fixed => {
                let severity = fixed
                    .parse::<Severity>()
                    .map_err(|_| anyhow!("No keyword with name '{}' found", name))?;
                let message = arg_string(name, args, 0)?;
                expect_at_most(name, args, 1)?;
                (message, severity.as_str().to_string())
            }
        };

        self.relay
            .log(&message, &level)
            .with_context(|| format!("Keyword '{}' failed", name))?;
        debug!(target: "logrelay::keywords", %name, %level, "Keyword completed");
        Ok(())
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

fn arg_string(keyword: &str, args: &[Value], idx: usize) -> Result<String> {
    args.get(idx)
        .map(json_value_to_string)
        .ok_or_else(|| anyhow!("Keyword '{}' requires argument {}", keyword, idx + 1))
}

fn expect_at_most(keyword: &str, args: &[Value], max: usize) -> Result<()> {
    if args.len() > max {
        bail!(
            "Keyword '{}' expected at most {} arguments, got {}",
            keyword,
            max,
            args.len()
        );
    }
    Ok(())
}

/// Convert a JSON value to a user-friendly string:
/// - Strings are returned as-is.
/// - Numbers/bools are rendered via to_string().
/// - Arrays/objects are serialized as compact JSON.
fn json_value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
