#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

/*!
Keyword surface for the relay.

This is the caller side of the relay: test keywords arrive by name with
positional arguments (directly or as JSON events from a source) and are
forwarded to [`crate::relay::LogRelay`].

Typical usage:
```no_run
use std::sync::Arc;
use logrelay::keywords::KeywordLibrary;
use logrelay::relay::{LogRelay, TracingLogger};
use serde_json::json;

let relay = LogRelay::new(Arc::new(TracingLogger));
let library = KeywordLibrary::new(Arc::new(relay));
library.run_event(&json!({"keyword": "Log", "args": ["Hello", "WARN"]}))?;
# Ok::<(), anyhow::Error>(())
```
*/

pub mod library;

pub use library::{KEYWORDS, KeywordLibrary};
