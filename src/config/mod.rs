//! Configuration for the relay.
//!
//! This module wires together the data models and loading/validation helpers.
//!
//! Example:
//! use logrelay::config::{Config, load_from_path};
//!
//! let cfg = load_from_path("config/relay.json")?;

pub mod loader;
pub mod models;

pub use models::{Config, KeywordEvent, OverflowConfig, RuntimeLimits, SourceConfig};

pub use loader::{
    generate_schema, load_from_path, load_from_path_async, load_from_reader, load_from_str,
    validate_config, write_schema_to_writer,
};
