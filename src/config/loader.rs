use anyhow::{Context, Result, bail, ensure};
use schemars::{Schema, schema_for};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

use super::models::{Config, SourceConfig};

/// Load configuration from a string slice.
pub fn load_from_str(s: &str) -> Result<Config> {
    let cfg: Config =
        serde_json::from_str(s).context("Failed to parse JSON config string into Config")?;
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Load configuration from any reader (e.g., a file).
pub fn load_from_reader<R: Read>(reader: R) -> Result<Config> {
    let cfg: Config =
        serde_json::from_reader(reader).context("Failed to parse JSON config from reader")?;
    validate_config(&cfg)?;
    Ok(cfg)
}

/// Load configuration from a file path synchronously.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open config file {}", path_ref.display()))?;
    let cfg = load_from_reader(file)?;
    debug!("Loaded config from {}", path_ref.display());
    Ok(cfg)
}

/// Load configuration from a file path asynchronously (Tokio).
pub async fn load_from_path_async<P: AsRef<Path>>(path: P) -> Result<Config> {
    use tokio::fs;
    let path_ref = path.as_ref();
    let bytes = fs::read(path_ref)
        .await
        .with_context(|| format!("Failed to read config file {}", path_ref.display()))?;
    let cfg: Config = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse JSON config from {}", path_ref.display()))?;
    validate_config(&cfg)?;
    debug!("Loaded config from {}", path_ref.display());
    Ok(cfg)
}

/// Generate the JSON Schema for the Config model.
pub fn generate_schema() -> Schema {
    schema_for!(Config)
}

/// Write the JSON Schema for the Config model to any writer (pretty-printed).
pub fn write_schema_to_writer<W: Write>(mut writer: W) -> Result<()> {
    let schema = generate_schema();
    let json = serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?;
    writer
        .write_all(json.as_bytes())
        .context("Failed to write schema to writer")?;
    Ok(())
}

/// Largest accepted `runtime.memory_limit_mb` (1 TiB).
pub const MAX_MEMORY_LIMIT_MB: usize = 1 << 20;

/// Largest accepted `runtime.max_stack_size_kb` (1 GiB).
pub const MAX_STACK_SIZE_KB: usize = 1 << 20;

/// Sanity checks that serde cannot express.
/// - The artifact prefix must be a plain file name fragment.
/// - Runtime limits must be non-zero and within [`MAX_MEMORY_LIMIT_MB`] /
///   [`MAX_STACK_SIZE_KB`].
/// - File sources need a path.
pub fn validate_config(cfg: &Config) -> Result<()> {
    let prefix = &cfg.overflow.prefix;
    ensure!(!prefix.is_empty(), "overflow.prefix must not be empty");
    if prefix.contains(['/', '\\']) {
        bail!("overflow.prefix '{}' must not contain path separators", prefix);
    }

    if let Some(mb) = cfg.runtime.memory_limit_mb {
        ensure!(mb > 0, "runtime.memory_limit_mb must be greater than zero");
        ensure!(
            mb <= MAX_MEMORY_LIMIT_MB,
            "runtime.memory_limit_mb {} exceeds {}",
            mb,
            MAX_MEMORY_LIMIT_MB
        );
    }
    let kb = cfg.runtime.max_stack_size_kb;
    ensure!(kb > 0, "runtime.max_stack_size_kb must be greater than zero");
    ensure!(
        kb <= MAX_STACK_SIZE_KB,
        "runtime.max_stack_size_kb {} exceeds {}",
        kb,
        MAX_STACK_SIZE_KB
    );

    for (idx, source) in cfg.sources.iter().enumerate() {
        if let SourceConfig::File { path, .. } = source
            && path.trim().is_empty()
        {
            bail!("File source at index {} has an empty path", idx);
        }
    }

    Ok(())
}
