use anyhow::{Context, Result, anyhow, bail};
use schemars::{Schema, schema_for};
use serde_valid::Validate;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

use super::models::{RandomizerConfig, SequenceDef};

/// Which JSON schema to generate.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchemaKind {
    Config,
    Sequence,
}

/// Load configuration from a string slice.
pub fn load_from_str(s: &str) -> Result<RandomizerConfig> {
    let cfg: RandomizerConfig =
        serde_json::from_str(s).context("Failed to parse JSON config string into RandomizerConfig")?;
    validate_config(cfg)
}

/// Load configuration from any reader (e.g., a file).
pub fn load_from_reader<R: Read>(reader: R) -> Result<RandomizerConfig> {
    let cfg: RandomizerConfig =
        serde_json::from_reader(reader).context("Failed to parse JSON config from reader")?;
    validate_config(cfg)
}

/// Load configuration from a file path synchronously.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<RandomizerConfig> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open config file {}", path_ref.display()))?;
    let cfg = load_from_reader(file)?;
    debug!(target: "randomizer::config", "Loaded config from {}", path_ref.display());
    Ok(cfg)
}

/// Load configuration from a file path asynchronously (Tokio).
pub async fn load_from_path_async<P: AsRef<Path>>(path: P) -> Result<RandomizerConfig> {
    use tokio::fs;
    let path_ref = path.as_ref();
    let bytes = fs::read(path_ref)
        .await
        .with_context(|| format!("Failed to read config file {}", path_ref.display()))?;
    let cfg: RandomizerConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse JSON config from {}", path_ref.display()))?;
    let cfg = validate_config(cfg)?;
    debug!(target: "randomizer::config", "Loaded config from {}", path_ref.display());
    Ok(cfg)
}

/// Generate the JSON Schema for the config model.
pub fn generate_schema() -> Schema {
    schema_for!(RandomizerConfig)
}

/// Generate the JSON Schema for one persisted sequence file.
pub fn generate_sequence_schema() -> Schema {
    schema_for!(SequenceDef)
}

/// Write a JSON Schema to any writer (pretty-printed).
pub fn write_schema_to_writer<W: Write>(kind: SchemaKind, mut writer: W) -> Result<()> {
    let schema = match kind {
        SchemaKind::Config => generate_schema(),
        SchemaKind::Sequence => generate_sequence_schema(),
    };
    let json = serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?;
    writer
        .write_all(json.as_bytes())
        .context("Failed to write schema to writer")?;
    Ok(())
}

/// Check field constraints and fix what can be fixed.
///
/// - `serde_valid` rules (positive intervals and steps, non-empty names) are hard errors.
/// - Keybind names must be unique.
/// - `max_wait_ms < min_wait_ms` is clamped, never rejected.
pub fn validate_config(mut cfg: RandomizerConfig) -> Result<RandomizerConfig> {
    cfg.validate()
        .map_err(|e| anyhow!("Invalid configuration: {e}"))?;

    let mut names = BTreeSet::new();
    for bind in &cfg.keybinds {
        if !names.insert(bind.name.as_str()) {
            bail!("Keybind name '{}' is used more than once", bind.name);
        }
    }

    if cfg.max_wait_ms < cfg.min_wait_ms {
        warn!(
            target: "randomizer::config",
            min_wait_ms = cfg.min_wait_ms,
            max_wait_ms = cfg.max_wait_ms,
            "max_wait_ms is below min_wait_ms; clamping"
        );
        cfg.max_wait_ms = cfg.min_wait_ms;
    }

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let cfg = load_from_str("{}").unwrap();
        assert_eq!(cfg, RandomizerConfig::default());
        assert_eq!(cfg.interrupt_check_interval_ms, 50);
        assert_eq!(cfg.target_window_title, "Counter-Strike 2");
    }

    #[test]
    fn wait_window_is_clamped() {
        let cfg = load_from_str(r#"{ "min_wait_ms": 5000, "max_wait_ms": 1000 }"#).unwrap();
        assert_eq!(cfg.max_wait_ms, 5000);
    }

    #[test]
    fn rejects_zero_check_interval_and_duplicate_binds() {
        assert!(load_from_str(r#"{ "interrupt_check_interval_ms": 0 }"#).is_err());
        let dup = r#"{ "keybinds": [
            { "name": "Jump", "key": "SPACE" },
            { "name": "Jump", "key": "W" }
        ] }"#;
        assert!(load_from_str(dup).is_err());
    }

    #[test]
    fn rejects_oversized_pointer_moves() {
        assert!(load_from_str(r#"{ "max_mouse_move_distance": 4294967295 }"#).is_err());
        assert!(load_from_str(r#"{ "max_mouse_move_distance": 100000 }"#).is_ok());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "check_for_focus": true, "keybinds": [{{ "name": "Jump", "key": "SPACE" }}] }}"#).unwrap();
        let cfg = load_from_path(file.path()).unwrap();
        assert!(cfg.check_for_focus);
        assert_eq!(cfg.keybinds.len(), 1);
    }

    #[test]
    fn schemas_serialize() {
        let mut out = Vec::new();
        write_schema_to_writer(SchemaKind::Sequence, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("mouse_move"));
    }
}
