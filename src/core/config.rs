//! Gatehouse configuration.
//!
//! Loaded from `.orchestration/gatehouse.toml` when present. Every field has a
//! default, so a workspace without the file behaves exactly like one with an
//! empty file.

use crate::core::error::GatehouseError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const ORCHESTRATION_DIR: &str = ".orchestration";
pub const CONFIG_FILE_NAME: &str = "gatehouse.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatehouseConfig {
    pub layout: LayoutConfig,
    pub gate: GateConfig,
    pub trace: TraceConfig,
}

/// Workspace-relative locations of everything gatehouse reads or writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub intents_file: String,
    pub staging_dir: String,
    pub manifest_file: String,
    pub traces_dir: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            intents_file: ".orchestration/active_intents.yaml".to_string(),
            staging_dir: ".orchestration/staged_changes".to_string(),
            manifest_file: ".orchestration/staged_manifest.json".to_string(),
            traces_dir: ".orchestration/intents_traces".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// Token prefix that marks an intent id inside free-text prompts.
    pub intent_prefix: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            intent_prefix: "INT-".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceConfig {
    pub redact_secrets: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            redact_secrets: true,
        }
    }
}

/// Load config from `<workspace>/.orchestration/gatehouse.toml`.
/// No config file means defaults (not an error).
pub fn load_config(workspace_root: &Path) -> Result<GatehouseConfig, GatehouseError> {
    let path = workspace_root
        .join(ORCHESTRATION_DIR)
        .join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(GatehouseConfig::default());
    }
    let content = fs::read_to_string(&path)?;
    let config: GatehouseConfig = toml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &GatehouseConfig) -> Result<(), GatehouseError> {
    let layout = &config.layout;
    for (key, value) in [
        ("layout.intents_file", &layout.intents_file),
        ("layout.staging_dir", &layout.staging_dir),
        ("layout.manifest_file", &layout.manifest_file),
        ("layout.traces_dir", &layout.traces_dir),
    ] {
        if value.trim().is_empty() {
            return Err(GatehouseError::ValidationError(format!(
                "{} must not be empty",
                key
            )));
        }
        if Path::new(value).is_absolute() {
            return Err(GatehouseError::ValidationError(format!(
                "{} must be workspace-relative, got {}",
                key, value
            )));
        }
    }

    if config.gate.intent_prefix.trim().is_empty() {
        return Err(GatehouseError::ValidationError(
            "gate.intent_prefix must not be empty".to_string(),
        ));
    }

    Ok(())
}
