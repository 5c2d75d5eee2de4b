//! Explicit configuration for both stages.
//!
//! A TOML file can hold every option; the CLI layers its flags on top.
//!
//! ```toml
//! [service]
//! base_url = "http://localhost:8080"
//! api_key = "..."
//!
//! [publish]
//! turns = "data/turns_train.json"
//! title = "Asymptote Project"
//!
//! [import]
//! project_id = 12
//! turns = "data/turns_train.json"
//! training_input = "data_finetune/val_sk_01.jsonl"
//! training_output = "data_finetune/val_sk_02.jsonl"
//! export_snapshot = "data/ls_export.json"
//!
//! [import.inject.normalize]
//! fence_code = false
//! lang_hint = "asymptote"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::inject::InjectOptions;
use crate::label_config::LabelConfigOptions;

/// Default request timeout; 0 disables it.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Connection settings for the annotation service.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            base_url: "http://localhost:8080".to_string(),
            api_key: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

// The API key never reaches logs.
impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Settings for the publisher stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Flat turns file to upload.
    pub turns: PathBuf,
    pub title: String,
    pub description: String,
    /// Unescape literal `\n` / `\"` in `chat_text` before upload.
    pub normalize_chat_text: bool,
    /// Render the label config without contacting the service.
    pub dry_run: bool,
    pub label_config: LabelConfigOptions,
}

impl Default for PublishConfig {
    fn default() -> Self {
        PublishConfig {
            turns: PathBuf::from("data/turns_train.json"),
            title: "Asymptote Project".to_string(),
            description: "Cleaning Asymptote Dataset for Finetune Run".to_string(),
            normalize_chat_text: true,
            dry_run: false,
            label_config: LabelConfigOptions::default(),
        }
    }
}

/// Settings for the importer stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub project_id: u64,
    /// Flat turns file used for ordinal alignment.
    pub turns: PathBuf,
    /// Original line-delimited training file (read only).
    pub training_input: PathBuf,
    /// Corrected copy to write.
    pub training_output: PathBuf,
    /// Where to save the raw export, if anywhere.
    pub export_snapshot: Option<PathBuf>,
    /// Read the export from this file instead of the service.
    pub export_input: Option<PathBuf>,
    /// Where to write the merged flat turns, if anywhere.
    pub merged_output: Option<PathBuf>,
    /// Proceed with no edits when the export cannot be retrieved.
    pub allow_missing_export: bool,
    pub inject: InjectOptions,
}

impl Default for ImportConfig {
    fn default() -> Self {
        ImportConfig {
            project_id: 0,
            turns: PathBuf::from("data/turns_train.json"),
            training_input: PathBuf::from("data_finetune/train.jsonl"),
            training_output: PathBuf::from("data_finetune/train.corrected.jsonl"),
            export_snapshot: None,
            export_input: None,
            merged_output: None,
            allow_missing_export: false,
            inject: InjectOptions::default(),
        }
    }
}

/// Complete configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub service: ServiceConfig,
    pub publish: PublishConfig,
    pub import: ImportConfig,
}

impl BridgeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| BridgeError::io(path, e))?;
        Self::from_toml_str(&contents)
    }
}
