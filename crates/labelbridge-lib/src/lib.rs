//! Library entry point for labelbridge.
//!
//! Two stages sit on top of a Label Studio compatible annotation service:
//!
//! - [`publish`] turns a flat list of conversation turns into a labeling
//!   project: one task holding the whole document plus a generated UI config.
//! - [`import`] pulls the project export back, extracts per-turn edits from
//!   the annotation results and writes a corrected copy of the line-delimited
//!   training file.
//!
//! The pure pieces ([`edits`], [`merge`], [`normalize`], [`inject`],
//! [`label_config`]) do not touch the network and are usable on their own.
//
// Public modules
pub mod client;
pub mod config;
pub mod edits;
pub mod error;
pub mod import;
pub mod inject;
pub mod label_config;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod publish;

// Re‑export primary types for ergonomic use.
pub use client::{fetch_export, AnnotationService, LabelStudioClient};
pub use config::{BridgeConfig, ImportConfig, PublishConfig, ServiceConfig};
pub use edits::{extract_edits, EditRecord, TurnEdits};
pub use error::{BridgeError, Result};
pub use inject::{inject_edits, AlignmentPolicy, InjectStats};
pub use merge::{merge_export, merge_turns};
pub use model::{
    export::{parse_export, ExportItem},
    turn::{FlatTurnsFile, MergedTurn, Turn, TurnField},
};
pub use normalize::{normalize_for_markdown, NormalizeOptions};

use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Read a JSON document from `path`.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| BridgeError::io(path, e))?;
    let value = serde_json::from_reader(BufReader::new(file))?;
    Ok(value)
}

/// Write `value` to `path` as pretty-printed JSON.
pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| BridgeError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|e| BridgeError::io(path, e))?;
    Ok(())
}

/// Load a flat turns file (`{"turns": [...]}`).
///
/// A missing `turns` key yields an empty list; callers decide whether that is fatal.
pub fn load_flat_turns(path: &Path) -> Result<FlatTurnsFile> {
    read_json(path)
}
