//! Edit importer: project export -> corrected training file.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::client::{fetch_export, AnnotationService};
use crate::config::ImportConfig;
use crate::edits::extract_edits;
use crate::error::{BridgeError, Result};
use crate::inject::{inject_edits, InjectStats};
use crate::merge::merge_turns;
use crate::model::export::parse_export;
use crate::model::turn::MergedTurn;
use crate::{load_flat_turns, read_json, write_json_pretty};

/// Outcome of an import run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    /// False when the export was unavailable and the run continued without edits.
    pub export_available: bool,
    pub export_items: usize,
    pub edited_turns: usize,
    pub edited_fields: usize,
    pub merged_turns: Vec<MergedTurn>,
    pub inject: InjectStats,
}

fn obtain_export<S: AnnotationService + ?Sized>(
    service: &S,
    config: &ImportConfig,
) -> Result<Option<Value>> {
    if let Some(path) = config.export_input.as_deref() {
        info!(path = %path.display(), "reading export from file");
        return Ok(Some(read_json(path)?));
    }

    let project = service.get_project(config.project_id)?;
    info!(
        project_id = project.id,
        title = project.title.as_deref().unwrap_or(""),
        "fetching export"
    );
    Ok(fetch_export(service, config.project_id))
}

/// Run the importer described by `config`.
///
/// The flat turns file is checked first; an empty turn list aborts before
/// the service is contacted.
///
/// A missing export is an error unless `allow_missing_export` is set, in
/// which case the training file is copied with no edits applied.
pub fn import_edits<S: AnnotationService + ?Sized>(
    service: &S,
    config: &ImportConfig,
) -> Result<ImportReport> {
    let mut flat = load_flat_turns(&config.turns)?;
    if flat.turns.is_empty() {
        return Err(BridgeError::EmptyTurns);
    }

    let raw = obtain_export(service, config)?;
    let export_available = raw.is_some();
    let raw = match raw {
        Some(raw) => raw,
        None if config.allow_missing_export => {
            warn!(
                project_id = config.project_id,
                "no export available; continuing with no edits"
            );
            Value::Null
        }
        None => {
            return Err(BridgeError::ExportUnavailable {
                project_id: config.project_id,
            })
        }
    };

    if let Some(path) = config.export_snapshot.as_deref() {
        write_json_pretty(path, &raw)?;
        info!(path = %path.display(), "raw export saved");
    }

    let items = parse_export(&raw)?;
    let edits = extract_edits(&items);
    info!(
        items = items.len(),
        turns = edits.turn_count(),
        fields = edits.applied_fields(),
        "edits extracted"
    );

    let merged_turns = merge_turns(&mut flat.turns, &edits);
    if let Some(path) = config.merged_output.as_deref() {
        write_json_pretty(path, &json!({ "turns": merged_turns }))?;
        info!(path = %path.display(), turns = merged_turns.len(), "merged turns written");
    }

    let inject = inject_edits(
        &config.training_input,
        &config.training_output,
        &mut flat.turns,
        &edits,
        &config.inject,
    )?;

    Ok(ImportReport {
        export_available,
        export_items: items.len(),
        edited_turns: edits.turn_count(),
        edited_fields: edits.applied_fields(),
        merged_turns,
        inject,
    })
}
