//! Dataset publisher: flat turns file -> labeling project.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::client::AnnotationService;
use crate::config::PublishConfig;
use crate::error::{BridgeError, Result};
use crate::label_config::{render_label_config, LabelConfigOptions};
use crate::model::turn::FlatTurnsFile;
use crate::normalize::unescape_literals;
use crate::{load_flat_turns, read_json};

/// Outcome of a publish run.
#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    /// `None` for a dry run.
    pub project_id: Option<u64>,
    pub title: String,
    pub turn_count: usize,
    pub label_config: String,
}

/// Prepare the raw document for upload.
///
/// Every turn object gets a `chat_text` (empty when missing or `null`), since
/// the labeling UI binds to it. With `unescape`, string values have their
/// literal escape sequences converted. Nothing else in the document changes.
pub fn normalize_chat_text(document: &mut Value, unescape: bool) {
    let Some(turns) = document.get_mut("turns").and_then(Value::as_array_mut) else {
        return;
    };
    for turn in turns.iter_mut().filter_map(Value::as_object_mut) {
        let slot = turn.entry("chat_text").or_insert(Value::Null);
        if slot.is_null() {
            *slot = Value::String(String::new());
        } else if let Some(text) = slot.as_str().filter(|_| unescape) {
            *slot = Value::String(unescape_literals(text));
        }
    }
}

/// Load a flat turns file and render its labeling interface.
pub fn render_label_config_for(path: &Path, options: &LabelConfigOptions) -> Result<String> {
    let file = load_flat_turns(path)?;
    Ok(render_label_config(&file.turns, options))
}

/// Publish the flat turns file described by `config`.
///
/// Steps, in order: create the project, import the whole document as a
/// single task, then attach the generated label config. With `dry_run` only
/// the label config is produced.
///
/// The task carries the document as loaded, touched only by
/// [`normalize_chat_text`]; the typed turns drive the label config.
pub fn publish_dataset<S: AnnotationService + ?Sized>(
    service: &S,
    config: &PublishConfig,
) -> Result<PublishReport> {
    let mut document: Value = read_json(&config.turns)?;
    let file = FlatTurnsFile::deserialize(&document)?;
    if file.turns.is_empty() {
        return Err(BridgeError::EmptyTurns);
    }
    normalize_chat_text(&mut document, config.normalize_chat_text);

    let label_config = render_label_config(&file.turns, &config.label_config);
    let turn_count = file.turns.len();

    if config.dry_run {
        info!(turns = turn_count, "dry run: label config rendered, nothing published");
        return Ok(PublishReport {
            project_id: None,
            title: config.title.clone(),
            turn_count,
            label_config,
        });
    }

    let project = service.create_project(&config.title, &config.description)?;
    info!(
        project_id = project.id,
        "project '{}' created",
        project.title.as_deref().unwrap_or(&config.title)
    );

    service.create_task(project.id, &document)?;
    info!(project_id = project.id, turns = turn_count, "task imported");

    service.update_label_config(project.id, &label_config)?;
    info!(project_id = project.id, "label config updated");

    Ok(PublishReport {
        project_id: Some(project.id),
        title: project.title.unwrap_or_else(|| config.title.clone()),
        turn_count,
        label_config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_chat_text_is_rewritten() {
        let mut doc = json!({
            "name": "set",
            "turns": [
                {"turn_id": "t-0", "user": "A", "tool_id": 7, "image_url": null,
                 "chat_text": "a\\nb"},
                {"user": "B", "chat_text": null},
                {"user": "C"},
                {"chat_text": 3}
            ]
        });
        normalize_chat_text(&mut doc, true);
        assert_eq!(
            doc,
            json!({
                "name": "set",
                "turns": [
                    {"turn_id": "t-0", "user": "A", "tool_id": 7, "image_url": null,
                     "chat_text": "a\nb"},
                    {"user": "B", "chat_text": ""},
                    {"user": "C", "chat_text": ""},
                    {"chat_text": 3}
                ]
            })
        );
    }

    #[test]
    fn missing_chat_text_is_filled_even_without_unescaping() {
        let mut doc = json!({"turns": [{"user": "A"}, {"chat_text": "x\\ty"}]});
        normalize_chat_text(&mut doc, false);
        assert_eq!(doc["turns"][0]["chat_text"], "");
        assert_eq!(doc["turns"][1]["chat_text"], "x\\ty");
    }
}
