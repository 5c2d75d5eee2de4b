//! Extraction of per-turn edits from annotation results.
//!
//! Annotators edit text through controls named `<prefix>_<turn>`, for example
//! `assistant_3` or `assistant_reasoning_3`. The prefix selects the turn field
//! and the numeric suffix selects the turn ordinal.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::model::export::ExportItem;
use crate::model::turn::TurnField;

struct LabelPattern {
    prefix: &'static str,
    field: TurnField,
    exact: Regex,
    loose: Regex,
}

/// Ordered so that a longer prefix is tried before any shorter prefix it
/// starts with (`assistant_reasoning` before `assistant`, `tool_name` before `tool`).
const LABEL_PREFIXES: [(&str, TurnField); 6] = [
    ("assistant_reasoning", TurnField::Reasoning),
    ("assistant_tool", TurnField::AssistantTool),
    ("assistant", TurnField::ChatText),
    ("tool_name", TurnField::ToolName),
    ("tool", TurnField::Tool),
    ("user", TurnField::User),
];

static LABEL_PATTERNS: Lazy<Vec<LabelPattern>> = Lazy::new(|| {
    LABEL_PREFIXES
        .iter()
        .map(|(prefix, field)| LabelPattern {
            prefix,
            field: *field,
            exact: Regex::new(&format!(r"{}_(\d+)$", regex::escape(prefix)))
                .expect("static label pattern"),
            loose: Regex::new(&format!(r"{}_(\d+)", regex::escape(prefix)))
                .expect("static label pattern"),
        })
        .collect()
});

/// Edits for a single turn. Only the fields an annotator can change are here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnEdits {
    pub user: Option<String>,
    pub chat_text: Option<String>,
    pub reasoning: Option<String>,
    pub tool_name: Option<String>,
    pub tool: Option<String>,
    pub assistant_tool: Option<String>,
}

impl TurnEdits {
    /// Edited value for `field`. `image_url` and `tool_id` are never edited.
    pub fn get(&self, field: TurnField) -> Option<&str> {
        let value = match field {
            TurnField::User => &self.user,
            TurnField::ChatText => &self.chat_text,
            TurnField::Reasoning => &self.reasoning,
            TurnField::ToolName => &self.tool_name,
            TurnField::Tool => &self.tool,
            TurnField::AssistantTool => &self.assistant_tool,
            TurnField::ImageUrl | TurnField::ToolId => return None,
        };
        value.as_deref()
    }

    /// Store an edit, replacing any earlier value for the same field.
    pub fn set(&mut self, field: TurnField, text: String) {
        let slot = match field {
            TurnField::User => &mut self.user,
            TurnField::ChatText => &mut self.chat_text,
            TurnField::Reasoning => &mut self.reasoning,
            TurnField::ToolName => &mut self.tool_name,
            TurnField::Tool => &mut self.tool,
            TurnField::AssistantTool => &mut self.assistant_tool,
            TurnField::ImageUrl | TurnField::ToolId => return,
        };
        *slot = Some(text);
    }

    pub fn len(&self) -> usize {
        [
            &self.user,
            &self.chat_text,
            &self.reasoning,
            &self.tool_name,
            &self.tool,
            &self.assistant_tool,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Edits keyed by turn ordinal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditRecord {
    by_turn: BTreeMap<u64, TurnEdits>,
}

impl EditRecord {
    pub fn turn(&self, turn_id: u64) -> Option<&TurnEdits> {
        self.by_turn.get(&turn_id)
    }

    pub fn get(&self, turn_id: u64, field: TurnField) -> Option<&str> {
        self.turn(turn_id).and_then(|edits| edits.get(field))
    }

    pub fn insert(&mut self, turn_id: u64, field: TurnField, text: String) {
        self.by_turn.entry(turn_id).or_default().set(field, text);
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &TurnEdits)> {
        self.by_turn.iter().map(|(k, v)| (*k, v))
    }

    /// Number of turns with at least one edit.
    pub fn turn_count(&self) -> usize {
        self.by_turn.len()
    }

    /// Total number of stored (turn, field) edits.
    pub fn applied_fields(&self) -> usize {
        self.by_turn.values().map(TurnEdits::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_turn.is_empty()
    }
}

/// Map a control name to its turn field and ordinal.
///
/// Returns `None` for names that carry no recognized prefix or no ordinal.
pub fn parse_label(from_name: &str) -> Option<(TurnField, u64)> {
    for pattern in LABEL_PATTERNS.iter() {
        if !from_name.starts_with(pattern.prefix)
            || !from_name[pattern.prefix.len()..].starts_with('_')
        {
            continue;
        }
        let caps = pattern
            .exact
            .captures(from_name)
            .or_else(|| pattern.loose.captures(from_name));
        let ordinal = caps.and_then(|c| c.get(1)).and_then(|m| m.as_str().parse().ok());
        if let Some(ordinal) = ordinal {
            return Some((pattern.field, ordinal));
        }
    }
    None
}

/// Extract the edit record from an annotation export.
///
/// Results without a control name, without text, or whose name does not
/// resolve to a turn are skipped. A later result for the same turn field
/// overwrites an earlier one.
pub fn extract_edits(items: &[ExportItem]) -> EditRecord {
    let mut record = EditRecord::default();
    for item in items {
        for annotation in &item.annotations {
            for entry in &annotation.result {
                let Some(from_name) = entry.from_name.as_deref() else {
                    continue;
                };
                let Some(text) = entry.first_text() else {
                    continue;
                };
                match parse_label(from_name) {
                    Some((field, turn_id)) => record.insert(turn_id, field, text),
                    None => debug!(from_name, "ignoring unrecognized control"),
                }
            }
        }
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::export::parse_export;
    use serde_json::json;

    fn items(results: serde_json::Value) -> Vec<ExportItem> {
        parse_export(&json!([{ "annotations": [{ "result": results }] }])).unwrap()
    }

    #[test]
    fn reasoning_prefix_wins_over_assistant() {
        for n in [0u64, 3, 17, 250] {
            assert_eq!(
                parse_label(&format!("assistant_reasoning_{n}")),
                Some((TurnField::Reasoning, n))
            );
        }
        assert_eq!(parse_label("assistant_4"), Some((TurnField::ChatText, 4)));
        assert_eq!(
            parse_label("assistant_tool_4"),
            Some((TurnField::AssistantTool, 4))
        );
    }

    #[test]
    fn tool_name_prefix_wins_over_tool() {
        assert_eq!(parse_label("tool_name_2"), Some((TurnField::ToolName, 2)));
        assert_eq!(parse_label("tool_2"), Some((TurnField::Tool, 2)));
    }

    #[test]
    fn trailing_characters_fall_back_to_loose_match() {
        assert_eq!(parse_label("user_5_v2"), Some((TurnField::User, 5)));
        assert_eq!(parse_label("assistant_12extra"), Some((TurnField::ChatText, 12)));
    }

    #[test]
    fn unrecognized_names_resolve_to_nothing() {
        assert_eq!(parse_label("image_0"), None);
        assert_eq!(parse_label("asymptote_playground_0"), None);
        assert_eq!(parse_label("user"), None);
        assert_eq!(parse_label("username_3"), None);
        assert_eq!(parse_label("assistant_x"), None);
    }

    #[test]
    fn extracts_first_text_value() {
        let record = extract_edits(&items(json!([
            {"from_name": "user_0", "value": {"text": ["Edited A", "ignored"]}},
            {"from_name": "assistant_reasoning_1", "value": {"text": ["why"]}}
        ])));
        assert_eq!(record.get(0, TurnField::User), Some("Edited A"));
        assert_eq!(record.get(1, TurnField::Reasoning), Some("why"));
        assert_eq!(record.get(1, TurnField::ChatText), None);
        assert_eq!(record.applied_fields(), 2);
    }

    #[test]
    fn skips_entries_without_text_or_name() {
        let record = extract_edits(&items(json!([
            {"from_name": "user_0", "value": {"text": []}},
            {"value": {"text": ["orphan"]}},
            {"from_name": "user_1", "value": {}},
            {"from_name": "image_2", "value": {"text": ["not a field"]}}
        ])));
        assert!(record.is_empty());
    }

    #[test]
    fn non_list_text_is_skipped_without_losing_other_edits() {
        let record = extract_edits(&items(json!([
            {"from_name": "user_0", "value": {"text": ["Edited A"]}},
            {"from_name": "assistant_0", "value": {"text": "free text"}}
        ])));
        assert_eq!(record.get(0, TurnField::User), Some("Edited A"));
        assert_eq!(record.get(0, TurnField::ChatText), None);
        assert_eq!(record.applied_fields(), 1);
    }

    #[test]
    fn later_results_overwrite_earlier_ones() {
        let raw = json!([
            {"annotations": [{"result": [{"from_name": "user_0", "value": {"text": ["first"]}}]}]},
            {"annotations": [{"result": [{"from_name": "user_0", "value": {"text": ["second"]}}]}]}
        ]);
        let record = extract_edits(&parse_export(&raw).unwrap());
        assert_eq!(record.get(0, TurnField::User), Some("second"));
        assert_eq!(record.turn_count(), 1);
    }

    #[test]
    fn non_string_text_uses_json_form() {
        let record = extract_edits(&items(json!([
            {"from_name": "tool_3", "value": {"text": [{"name": "calc"}]}}
        ])));
        assert_eq!(record.get(3, TurnField::Tool), Some(r#"{"name":"calc"}"#));
    }
}
