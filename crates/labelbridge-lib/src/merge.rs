//! Overlay extracted edits onto the flat turn list.

use crate::edits::{extract_edits, EditRecord};
use crate::model::export::ExportItem;
use crate::model::turn::{stamp_ordinals, MergedTurn, Turn, TurnField};

/// Produce a fully populated copy of `turns` with `edits` applied.
///
/// Ordinals are stamped positionally on the input turns (the only change made
/// to them). Each field takes the edited value when one exists, then the
/// original value, then the empty string.
pub fn merge_turns(turns: &mut [Turn], edits: &EditRecord) -> Vec<MergedTurn> {
    stamp_ordinals(turns);

    turns
        .iter()
        .enumerate()
        .map(|(idx, turn)| {
            let turn_id = idx as u64;
            let mut merged = MergedTurn::new(turn_id, turn.conversation_id.clone());
            for field in TurnField::ALL {
                let value = edits
                    .get(turn_id, field)
                    .or_else(|| turn.field(field))
                    .unwrap_or_default();
                merged.set(field, value.to_string());
            }
            merged
        })
        .collect()
}

/// Extract edits from `items` and merge them onto `turns`.
pub fn merge_export(turns: &mut [Turn], items: &[ExportItem]) -> Vec<MergedTurn> {
    let edits = extract_edits(items);
    merge_turns(turns, &edits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::export::parse_export;
    use serde_json::json;

    fn turns(value: serde_json::Value) -> Vec<Turn> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn user_edit_applies_to_its_ordinal_only() {
        let mut flat = turns(json!([{"user": "A"}, {"user": "B"}]));
        let export = parse_export(&json!([{
            "annotations": [{"result": [{"from_name": "user_0", "value": {"text": ["Edited A"]}}]}]
        }]))
        .unwrap();

        let merged = merge_export(&mut flat, &export);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].turn_id, 0);
        assert_eq!(merged[0].user, "Edited A");
        assert_eq!(merged[1].turn_id, 1);
        assert_eq!(merged[1].user, "B");
        assert_eq!(merged[1].chat_text, "");
        assert_eq!(merged[0].conversation_id, None);
    }

    #[test]
    fn merge_without_edits_reproduces_originals() {
        let mut flat = turns(json!([
            {"turn_id": 9, "conversation_id": "c1", "user": "q", "image_url": "img.png",
             "chat_text": "draw(...);", "reasoning": "because"},
            {"conversation_id": 2, "user": "q2", "tool_name": "calc", "tool": "{}",
             "tool_id": "t1", "assistant_tool": "call"}
        ]));
        let merged = merge_turns(&mut flat, &EditRecord::default());

        assert_eq!(flat[0].turn_id, Some(0));
        assert_eq!(flat[1].turn_id, Some(1));
        for (turn, m) in flat.iter().zip(&merged) {
            assert_eq!(Some(m.turn_id), turn.turn_id);
            assert_eq!(m.conversation_id, turn.conversation_id);
            for field in TurnField::ALL {
                let original = turn.field(field).unwrap_or_default();
                let merged_value = match field {
                    TurnField::User => &m.user,
                    TurnField::ImageUrl => &m.image_url,
                    TurnField::ToolId => &m.tool_id,
                    TurnField::ToolName => &m.tool_name,
                    TurnField::AssistantTool => &m.assistant_tool,
                    TurnField::Tool => &m.tool,
                    TurnField::ChatText => &m.chat_text,
                    TurnField::Reasoning => &m.reasoning,
                };
                assert_eq!(merged_value, original, "field {}", field.as_str());
            }
        }
    }

    #[test]
    fn edits_beyond_turn_list_are_ignored() {
        let mut flat = turns(json!([{"user": "only"}]));
        let mut edits = EditRecord::default();
        edits.insert(5, TurnField::User, "stray".to_string());
        edits.insert(0, TurnField::Reasoning, "added".to_string());

        let merged = merge_turns(&mut flat, &edits);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].user, "only");
        assert_eq!(merged[0].reasoning, "added");
    }

    #[test]
    fn merged_turn_serializes_every_field() {
        let mut flat = turns(json!([{"user": "A"}]));
        let merged = merge_turns(&mut flat, &EditRecord::default());
        let value = serde_json::to_value(&merged[0]).unwrap();
        assert_eq!(
            value,
            json!({
                "turn_id": 0, "conversation_id": null, "user": "A", "image_url": "",
                "tool_id": "", "tool_name": "", "assistant_tool": "", "tool": "",
                "chat_text": "", "reasoning": ""
            })
        );
    }
}
