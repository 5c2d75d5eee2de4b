// Flat conversation turns as stored in the turns file, and the fully
// populated form produced by the merge step.
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// The per-turn fields that the merge step populates, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnField {
    User,
    ImageUrl,
    ToolId,
    ToolName,
    AssistantTool,
    Tool,
    ChatText,
    Reasoning,
}

impl TurnField {
    pub const ALL: [TurnField; 8] = [
        TurnField::User,
        TurnField::ImageUrl,
        TurnField::ToolId,
        TurnField::ToolName,
        TurnField::AssistantTool,
        TurnField::Tool,
        TurnField::ChatText,
        TurnField::Reasoning,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::ImageUrl => "image_url",
            Self::ToolId => "tool_id",
            Self::ToolName => "tool_name",
            Self::AssistantTool => "assistant_tool",
            Self::Tool => "tool",
            Self::ChatText => "chat_text",
            Self::Reasoning => "reasoning",
        }
    }
}

/// One exchange of a flattened conversation.
///
/// Every field is optional. Text fields accept any JSON scalar and keep its
/// textual form (`7` becomes `"7"`); `null` is treated as absent. Keys this
/// struct does not know about are kept in `extra` so a round trip through
/// the publisher does not drop data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    #[serde(
        default,
        deserialize_with = "lenient_ordinal",
        skip_serializing_if = "Option::is_none"
    )]
    pub turn_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<Value>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub assistant_tool: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub chat_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Turn {
    /// Original value of `field`, if present.
    pub fn field(&self, field: TurnField) -> Option<&str> {
        let value = match field {
            TurnField::User => &self.user,
            TurnField::ImageUrl => &self.image_url,
            TurnField::ToolId => &self.tool_id,
            TurnField::ToolName => &self.tool_name,
            TurnField::AssistantTool => &self.assistant_tool,
            TurnField::Tool => &self.tool,
            TurnField::ChatText => &self.chat_text,
            TurnField::Reasoning => &self.reasoning,
        };
        value.as_deref()
    }

    /// True when `field` is present and not blank.
    pub fn has(&self, field: TurnField) -> bool {
        self.field(field).is_some_and(|s| !s.trim().is_empty())
    }
}

/// Stamp `turn_id = index` on every turn. Ordinals are purely positional.
pub fn stamp_ordinals(turns: &mut [Turn]) {
    for (idx, turn) in turns.iter_mut().enumerate() {
        turn.turn_id = Some(idx as u64);
    }
}

/// Top-level flat turns document: a `turns` array plus whatever else the
/// upstream flattener wrote next to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlatTurnsFile {
    #[serde(default)]
    pub turns: Vec<Turn>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A turn with every field populated (empty string when absent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedTurn {
    pub turn_id: u64,
    pub conversation_id: Option<Value>,
    pub user: String,
    pub image_url: String,
    pub tool_id: String,
    pub tool_name: String,
    pub assistant_tool: String,
    pub tool: String,
    pub chat_text: String,
    pub reasoning: String,
}

impl MergedTurn {
    pub(crate) fn new(turn_id: u64, conversation_id: Option<Value>) -> Self {
        MergedTurn {
            turn_id,
            conversation_id,
            user: String::new(),
            image_url: String::new(),
            tool_id: String::new(),
            tool_name: String::new(),
            assistant_tool: String::new(),
            tool: String::new(),
            chat_text: String::new(),
            reasoning: String::new(),
        }
    }

    pub(crate) fn set(&mut self, field: TurnField, value: String) {
        let slot = match field {
            TurnField::User => &mut self.user,
            TurnField::ImageUrl => &mut self.image_url,
            TurnField::ToolId => &mut self.tool_id,
            TurnField::ToolName => &mut self.tool_name,
            TurnField::AssistantTool => &mut self.assistant_tool,
            TurnField::Tool => &mut self.tool,
            TurnField::ChatText => &mut self.chat_text,
            TurnField::Reasoning => &mut self.reasoning,
        };
        *slot = value;
    }
}

/// Textual form of a JSON value: strings as-is, other values as JSON text.
pub(crate) fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_text(&value))
}

// Ordinals are re-stamped positionally, so anything that is not a
// non-negative integer is simply dropped.
fn lenient_ordinal<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_u64())
}
