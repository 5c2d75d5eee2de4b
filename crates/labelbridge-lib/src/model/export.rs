// Shape of a Label Studio JSON export. Only the parts the importer reads are
// modelled. Every key defaults, and a key holding an unexpected type reads as
// absent, so one odd entry never sinks the rest of the export.
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use super::turn::value_text;
use crate::error::Result;

/// One exported task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportItem {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<u64>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub annotations: Vec<Annotation>,
}

/// One annotator submission on a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default, deserialize_with = "lenient_list")]
    pub result: Vec<ResultEntry>,
}

/// A single control result, e.g. the text typed into `TextArea name="user_3"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultEntry {
    #[serde(default, deserialize_with = "lenient_name")]
    pub from_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_or_default")]
    pub value: ResultValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultValue {
    #[serde(default, deserialize_with = "lenient_list")]
    pub text: Vec<Value>,
}

impl ResultEntry {
    /// First text value, as text. `None` when the entry carries no text.
    pub fn first_text(&self) -> Option<String> {
        self.value.text.first().and_then(value_text)
    }
}

fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_u64())
}

fn lenient_name<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Value::deserialize(deserializer)?.as_str().map(str::to_string))
}

// Keeps the elements that deserialize; anything but an array is empty.
fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}

fn lenient_or_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Interpret a raw export document. `null` (nothing exported) is an empty
/// list; any other non-array document is an error. Items that are not
/// objects are skipped.
pub fn parse_export(raw: &Value) -> Result<Vec<ExportItem>> {
    match raw {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items
            .iter()
            .filter_map(|item| match ExportItem::deserialize(item) {
                Ok(item) => Some(item),
                Err(err) => {
                    debug!(%err, "skipping export item");
                    None
                }
            })
            .collect()),
        other => Ok(Vec::<ExportItem>::deserialize(other)?),
    }
}
