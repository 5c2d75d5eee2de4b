//! Inject extracted edits into a copy of the line-delimited training file.
//!
//! Each training line is `{"messages": [...]}` and is aligned with the flat
//! turn at the same physical line index. Only the content of the first
//! `user` message and the first `assistant` message is ever replaced;
//! everything else, including lines that do not parse, is carried over.
//!
//! Rewritten lines use `", "` and `": "` separators, the layout earlier
//! corrected copies were written with, so old and new outputs diff cleanly.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::edits::{EditRecord, TurnEdits};
use crate::error::{BridgeError, Result};
use crate::model::turn::{stamp_ordinals, Turn};
use crate::normalize::{unescape_literals, NormalizeOptions};

/// What to do when a training line does not carry its turn's user prompt.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentPolicy {
    /// Abort before writing anything.
    #[default]
    Strict,
    /// Log the mismatch and keep going.
    Warn,
    /// Do not compare.
    Off,
}

impl AlignmentPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Warn => "warn",
            Self::Off => "off",
        }
    }
}

impl std::str::FromStr for AlignmentPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "warn" => Ok(Self::Warn),
            "off" => Ok(Self::Off),
            other => Err(format!(
                "unsupported alignment policy '{}'; supported: strict|warn|off",
                other
            )),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectOptions {
    pub normalize: NormalizeOptions,
    pub alignment: AlignmentPolicy,
}

/// Counters reported after an injection run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct InjectStats {
    /// Non-blank lines processed.
    pub total_lines: usize,
    /// Message contents replaced (at most two per line).
    pub updated_fields: usize,
    /// Lines that failed to parse and were written verbatim.
    pub malformed_lines: usize,
    /// Parsed lines without a non-empty `messages` list.
    pub passthrough_lines: usize,
    /// Lines past the end of the turn list.
    pub unaligned_lines: usize,
    /// Lines whose user prompt differed from the aligned turn (warn policy only).
    pub misaligned_lines: usize,
}

/// Read `train_path`, apply `edits` and write the result to `output_path`.
///
/// Fails with [`BridgeError::EmptyTurns`] before opening any file when
/// `turns` is empty, and with [`BridgeError::InPlaceOutput`] when both paths
/// resolve to the same file. Ordinals are stamped positionally on `turns`.
/// The output is only written once every line has been processed, so a
/// strict alignment failure leaves no partial file behind.
pub fn inject_edits(
    train_path: &Path,
    output_path: &Path,
    turns: &mut [Turn],
    edits: &EditRecord,
    options: &InjectOptions,
) -> Result<InjectStats> {
    if turns.is_empty() {
        return Err(BridgeError::EmptyTurns);
    }
    stamp_ordinals(turns);

    let input = File::open(train_path).map_err(|e| BridgeError::io(train_path, e))?;
    if same_file(train_path, output_path) {
        return Err(BridgeError::InPlaceOutput {
            path: output_path.to_path_buf(),
        });
    }
    let (lines, stats) = inject_into_lines(BufReader::new(input), turns, edits, options)
        .map_err(|e| match e {
            BridgeError::Io { source, .. } => BridgeError::io(train_path, source),
            other => other,
        })?;

    let output = File::create(output_path).map_err(|e| BridgeError::io(output_path, e))?;
    let mut writer = BufWriter::new(output);
    write_lines(&mut writer, &lines).map_err(|e| BridgeError::io(output_path, e))?;

    info!(
        updated_fields = stats.updated_fields,
        total_lines = stats.total_lines,
        output = %output_path.display(),
        "injected edits into {} fields across {} lines",
        stats.updated_fields,
        stats.total_lines
    );
    Ok(stats)
}

/// Reader/writer form of [`inject_edits`]. `turns` must already carry ordinals.
pub fn inject_lines<R: BufRead, W: Write>(
    reader: R,
    writer: &mut W,
    turns: &[Turn],
    edits: &EditRecord,
    options: &InjectOptions,
) -> Result<InjectStats> {
    if turns.is_empty() {
        return Err(BridgeError::EmptyTurns);
    }
    let (lines, stats) = inject_into_lines(reader, turns, edits, options)?;
    write_lines(writer, &lines).map_err(|e| BridgeError::io("<writer>", e))?;
    Ok(stats)
}

// An output that does not exist yet cannot be the (existing) input.
fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// `", "` between items and `": "` after keys, otherwise compact.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + Write>(
        &mut self,
        writer: &mut W,
    ) -> io::Result<()> {
        writer.write_all(b": ")
    }
}

/// Serialize one training line.
pub fn training_line(value: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    value.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn write_lines<W: Write>(writer: &mut W, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()
}

fn inject_into_lines<R: BufRead>(
    reader: R,
    turns: &[Turn],
    edits: &EditRecord,
    options: &InjectOptions,
) -> Result<(Vec<String>, InjectStats)> {
    let mut stats = InjectStats::default();
    let mut out = Vec::new();

    // The index is the physical line number, blank lines included.
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| BridgeError::io("<reader>", e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.total_lines += 1;

        let mut obj: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(err) => {
                debug!(line = idx + 1, %err, "keeping malformed line verbatim");
                stats.malformed_lines += 1;
                out.push(line.to_string());
                continue;
            }
        };

        let has_messages = obj
            .get("messages")
            .and_then(Value::as_array)
            .is_some_and(|msgs| !msgs.is_empty());
        if !has_messages {
            stats.passthrough_lines += 1;
            out.push(training_line(&obj)?);
            continue;
        }

        let Some(turn) = turns.get(idx) else {
            stats.unaligned_lines += 1;
            out.push(training_line(&obj)?);
            continue;
        };
        let turn_id = turn.turn_id.unwrap_or(idx as u64);

        if options.alignment != AlignmentPolicy::Off && !is_aligned(turn, &obj) {
            if options.alignment == AlignmentPolicy::Strict {
                return Err(BridgeError::Misaligned {
                    line: idx + 1,
                    turn_id,
                });
            }
            warn!(line = idx + 1, turn_id, "training line user prompt differs from flat turn");
            stats.misaligned_lines += 1;
        }

        if let Some(turn_edits) = edits.turn(turn_id) {
            stats.updated_fields += apply_edits(&mut obj, turn_edits, &options.normalize);
        }
        out.push(training_line(&obj)?);
    }

    if stats.unaligned_lines > 0 {
        warn!(
            lines = stats.unaligned_lines,
            turns = turns.len(),
            "training file has more lines than flat turns; extra lines copied unedited"
        );
    }
    Ok((out, stats))
}

fn first_with_role<'a>(messages: &'a mut [Value], role: &str) -> Option<&'a mut Value> {
    messages
        .iter_mut()
        .find(|m| m.get("role").and_then(Value::as_str) == Some(role))
}

/// Apply the user and assistant edits of one turn. Returns the number of
/// message contents replaced.
fn apply_edits(obj: &mut Value, edits: &TurnEdits, normalize: &NormalizeOptions) -> usize {
    let Some(messages) = obj.get_mut("messages").and_then(Value::as_array_mut) else {
        return 0;
    };
    let mut applied = 0;

    if let Some(text) = edits.user.as_deref() {
        if let Some(msg) = first_with_role(messages, "user") {
            msg["content"] = Value::String(normalize.user_text(text));
            applied += 1;
        }
    }
    if let Some(text) = edits.chat_text.as_deref() {
        if let Some(msg) = first_with_role(messages, "assistant") {
            msg["content"] = Value::String(normalize.assistant_text(text));
            applied += 1;
        }
    }
    applied
}

/// A line is aligned unless both the turn and the line carry a user prompt
/// and the two differ. Content that is not a plain string cannot be compared.
fn is_aligned(turn: &Turn, obj: &Value) -> bool {
    let Some(expected) = turn.user.as_deref() else {
        return true;
    };
    let found = obj
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|msgs| {
            msgs.iter()
                .find(|m| m.get("role").and_then(Value::as_str) == Some("user"))
        })
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str);
    match found {
        Some(found) => unescape_literals(expected).trim() == unescape_literals(found).trim(),
        None => true,
    }
}
