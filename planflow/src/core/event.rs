//! Typed view of a single agent output record.
//!
//! Agents emit one JSON object per line, minimally shaped as
//! `{"type": <kind>, "part": {...}}`. Recognized kinds get their own variant
//! with the fields the workflow reads; every other kind lands in
//! [`Event::Unknown`]. All variants keep the original object so the event log
//! can be replayed byte-for-byte in spirit (same keys, same values).

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const KIND_TEXT: &str = "text";
pub const KIND_STEP_FINISH: &str = "step_finish";
pub const KIND_TOOL_CALL: &str = "tool_call";
pub const KIND_TOOL_RESULT: &str = "tool_result";

/// Token counters keyed by name. Nested counter maps are flattened with dots
/// (`{"cache": {"read": 3}}` becomes `cache.read = 3`).
pub type TokenCounts = BTreeMap<String, u64>;

/// One decoded line of agent output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Event {
    Text {
        text: String,
        raw: Map<String, Value>,
    },
    StepFinish {
        tokens: TokenCounts,
        raw: Map<String, Value>,
    },
    ToolCall {
        tool_name: String,
        raw: Map<String, Value>,
    },
    ToolResult {
        raw: Map<String, Value>,
    },
    /// Any kind this crate does not interpret, including records without a
    /// `type` tag (`kind == ""`).
    Unknown {
        kind: String,
        raw: Map<String, Value>,
    },
}

impl Event {
    /// Build an event from a decoded JSON object. Never fails: absent or
    /// mistyped nested fields fall back to empty defaults.
    pub fn from_object(raw: Map<String, Value>) -> Self {
        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let part = raw.get("part").and_then(Value::as_object);

        match kind.as_str() {
            KIND_TEXT => Event::Text {
                text: part
                    .and_then(|p| p.get("text"))
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                raw,
            },
            KIND_STEP_FINISH => Event::StepFinish {
                tokens: part
                    .and_then(|p| p.get("tokens"))
                    .map(flatten_counters)
                    .unwrap_or_default(),
                raw,
            },
            KIND_TOOL_CALL => Event::ToolCall {
                tool_name: part.map(tool_name).unwrap_or_default(),
                raw,
            },
            KIND_TOOL_RESULT => Event::ToolResult { raw },
            _ => Event::Unknown { kind, raw },
        }
    }

    /// The `type` tag as it appeared on the wire (`""` when absent).
    pub fn kind(&self) -> &str {
        match self {
            Event::Text { .. } => KIND_TEXT,
            Event::StepFinish { .. } => KIND_STEP_FINISH,
            Event::ToolCall { .. } => KIND_TOOL_CALL,
            Event::ToolResult { .. } => KIND_TOOL_RESULT,
            Event::Unknown { kind, .. } => kind,
        }
    }

    pub fn raw(&self) -> &Map<String, Value> {
        match self {
            Event::Text { raw, .. }
            | Event::StepFinish { raw, .. }
            | Event::ToolCall { raw, .. }
            | Event::ToolResult { raw }
            | Event::Unknown { raw, .. } => raw,
        }
    }

    /// Narrative fragment carried by a `text` event.
    pub fn text(&self) -> Option<&str> {
        match self {
            Event::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// One-line operator-facing description used for trace output.
    pub fn describe(&self) -> String {
        match self {
            Event::Text { text, .. } => format!("text: {}", excerpt(text, 100)),
            Event::StepFinish { tokens, .. } => {
                format!("step_finish: tokens={}", render_counts(tokens))
            }
            Event::ToolCall { tool_name, .. } => {
                let name = if tool_name.is_empty() {
                    "unknown"
                } else {
                    tool_name.as_str()
                };
                format!("tool_call: {name}")
            }
            Event::ToolResult { .. } => "tool_result: received".to_string(),
            Event::Unknown { kind, .. } if kind.is_empty() => "(untyped event)".to_string(),
            Event::Unknown { kind, .. } => kind.clone(),
        }
    }
}

impl TryFrom<Value> for Event {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Event::from_object(map)),
            other => Err(format!(
                "expected a JSON object, found {}",
                json_type_name(&other)
            )),
        }
    }
}

impl From<Event> for Value {
    fn from(event: Event) -> Self {
        match event {
            Event::Text { raw, .. }
            | Event::StepFinish { raw, .. }
            | Event::ToolCall { raw, .. }
            | Event::ToolResult { raw }
            | Event::Unknown { raw, .. } => Value::Object(raw),
        }
    }
}

/// `part.tool.name`, also accepting the bare-string form `part.tool = "name"`.
fn tool_name(part: &Map<String, Value>) -> String {
    match part.get("tool") {
        Some(Value::Object(tool)) => tool
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Some(Value::String(name)) => name.clone(),
        _ => String::new(),
    }
}

fn flatten_counters(value: &Value) -> TokenCounts {
    let mut counts = TokenCounts::new();
    if let Value::Object(map) = value {
        flatten_into(map, "", &mut counts);
    }
    counts
}

fn flatten_into(map: &Map<String, Value>, prefix: &str, counts: &mut TokenCounts) {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Number(n) => {
                if let Some(n) = n.as_u64() {
                    counts.insert(name, n);
                }
            }
            Value::Object(inner) => flatten_into(inner, &name, counts),
            _ => {}
        }
    }
}

pub(crate) fn render_counts(counts: &TokenCounts) -> String {
    let mut buf = String::from("{");
    for (i, (name, value)) in counts.iter().enumerate() {
        if i > 0 {
            buf.push_str(", ");
        }
        let _ = write!(buf, "{name}: {value}");
    }
    buf.push('}');
    buf
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// First `max_chars` characters of `s`, with `...` appended when cut.
pub fn excerpt(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
