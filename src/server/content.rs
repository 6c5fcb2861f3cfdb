//! Typed content blocks returned by served tools.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One block of tool output. Media blocks carry a `url`; the rest carry a
/// field named after their type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Text { text: String },
    Markdown { markdown: String },
    Table { table: Value },
    Json { json: Value },
    Error { error: String },
    File { file: Value },
    Image { url: String },
    Audio { url: String },
    Video { url: String },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content::Text { text: text.into() }
    }

    pub fn markdown(markdown: impl Into<String>) -> Self {
        Content::Markdown {
            markdown: markdown.into(),
        }
    }

    pub fn table(rows: impl Into<Value>) -> Self {
        Content::Table { table: rows.into() }
    }

    pub fn json(value: impl Into<Value>) -> Self {
        Content::Json { json: value.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Content::Error {
            error: message.into(),
        }
    }

    pub fn file(file: impl Into<Value>) -> Self {
        Content::File { file: file.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Content::Image { url: url.into() }
    }

    pub fn audio(url: impl Into<String>) -> Self {
        Content::Audio { url: url.into() }
    }

    pub fn video(url: impl Into<String>) -> Self {
        Content::Video { url: url.into() }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "type": "text", "text": "" }))
    }
}

impl From<Content> for Value {
    fn from(content: Content) -> Self {
        content.to_value()
    }
}

fn payload_field(kind: &str) -> &str {
    match kind {
        "image" | "audio" | "video" => "url",
        other => other,
    }
}

/// Shape a handler's return value as a content block.
///
/// Strings become text blocks. An object that already names its `type` and
/// carries the matching payload field passes through untouched; any other
/// object or array is wrapped as a json block. Scalars are rendered as text.
pub fn normalize(value: Value) -> Value {
    match value {
        Value::String(text) => Content::text(text).to_value(),
        Value::Object(ref map) => {
            let typed = map
                .get("type")
                .and_then(Value::as_str)
                .map(|kind| matches!(map.get(payload_field(kind)), Some(v) if !v.is_null()))
                .unwrap_or(false);
            if typed {
                value
            } else {
                Content::json(value).to_value()
            }
        }
        Value::Array(_) => Content::json(value).to_value(),
        Value::Null => Content::text("").to_value(),
        other => Content::text(other.to_string()).to_value(),
    }
}
