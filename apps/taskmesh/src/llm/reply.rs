//! Reply normalization
//!
//! Chat endpoints do not agree on a reply shape. Some wrap the message in a
//! `message` object, some return the message object itself, some return a
//! string that may or may not hold JSON. All of them end up as a
//! [`ChatReply`] here.

use serde_json::{Map, Value};

use super::client::{ChatReply, Role, ToolCall};

/// Normalizes a decoded reply body into the canonical shape
pub fn normalize_reply(raw: Value) -> ChatReply {
    match raw {
        Value::Object(mut object) => match object.remove("message") {
            Some(Value::Object(message)) => from_message_object(&message),
            Some(Value::String(text)) => normalize_text(&text),
            Some(other) => ChatReply::text(other.to_string()),
            None if object.contains_key("content") => from_message_object(&object),
            None => ChatReply::text(Value::Object(object).to_string()),
        },
        Value::String(text) => normalize_text(&text),
        other => ChatReply::text(other.to_string()),
    }
}

/// Normalizes a raw text reply
///
/// Text that parses as a JSON object carrying `content` is read as a
/// message; anything else becomes the content of an assistant reply.
pub fn normalize_text(text: &str) -> ChatReply {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) if object.contains_key("content") => from_message_object(&object),
        Ok(Value::Object(object)) if object.contains_key("message") => {
            normalize_reply(Value::Object(object))
        }
        _ => ChatReply::text(text),
    }
}

fn from_message_object(message: &Map<String, Value>) -> ChatReply {
    let role = message
        .get("role")
        .and_then(Value::as_str)
        .and_then(Role::parse)
        .unwrap_or(Role::Assistant);

    let content = match message.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| calls.iter().filter_map(parse_tool_call).collect())
        .unwrap_or_default();

    ChatReply {
        role,
        content,
        tool_calls,
    }
}

fn parse_tool_call(call: &Value) -> Option<ToolCall> {
    let function = call.get("function").unwrap_or(call);
    let name = function.get("name")?.as_str()?.to_string();

    // Arguments arrive either as an object or as a JSON-encoded string
    let arguments = match function.get("arguments") {
        Some(Value::String(encoded)) => {
            serde_json::from_str(encoded).unwrap_or_else(|_| Value::String(encoded.clone()))
        }
        Some(other) => other.clone(),
        None => Value::Null,
    };

    Some(ToolCall { name, arguments })
}
