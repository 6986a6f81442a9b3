//! Reconstructs text, event inventory, and metadata from an OpenAI chat
//! completions SSE stream: unframed `data: ` lines terminated by a
//! `data: [DONE]` marker.

use serde_json::Value;

use crate::event::ParsedStream;

pub fn parse(input: &str) -> ParsedStream {
    let mut stream = ParsedStream::default();
    let mut seen_first_chunk = false;

    for line in input.lines() {
        let Some(payload) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            continue;
        }

        if payload == "[DONE]" {
            stream.push_event("done", serde_json::json!({"marker": "[DONE]"}));
            continue;
        }

        let Ok(chunk) = serde_json::from_str::<Value>(payload) else {
            continue;
        };
        stream.push_event("chunk", chunk.clone());

        if !seen_first_chunk {
            seen_first_chunk = true;
            if let Some(id) = chunk.get("id") {
                stream.set_metadata("id", id.clone());
            }
            if let Some(model) = chunk.get("model") {
                stream.set_metadata("model", model.clone());
            }
            if let Some(created) = chunk.get("created") {
                stream.set_metadata("created", created.clone());
            }
        }

        if let Some(delta) = chunk.pointer("/choices/0/delta") {
            if let Some(content) = delta.get("content").and_then(Value::as_str) {
                stream.text.push_str(content);
            }
            if let Some(role) = delta.get("role") {
                stream.set_metadata("role", role.clone());
            }
            if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
                merge_tool_calls(&mut stream, tool_calls);
            }
        }

        if let Some(finish_reason) = chunk.pointer("/choices/0/finish_reason") {
            if !finish_reason.is_null() {
                stream.set_metadata("finish_reason", finish_reason.clone());
            }
        }

        if let Some(usage) = chunk.get("usage") {
            for key in ["prompt_tokens", "completion_tokens", "total_tokens"] {
                if let Some(value) = usage.get(key) {
                    stream.set_metadata(key, value.clone());
                }
            }
        }
    }

    stream
}

/// Merge a `delta.tool_calls` array into `metadata.tool_calls`, keyed by the
/// chunk-local `index`, string-concatenating `function.arguments` fragments.
fn merge_tool_calls(stream: &mut ParsedStream, incoming: &[Value]) {
    let mut tool_calls = stream
        .metadata
        .remove("tool_calls")
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default();

    for call in incoming {
        let index = call.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;
        while tool_calls.len() <= index {
            tool_calls.push(serde_json::json!({}));
        }
        let entry = tool_calls[index].as_object_mut().expect("object placeholder");

        if let Some(id) = call.get("id") {
            entry.insert("id".to_string(), id.clone());
        }
        if let Some(call_type) = call.get("type") {
            entry.insert("type".to_string(), call_type.clone());
        }
        if let Some(function) = call.get("function") {
            if let Some(name) = function.get("name") {
                entry.insert("name".to_string(), name.clone());
            }
            if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                let current = entry.get("arguments").and_then(Value::as_str).unwrap_or("").to_string();
                entry.insert("arguments".to_string(), Value::String(current + args));
            }
        }
    }

    stream.set_metadata("tool_calls", Value::Array(tool_calls));
}
