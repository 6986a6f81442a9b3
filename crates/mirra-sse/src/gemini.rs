//! Reconstructs text, event inventory, and metadata from a Gemini
//! `generateContent`/`streamGenerateContent` SSE stream: unframed
//! `data: ` lines, one JSON chunk per line.

use serde_json::Value;

use crate::event::ParsedStream;

pub fn parse(input: &str) -> ParsedStream {
    let mut stream = ParsedStream::default();
    let mut seen_role = false;

    for line in input.lines() {
        let Some(payload) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) else {
            continue;
        };
        let payload = payload.trim();
        if payload.is_empty() {
            continue;
        }

        let Ok(chunk) = serde_json::from_str::<Value>(payload) else {
            continue;
        };
        stream.push_event("chunk", chunk.clone());

        if let Some(model_version) = chunk.get("modelVersion") {
            stream.set_metadata("model", model_version.clone());
        }
        if let Some(response_id) = chunk.get("responseId") {
            stream.set_metadata("response_id", response_id.clone());
        }

        if let Some(candidate) = chunk.pointer("/candidates/0") {
            if let Some(parts) = candidate.pointer("/content/parts").and_then(Value::as_array) {
                for part in parts {
                    if let Some(text) = part.get("text").and_then(Value::as_str) {
                        stream.text.push_str(text);
                    }
                    if let Some(function_call) = part.get("functionCall") {
                        push_function_call(&mut stream, function_call);
                    }
                }
            }
            if !seen_role {
                if let Some(role) = candidate.pointer("/content/role") {
                    stream.set_metadata("role", role.clone());
                    seen_role = true;
                }
            }
            if let Some(finish_reason) = candidate.get("finishReason") {
                stream.set_metadata("finish_reason", finish_reason.clone());
            }
            if let Some(safety_ratings) = candidate.get("safetyRatings") {
                stream.set_metadata("safety_ratings", safety_ratings.clone());
            }
        }
        if let Some(grounding_metadata) = chunk.pointer("/candidates/0/groundingMetadata") {
            stream.set_metadata("grounding_metadata", grounding_metadata.clone());
        }

        if let Some(usage) = chunk.get("usageMetadata") {
            if let Some(v) = usage.get("promptTokenCount") {
                stream.set_metadata("prompt_tokens", v.clone());
            }
            if let Some(v) = usage.get("candidatesTokenCount") {
                stream.set_metadata("completion_tokens", v.clone());
            }
            if let Some(v) = usage.get("totalTokenCount") {
                stream.set_metadata("total_tokens", v.clone());
            }
            if let Some(v) = usage.get("cachedContentTokenCount") {
                stream.set_metadata("cached_content_tokens", v.clone());
            }
        }
    }

    stream
}

fn push_function_call(stream: &mut ParsedStream, function_call: &Value) {
    let mut calls = stream
        .metadata
        .remove("function_calls")
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default();
    calls.push(function_call.clone());
    stream.set_metadata("function_calls", Value::Array(calls));
}
