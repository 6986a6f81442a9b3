//! Reconstructs text, event inventory, and metadata from an Anthropic
//! Messages API SSE stream.
//!
//! The wire framing is `event: <type>` followed by one or more `data: `
//! lines, terminated by a blank line or the next `event:` line. Fragments
//! within one event are joined with `\n` before being parsed as JSON.

use serde_json::Value;

use crate::event::ParsedStream;

pub fn parse(input: &str) -> ParsedStream {
    let mut stream = ParsedStream::default();

    for (event_type, payload) in frame_events(input) {
        if event_type == "ping" && serde_json::from_str::<Value>(&payload).is_err() {
            continue;
        }

        let parsed: Option<Value> = serde_json::from_str(&payload).ok();
        let data_value = parsed.clone().unwrap_or_else(|| Value::String(payload.clone()));
        stream.push_event(event_type.clone(), data_value);

        if let Some(json) = parsed {
            dispatch(&event_type, &json, &mut stream);
        }
    }

    stream
}

fn dispatch(event_type: &str, json: &Value, stream: &mut ParsedStream) {
    match event_type {
        "message_start" => {
            if let Some(message) = json.get("message") {
                if let Some(model) = message.get("model") {
                    stream.set_metadata("model", model.clone());
                }
                if let Some(id) = message.get("id") {
                    stream.set_metadata("id", id.clone());
                }
                if let Some(usage) = message.get("usage") {
                    stream.set_metadata("usage", usage.clone());
                }
            }
        }
        "content_block_delta" => {
            let Some(delta) = json.get("delta") else { return };
            match delta.get("type").and_then(Value::as_str) {
                Some("text_delta") => {
                    if let Some(text) = delta.get("text").and_then(Value::as_str) {
                        stream.text.push_str(text);
                    }
                }
                Some("thinking_delta") => {
                    if let Some(thinking) = delta.get("thinking").and_then(Value::as_str) {
                        stream.append_metadata_str("thinking", thinking);
                    }
                }
                Some("input_json_delta") => {
                    if let Some(partial) = delta.get("partial_json").and_then(Value::as_str) {
                        stream.append_metadata_str("tool_input", partial);
                    }
                }
                _ => {}
            }
        }
        "message_delta" => {
            if let Some(stop_reason) = json.pointer("/delta/stop_reason") {
                if !stop_reason.is_null() {
                    stream.set_metadata("stop_reason", stop_reason.clone());
                }
            }
            if let Some(output_tokens) = json.pointer("/usage/output_tokens") {
                stream.set_metadata("output_tokens", output_tokens.clone());
            }
        }
        _ => {}
    }
}

/// Split a raw SSE body into `(event type, joined data payload)` pairs.
fn frame_events(input: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut current_type: Option<String> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    let flush = |current_type: &mut Option<String>, data_lines: &mut Vec<&str>, out: &mut Vec<(String, String)>| {
        if let Some(event_type) = current_type.take() {
            if !data_lines.is_empty() {
                out.push((event_type, data_lines.join("\n")));
            }
        }
        data_lines.clear();
    };

    for line in input.lines() {
        if let Some(rest) = line.strip_prefix("event:") {
            flush(&mut current_type, &mut data_lines, &mut out);
            current_type = Some(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        } else if line.is_empty() {
            flush(&mut current_type, &mut data_lines, &mut out);
        }
    }
    flush(&mut current_type, &mut data_lines, &mut out);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sse(events: &[(&str, &str)]) -> String {
        let mut body = String::new();
        for (event_type, data) in events {
            body.push_str(&format!("event: {event_type}\ndata: {data}\n\n"));
        }
        body
    }

    #[test]
    fn empty_input_yields_empty_result() {
        let parsed = parse("");
        assert_eq!(parsed.text, "");
        assert!(parsed.events.is_empty());
        assert!(parsed.metadata.is_empty());
    }

    #[test]
    fn concatenates_text_deltas_and_extracts_metadata() {
        let body = sse(&[
            ("message_start", r#"{"message":{"model":"claude-haiku-4-5-20251001","id":"msg_1","usage":{"input_tokens":10}}}"#),
            ("content_block_delta", r#"{"delta":{"type":"text_delta","text":"Building"}}"#),
            ("content_block_delta", r#"{"delta":{"type":"text_delta","text":" Mirra"}}"#),
            ("ping", "not-json"),
            ("content_block_delta", r#"{"delta":{"type":"text_delta","text":" Recordings Table UI with"}}"#),
            ("content_block_delta", r#"{"delta":{"type":"text_delta","text":" API"}}"#),
            ("content_block_stop", r#"{}"#),
            ("message_delta", r#"{"delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":12}}"#),
            ("message_stop", r#"{}"#),
        ]);

        let parsed = parse(&body);
        assert_eq!(parsed.text, "Building Mirra Recordings Table UI with API");
        assert_eq!(parsed.metadata.get("model").unwrap(), "claude-haiku-4-5-20251001");
        assert_eq!(parsed.metadata.get("stop_reason").unwrap(), "end_turn");
        assert_eq!(parsed.metadata.get("output_tokens").unwrap(), 12);
        // the invalid-json ping is dropped entirely
        assert!(!parsed.events.iter().any(|e| e.event_type == "ping"));
        assert_eq!(parsed.events.len(), 8);
    }

    #[test]
    fn thinking_and_tool_input_deltas_accumulate() {
        let body = sse(&[
            ("content_block_delta", r#"{"delta":{"type":"thinking_delta","thinking":"step one. "}}"#),
            ("content_block_delta", r#"{"delta":{"type":"thinking_delta","thinking":"step two."}}"#),
            ("content_block_delta", r#"{"delta":{"type":"input_json_delta","partial_json":"{\"a\":"}}"#),
            ("content_block_delta", r#"{"delta":{"type":"input_json_delta","partial_json":"1}"}}"#),
        ]);

        let parsed = parse(&body);
        assert_eq!(parsed.metadata.get("thinking").unwrap(), "step one. step two.");
        assert_eq!(parsed.metadata.get("tool_input").unwrap(), "{\"a\":1}");
    }
}
