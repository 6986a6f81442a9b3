use mirra_model::{Body, Recording};

const REDACTED: &str = "[REDACTED]";
const SENSITIVE_SUBSTRINGS: &[&str] = &["authorization", "api-key", "cookie", "set-cookie"];

/// Replace sensitive header values and a top-level `api_key` JSON field with
/// `[REDACTED]` before a Recording is handed back through the read API.
/// Operates on a clone; the stored Recording and index are untouched.
pub fn redact(mut recording: Recording) -> Recording {
    redact_headers(&mut recording);
    redact_api_key(&mut recording.request.body);
    redact_api_key(&mut recording.response.body);
    recording
}

fn redact_headers(recording: &mut Recording) {
    redact_header_map(&mut recording.request.headers);
    redact_header_map(&mut recording.response.headers);
}

fn redact_header_map(headers: &mut mirra_model::HeaderMap) {
    let names: Vec<String> = headers.iter().map(|(name, _)| name.clone()).collect();
    for name in names {
        let lower = name.to_ascii_lowercase();
        if SENSITIVE_SUBSTRINGS.iter().any(|needle| lower.contains(needle)) {
            headers.set(&name, REDACTED);
        }
    }
}

fn redact_api_key(body: &mut Option<Body>) {
    if let Some(Body::Json(value)) = body {
        if let Some(obj) = value.as_object_mut() {
            if obj.contains_key("api_key") {
                obj.insert("api_key".to_string(), serde_json::Value::String(REDACTED.to_string()));
            }
        }
    }
}
