use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use mirra_model::Body;
use std::io::Read;

const TRUNCATION_SUFFIX: &str = "…[truncated, {n} bytes omitted]";

/// Build the captured `request.body` / non-streamed `response.body` value.
///
/// JSON content types get parsed into a real `serde_json::Value` so the
/// on-disk line holds a nested object rather than escaped JSON text;
/// anything else is kept as a string, truncated at `cap`.
pub fn capture_body(content_type: &str, bytes: &[u8], cap: usize) -> Option<Body> {
    if bytes.is_empty() {
        return None;
    }

    let is_json = content_type_is(content_type, "application/json");
    let (slice, truncated) = if bytes.len() > cap { (&bytes[..cap], true) } else { (bytes, false) };

    if is_json && !truncated {
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(slice) {
            return Some(Body::Json(value));
        }
    }

    let omitted = if truncated { (bytes.len() - slice.len()) as u64 } else { 0 };
    Some(Body::Text(text_with_truncation(slice, omitted)))
}

/// Finalize a streamed response body per the capture rules: SSE/non-JSON
/// stays text, JSON under the cap is parsed, gzip is decompressed first,
/// and anything that still can't be made sense of falls back to the
/// `base64:<...>` sentinel. `total` is the full byte count observed on the
/// wire, which may exceed `buf.len()` when the tee buffer was capped.
pub fn finalize_response_body(content_type: &str, is_gzip: bool, buf: &[u8], truncated: bool, total: u64) -> Option<Body> {
    if buf.is_empty() {
        return None;
    }

    let is_sse = content_type_is(content_type, "text/event-stream");
    let is_json = content_type_is(content_type, "application/json");
    let omitted = if truncated { total.saturating_sub(buf.len() as u64) } else { 0 };

    if is_gzip && !truncated {
        return Some(match decompress_gzip(buf) {
            Some(decompressed) => match serde_json::from_slice::<serde_json::Value>(&decompressed) {
                Ok(value) => Body::Json(value),
                Err(_) => Body::Text(format!("base64:{}", BASE64.encode(buf))),
            },
            None => Body::Text(format!("base64:{}", BASE64.encode(buf))),
        });
    }

    if is_sse || !is_json || truncated {
        return Some(Body::Text(text_with_truncation(buf, omitted)));
    }

    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(buf) {
        return Some(Body::Json(value));
    }

    Some(Body::Text(text_with_truncation(buf, omitted)))
}

fn text_with_truncation(slice: &[u8], omitted: u64) -> String {
    let mut text = String::from_utf8_lossy(slice).into_owned();
    if omitted > 0 {
        text.push_str(&TRUNCATION_SUFFIX.replace("{n}", &omitted.to_string()));
    }
    text
}

fn decompress_gzip(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = flate2::read::GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).ok()?;
    Some(out)
}

fn content_type_is(content_type: &str, prefix: &str) -> bool {
    content_type.to_ascii_lowercase().starts_with(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_content_type() {
        let body = capture_body("application/json; charset=utf-8", br#"{"a":1}"#, 1024).unwrap();
        assert_eq!(body, Body::Json(serde_json::json!({"a": 1})));
    }

    #[test]
    fn falls_back_to_text_for_non_json() {
        let body = capture_body("text/plain", b"hello", 1024).unwrap();
        assert_eq!(body, Body::Text("hello".to_string()));
    }

    #[test]
    fn truncation_appends_sentinel() {
        let body = capture_body("application/json", b"0123456789", 4).unwrap();
        match body {
            Body::Text(text) => {
                assert!(text.starts_with("0123"));
                assert!(text.contains("truncated, 6 bytes omitted"));
            }
            Body::Json(_) => panic!("expected text fallback for truncated json"),
        }
    }

    #[test]
    fn gzip_json_is_decompressed_and_parsed() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(br#"{"ok":true}"#).unwrap();
        let compressed = encoder.finish().unwrap();

        let body = finalize_response_body("application/json", true, &compressed, false, compressed.len() as u64).unwrap();
        assert_eq!(body, Body::Json(serde_json::json!({"ok": true})));
    }

    #[test]
    fn malformed_gzip_falls_back_to_base64_sentinel() {
        let body = finalize_response_body("application/json", true, b"not gzip", false, 8).unwrap();
        match body {
            Body::Text(text) => assert!(text.starts_with("base64:")),
            Body::Json(_) => panic!("expected base64 sentinel"),
        }
    }

    #[test]
    fn streamed_truncation_reports_actual_omitted_count() {
        let body = finalize_response_body("text/plain", false, b"0123", true, 10).unwrap();
        match body {
            Body::Text(text) => {
                assert!(text.starts_with("0123"));
                assert!(text.contains("…[truncated, 6 bytes omitted]"));
            }
            Body::Json(_) => panic!("expected text fallback for truncated stream"),
        }
    }
}
