use axum::http::HeaderMap as AxumHeaderMap;
use mirra_model::HeaderMap;

/// Headers that are connection-scoped and must never be forwarded across a
/// proxy hop, plus `Host` which the proxy recomputes for the upstream.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

fn is_hop_by_hop(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    HOP_BY_HOP.contains(&lower.as_str()) || lower.starts_with("proxy-")
}

/// Convert an axum/http header map into the recorded [`HeaderMap`], stripping
/// hop-by-hop headers in the process.
pub fn capture_headers(headers: &AxumHeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            out.append(name.as_str(), value);
        }
    }
    out
}

/// Copy non-hop-by-hop headers from an inbound axum request onto an
/// outbound reqwest builder.
pub fn forward_onto(builder: reqwest::RequestBuilder, headers: &AxumHeaderMap) -> reqwest::RequestBuilder {
    let mut builder = builder;
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            builder = builder.header(name.as_str(), value);
        }
    }
    builder
}

/// Copy non-hop-by-hop headers from an upstream reqwest response onto an
/// outbound axum response builder.
pub fn forward_response_headers(
    mut builder: axum::http::response::Builder,
    headers: &reqwest::header::HeaderMap,
) -> axum::http::response::Builder {
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder
}

/// Capture an upstream reqwest response's headers into the recorded
/// [`HeaderMap`], stripping hop-by-hop headers.
pub fn capture_reqwest_headers(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers.iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            out.append(name.as_str(), value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_connection_and_proxy_headers() {
        let mut headers = AxumHeaderMap::new();
        headers.insert("Connection", "keep-alive".parse().unwrap());
        headers.insert("Proxy-Authorization", "secret".parse().unwrap());
        headers.insert("X-Api-Key", "abc".parse().unwrap());

        let captured = capture_headers(&headers);
        assert!(!captured.contains("Connection"));
        assert!(!captured.contains("Proxy-Authorization"));
        assert!(captured.contains("X-Api-Key"));
    }
}
