use axum::body::{Body as AxumBody, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap as AxumHeaderMap, Method, Response, StatusCode, Uri, header};
use axum::response::IntoResponse;
use futures_util::{Stream, StreamExt};
use mirra_model::{Body, HeaderMap, Provider, Recording, RequestRecord, ResponseRecord, Timing, new_recording_id};
use mirra_storage::Recorder;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::body_capture::{capture_body, finalize_response_body};
use crate::hop_by_hop::{capture_headers, capture_reqwest_headers, forward_onto, forward_response_headers};
use crate::state::AppState;

/// The one fallback route: classify, dial upstream, stream the response back
/// while taping a copy for the recorder.
pub async fn proxy_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: AxumHeaderMap,
    body: Bytes,
) -> Response<AxumBody> {
    let path = uri.path().to_string();
    let provider = mirra_router::classify(&path);
    if provider == Provider::Unknown {
        return (StatusCode::NOT_FOUND, "no provider matches this path").into_response();
    }

    let base_url = match provider {
        Provider::Claude => state.upstreams.claude.as_str(),
        Provider::OpenAi => state.upstreams.openai.as_str(),
        Provider::Gemini => state.upstreams.gemini.as_str(),
        Provider::Unknown => unreachable!("checked above"),
    };

    let query = uri.query().unwrap_or("").to_string();
    let mut url = format!("{}{}", base_url.trim_end_matches('/'), path);
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query);
    }

    let content_type = header_value(&headers, header::CONTENT_TYPE.as_str());
    let request_headers = capture_headers(&headers);
    let request_body = capture_body(&content_type, &body, state.recording_cap);

    let started_at = OffsetDateTime::now_utc();

    let builder = forward_onto(state.client.request(method.clone(), url.as_str()), &headers).body(body);
    let upstream_result = builder.send().await;

    let upstream_resp = match upstream_result {
        Ok(resp) => resp,
        Err(err) => {
            warn!(provider = %provider, url = %url, error = %err, "upstream dial failed");
            let completed_at = OffsetDateTime::now_utc();
            let recording = Recording {
                id: new_recording_id(started_at),
                timestamp: started_at,
                provider,
                request: RequestRecord {
                    method: method.to_string(),
                    path,
                    query,
                    headers: request_headers,
                    body: request_body,
                },
                response: ResponseRecord {
                    status: 0,
                    headers: HeaderMap::new(),
                    body: None,
                    streaming: false,
                },
                response_size: 0,
                timing: Timing::new(started_at, completed_at),
                error: Some(err.to_string()),
            };
            if state.recording_enabled {
                state.recorder.record(recording);
            }
            return (StatusCode::BAD_GATEWAY, "upstream dial failed").into_response();
        }
    };

    let status = upstream_resp.status().as_u16();
    let response_content_type = upstream_resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let is_gzip = upstream_resp
        .headers()
        .get(header::CONTENT_ENCODING)
        .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"gzip"));
    let response_headers = capture_reqwest_headers(upstream_resp.headers());

    let mut response_builder = Response::builder().status(status);
    response_builder = forward_response_headers(response_builder, upstream_resp.headers());

    if !state.recording_enabled {
        let body = AxumBody::from_stream(upstream_resp.bytes_stream());
        return response_builder.body(body).unwrap_or_else(|err| {
            error!(error = %err, "failed to build proxied response");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        });
    }

    let meta = RecordingMeta {
        id: new_recording_id(started_at),
        started_at,
        provider,
        method: method.to_string(),
        path,
        query,
        request_headers,
        request_body,
        status,
        response_headers,
        content_type: response_content_type,
        is_gzip,
    };

    // The upstream drain runs in its own task, decoupled from the client-
    // facing body stream: a client disconnect drops the receiving end of
    // `tx`, but the task keeps polling `upstream_resp` to EOF and still
    // finalizes the Recording, per the "continue draining upstream, still
    // record" requirement even when nobody downstream is listening anymore.
    let (tx, rx) = mpsc::channel::<reqwest::Result<Bytes>>(16);
    tokio::spawn(drain_and_record(
        upstream_resp.bytes_stream(),
        meta,
        state.recorder.clone(),
        state.recording_cap,
        tx,
    ));

    let body = AxumBody::from_stream(futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }));
    response_builder.body(body).unwrap_or_else(|err| {
        error!(error = %err, "failed to build proxied response");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
    })
}

struct RecordingMeta {
    id: String,
    started_at: OffsetDateTime,
    provider: Provider,
    method: String,
    path: String,
    query: String,
    request_headers: HeaderMap,
    request_body: Option<Body>,
    status: u16,
    response_headers: HeaderMap,
    content_type: String,
    is_gzip: bool,
}

/// Drains the upstream byte stream to completion, forwarding every chunk to
/// `tx` for the client while copying it into a capped buffer, and builds the
/// [`Recording`] the moment the upstream stream ends.
///
/// Runs as its own task so a client disconnect (which drops `tx`'s receiver)
/// does not stop the drain: `tx.send` failing is ignored and the loop keeps
/// polling `stream` to EOF, so the exchange is still recorded even when
/// nothing downstream is listening anymore.
async fn drain_and_record(
    mut stream: impl Stream<Item = reqwest::Result<Bytes>> + Unpin,
    meta: RecordingMeta,
    recorder: Recorder,
    cap: usize,
    tx: mpsc::Sender<reqwest::Result<Bytes>>,
) {
    let mut buffer = Vec::new();
    let mut truncated = false;
    let mut total: u64 = 0;

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                total += chunk.len() as u64;
                if !truncated {
                    let remaining = cap.saturating_sub(buffer.len());
                    if chunk.len() <= remaining {
                        buffer.extend_from_slice(&chunk);
                    } else {
                        buffer.extend_from_slice(&chunk[..remaining]);
                        truncated = true;
                    }
                }
                let _ = tx.send(Ok(chunk)).await;
            }
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                break;
            }
        }
    }

    finish_recording(meta, buffer, truncated, total, &recorder);
}

fn finish_recording(meta: RecordingMeta, buffer: Vec<u8>, truncated: bool, total: u64, recorder: &Recorder) {
    let streaming = meta.content_type.to_ascii_lowercase().starts_with("text/event-stream") || looks_like_sse(&buffer);
    let response_body = finalize_response_body(&meta.content_type, meta.is_gzip, &buffer, truncated, total);

    let completed_at = OffsetDateTime::now_utc();
    let recording = Recording {
        id: meta.id,
        timestamp: meta.started_at,
        provider: meta.provider,
        request: RequestRecord {
            method: meta.method,
            path: meta.path,
            query: meta.query,
            headers: meta.request_headers,
            body: meta.request_body,
        },
        response: ResponseRecord {
            status: meta.status,
            headers: meta.response_headers,
            body: response_body,
            streaming,
        },
        response_size: total,
        timing: Timing::new(meta.started_at, completed_at),
        error: None,
    };
    recorder.record(recording);
}

fn looks_like_sse(buf: &[u8]) -> bool {
    let text = String::from_utf8_lossy(buf);
    text.lines().take(20).any(|line| line.starts_with("data: ") || line.starts_with("event: "))
}

fn header_value(headers: &AxumHeaderMap, name: &str) -> String {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn detects_sse_framing_without_content_type() {
        assert!(looks_like_sse(b"event: message_start\ndata: {}\n\n"));
        assert!(looks_like_sse(b"data: {\"choices\":[]}\n\n"));
        assert!(!looks_like_sse(b"{\"ok\":true}"));
    }

    #[tokio::test]
    async fn drain_forwards_chunks_caps_the_buffer_and_records() {
        use bytes::Bytes;
        use futures_util::stream;

        let chunks: Vec<reqwest::Result<Bytes>> =
            vec![Ok(Bytes::from_static(b"abcde")), Ok(Bytes::from_static(b"fghij"))];
        let (recorder, mut recorded) = test_recorder();
        let (tx, mut rx) = mpsc::channel(4);

        drain_and_record(stream::iter(chunks), sample_meta(), recorder, 7, tx).await;

        let mut forwarded = Vec::new();
        while let Some(chunk) = rx.recv().await {
            forwarded.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(forwarded, b"abcdefghij");

        let recording = recorded.try_recv().expect("drain_and_record must still produce a Recording");
        assert_eq!(recording.response_size, 10);
        match recording.response.body {
            Some(Body::Text(text)) => assert!(text.contains("…[truncated, 3 bytes omitted]")),
            other => panic!("expected truncated text body, got {other:?}"),
        }
    }

    /// §4.B: a client disconnect must not cut the recording short — the
    /// drain keeps running and the recorder still sees the full exchange
    /// even though nothing is left reading from `tx`'s receiver.
    #[tokio::test]
    async fn drain_keeps_recording_after_client_receiver_is_dropped() {
        use bytes::Bytes;
        use futures_util::stream;

        let chunks: Vec<reqwest::Result<Bytes>> =
            vec![Ok(Bytes::from_static(b"hello")), Ok(Bytes::from_static(b" world"))];
        let (recorder, mut recorded) = test_recorder();
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        drain_and_record(stream::iter(chunks), sample_meta(), recorder, 1024, tx).await;

        let recording = recorded.try_recv().expect("recording must survive a dropped client receiver");
        assert_eq!(recording.response_size, 11);
    }

    fn sample_meta() -> RecordingMeta {
        RecordingMeta {
            id: "20260728-test".to_string(),
            started_at: datetime!(2026-07-28 00:00:00 UTC),
            provider: Provider::Claude,
            method: "POST".to_string(),
            path: "/v1/messages".to_string(),
            query: String::new(),
            request_headers: HeaderMap::new(),
            request_body: None,
            status: 200,
            response_headers: HeaderMap::new(),
            content_type: "text/plain".to_string(),
            is_gzip: false,
        }
    }

    fn test_recorder() -> (mirra_storage::Recorder, mpsc::Receiver<Recording>) {
        let (tx, rx) = mpsc::channel(4);
        (mirra_storage::Recorder::from_sender(tx), rx)
    }
}
