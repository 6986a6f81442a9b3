use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use mirra_model::{Provider, Recording};
use mirra_sse::parse as parse_sse;
use serde::{Deserialize, Serialize};
use time::Date;
use time::macros::format_description;
use tokio::fs;
use tracing::warn;

use crate::redact::redact;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListRecordingsQuery {
    page: Option<u32>,
    limit: Option<u32>,
    provider: Option<String>,
    from: Option<String>,
    to: Option<String>,
    search: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordingSummary {
    id: String,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: time::OffsetDateTime,
    provider: Provider,
    method: String,
    path: String,
    status: u16,
    duration: i64,
    response_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<&Recording> for RecordingSummary {
    fn from(rec: &Recording) -> Self {
        Self {
            id: rec.id.clone(),
            timestamp: rec.timestamp,
            provider: rec.provider,
            method: rec.request.method.clone(),
            path: rec.request.path.clone(),
            status: rec.response.status,
            duration: rec.timing.duration_ms,
            response_size: rec.response_size,
            error: rec.error.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRecordingsResponse {
    recordings: Vec<RecordingSummary>,
    total: usize,
    page: u32,
    limit: u32,
    has_more: bool,
}

/// Scans every `recordings-*.jsonl` file whose filename date falls in
/// `[from, to]`, parsing each line fully rather than relying on the offset
/// index so listing works even when `index.json` is absent.
pub async fn list_recordings(
    State(state): State<AppState>,
    Query(query): Query<ListRecordingsQuery>,
) -> impl IntoResponse {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(50).max(1);
    let provider_filter = query.provider.as_deref().and_then(|p| p.parse::<Provider>().ok());
    let from_date = query.from.as_deref().and_then(parse_date);
    let to_date = query.to.as_deref().and_then(parse_date);
    let search = query.search.as_deref().map(str::to_ascii_lowercase);

    let mut matched: Vec<Recording> = match scan_day_files(&state.recordings_dir, from_date, to_date).await {
        Ok(recordings) => recordings,
        Err(err) => {
            warn!(error = %err, "failed to scan recordings directory");
            Vec::new()
        }
    };

    matched.retain(|rec| {
        if let Some(provider) = provider_filter {
            if rec.provider != provider {
                return false;
            }
        }
        if let Some(search) = &search {
            let haystack = format!(
                "{} {} {}",
                rec.id.to_ascii_lowercase(),
                rec.request.path.to_ascii_lowercase(),
                rec.error.clone().unwrap_or_default().to_ascii_lowercase()
            );
            if !haystack.contains(search.as_str()) {
                return false;
            }
        }
        true
    });

    matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let total = matched.len();
    let start = ((page - 1) as usize) * (limit as usize);
    let end = (start + limit as usize).min(total);
    let page_recordings = if start < total {
        matched[start..end].iter().map(RecordingSummary::from).collect()
    } else {
        Vec::new()
    };

    Json(ListRecordingsResponse {
        recordings: page_recordings,
        total,
        page,
        limit,
        has_more: end < total,
    })
    .into_response()
}

/// Prefix-matches `id_or_prefix` against the offset index, reads the single
/// line it points to, and redacts sensitive fields before returning.
pub async fn get_recording(State(state): State<AppState>, Path(id_or_prefix): Path<String>) -> impl IntoResponse {
    match state.offset_index.read_recording(&id_or_prefix).await {
        Ok(recording) => Json(redact(recording)).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "recording not found").into_response(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParseResponse {
    text: String,
    metadata: serde_json::Map<String, serde_json::Value>,
    event_counts: BTreeMap<String, usize>,
}

/// Loads the Recording, dispatches to the SSE parser for its provider, and
/// returns the parsed text/metadata/event-count summary.
pub async fn parse_recording(State(state): State<AppState>, Path(id_or_prefix): Path<String>) -> impl IntoResponse {
    let recording = match state.offset_index.read_recording(&id_or_prefix).await {
        Ok(recording) => recording,
        Err(_) => return (StatusCode::NOT_FOUND, "recording not found").into_response(),
    };

    let raw = match recording.response.body.as_ref() {
        Some(mirra_model::Body::Text(text)) => text.clone(),
        Some(mirra_model::Body::Json(value)) => value.to_string(),
        None => String::new(),
    };

    match parse_sse(recording.provider, &raw) {
        Ok(parsed) => Json(ParseResponse {
            text: parsed.text,
            metadata: parsed.metadata,
            event_counts: parsed.event_counts(),
        })
        .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    page: Option<u32>,
    limit: Option<u32>,
    provider: Option<String>,
    from: Option<String>,
    to: Option<String>,
    has_errors: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListSessionsResponse {
    groups: Vec<mirra_model::SessionGroup>,
    total: usize,
    page: u32,
    limit: u32,
    has_more: bool,
}

pub async fn list_sessions(State(state): State<AppState>, Query(query): Query<ListSessionsQuery>) -> impl IntoResponse {
    let filter = mirra_storage::SessionListFilter {
        page: query.page.unwrap_or(1).max(1),
        limit: query.limit.unwrap_or(50).max(1),
        provider: query.provider.as_deref().and_then(|p| p.parse::<Provider>().ok()),
        from_date: query.from.as_deref().and_then(parse_date),
        to_date: query.to.as_deref().and_then(parse_date),
        has_errors: query.has_errors,
    };

    let page_result = state.session_index.list(filter).await;
    Json(ListSessionsResponse {
        groups: page_result.groups.into_iter().map(|(_, g)| g).collect(),
        total: page_result.total,
        page: page_result.page,
        limit: page_result.limit,
        has_more: page_result.has_more,
    })
    .into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionDetailResponse {
    group: mirra_model::SessionGroup,
    recordings: Vec<RecordingSummary>,
}

pub async fn get_session(State(state): State<AppState>, Path(trace_id): Path<String>) -> impl IntoResponse {
    let group = match state.session_index.get(&trace_id).await {
        Some(group) => group,
        None => return (StatusCode::NOT_FOUND, "session not found").into_response(),
    };

    let mut recordings = Vec::with_capacity(group.recording_ids.len());
    for id in &group.recording_ids {
        if let Ok(rec) = state.offset_index.read_recording(id).await {
            recordings.push(RecordingSummary::from(&rec));
        }
    }

    Json(SessionDetailResponse { group, recordings }).into_response()
}

async fn scan_day_files(dir: &std::path::Path, from: Option<Date>, to: Option<Date>) -> std::io::Result<Vec<Recording>> {
    let mut recordings = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(date_str) = name.strip_prefix("recordings-").and_then(|s| s.strip_suffix(".jsonl")) else {
            continue;
        };
        let Some(file_date) = parse_date(date_str) else { continue };
        if from.is_some_and(|from| file_date < from) || to.is_some_and(|to| file_date > to) {
            continue;
        }

        let contents = fs::read(entry.path()).await?;
        for line in contents.split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            match serde_json::from_slice::<Recording>(line) {
                Ok(rec) => recordings.push(rec),
                Err(err) => warn!(file = %name, error = %err, "skipping malformed line in list scan"),
            }
        }
    }
    Ok(recordings)
}

fn parse_date(s: &str) -> Option<Date> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(s, &format).ok()
}
