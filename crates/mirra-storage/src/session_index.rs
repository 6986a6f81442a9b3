use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use mirra_model::{HeaderMap, Provider, Recording, SessionGroup, SessionIndexFile, SESSION_INDEX_VERSION};
use time::{Date, OffsetDateTime};
use tokio::fs;
use tracing::debug;

use crate::atomic_file::write_json_atomic;
use crate::error::{Result, StorageError};

const GROUPS_SUBDIR: &str = "groups";
const GROUPS_FILENAME: &str = "sessions.json";
const MAX_RECORDINGS_PER_GROUP: usize = 1000;
const SAVE_COUNT_THRESHOLD: u64 = 100;
const SAVE_INTERVAL: Duration = Duration::from_secs(60);

struct Inner {
    groups: HashMap<String, SessionGroup>,
    session_to_group: HashMap<String, String>,
    recording_to_group: HashMap<String, String>,
    dirty: bool,
    writes_since_save: u64,
    last_saved: Instant,
}

/// Groups recordings into application-level sessions as they are written,
/// keyed by `Sentry-Trace` or a session uuid embedded in `user_id`.
pub struct SessionIndex {
    dir: PathBuf,
    inner: tokio::sync::RwLock<Inner>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionListFilter {
    pub page: u32,
    pub limit: u32,
    pub provider: Option<Provider>,
    pub from_date: Option<Date>,
    pub to_date: Option<Date>,
    pub has_errors: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct SessionListPage {
    pub groups: Vec<(String, SessionGroup)>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

impl SessionIndex {
    pub fn new(recordings_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: recordings_dir.into(),
            inner: tokio::sync::RwLock::new(Inner {
                groups: HashMap::new(),
                session_to_group: HashMap::new(),
                recording_to_group: HashMap::new(),
                dirty: false,
                writes_since_save: 0,
                last_saved: Instant::now(),
            }),
        }
    }

    fn file_path(&self) -> PathBuf {
        self.dir.join(GROUPS_SUBDIR).join(GROUPS_FILENAME)
    }

    pub async fn load(&self) -> Result<()> {
        let path = self.file_path();
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(StorageError::IndexRead {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        let file: SessionIndexFile = match serde_json::from_slice(&bytes) {
            Ok(file) if file.version == SESSION_INDEX_VERSION => file,
            Ok(_) => {
                debug!("session index version mismatch, starting empty (no migration)");
                return Ok(());
            }
            Err(source) => {
                return Err(StorageError::IndexMalformed {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        let mut inner = self.inner.write().await;
        inner.session_to_group.clear();
        inner.recording_to_group.clear();
        for (key, group) in &file.groups {
            if !group.session_id.is_empty() && !group.trace_id.is_empty() {
                inner.session_to_group.insert(group.session_id.clone(), key.clone());
            }
            for id in &group.recording_ids {
                inner.recording_to_group.insert(id.clone(), key.clone());
            }
        }
        inner.groups = file.groups.into_iter().collect();
        inner.dirty = false;
        Ok(())
    }

    pub async fn save(&self) -> Result<()> {
        let (groups, should_skip) = {
            let inner = self.inner.read().await;
            (inner.groups.clone(), !inner.dirty)
        };
        if should_skip {
            return Ok(());
        }

        let groups_dir = self.dir.join(GROUPS_SUBDIR);
        fs::create_dir_all(&groups_dir)
            .await
            .map_err(|source| StorageError::IndexWrite {
                path: groups_dir.display().to_string(),
                source,
            })?;

        let file = SessionIndexFile {
            version: SESSION_INDEX_VERSION.to_string(),
            generated_at: now(),
            total_groups: groups.len() as u64,
            groups: groups.into_iter().collect(),
        };

        let path = self.file_path();
        write_json_atomic(&path, &file)
            .await
            .map_err(|source| StorageError::IndexWrite {
                path: path.display().to_string(),
                source,
            })?;

        let mut inner = self.inner.write().await;
        inner.dirty = false;
        inner.writes_since_save = 0;
        inner.last_saved = Instant::now();
        Ok(())
    }

    /// True once `dirty` and either the write-count or wall-clock threshold
    /// has been crossed; the manager calls this opportunistically after
    /// every [`Self::add_recording`].
    pub async fn should_save(&self) -> bool {
        let inner = self.inner.read().await;
        inner.dirty
            && (inner.writes_since_save >= SAVE_COUNT_THRESHOLD
                || inner.last_saved.elapsed() >= SAVE_INTERVAL)
    }

    /// Classify and fold `rec` into its group, creating the bucket on first
    /// sight of a key. A silent no-op when neither a trace id nor a session
    /// id can be extracted.
    pub async fn add_recording(&self, rec: &Recording) -> Result<()> {
        let trace_id = extract_trace_id(&rec.request.headers);
        let session_id = extract_session_id(rec);

        let (key, key_is_trace) = match (trace_id.as_deref(), session_id.as_deref()) {
            (Some(t), _) if !t.is_empty() => (t.to_string(), true),
            (_, Some(s)) if !s.is_empty() => (s.to_string(), false),
            _ => return Ok(()),
        };

        let mut inner = self.inner.write().await;
        let timestamp = rec.timestamp;
        let group = inner
            .groups
            .entry(key.clone())
            .or_insert_with(|| SessionGroup::new(key_is_trace, &key, timestamp));

        if key_is_trace && group.session_id.is_empty() {
            if let Some(sid) = session_id.as_deref().filter(|s| !s.is_empty()) {
                group.session_id = sid.to_string();
                inner.session_to_group.insert(sid.to_string(), key.clone());
            }
        }

        if inner.groups.get(&key).unwrap().recording_ids.len() >= MAX_RECORDINGS_PER_GROUP {
            return Err(StorageError::GroupSizeExceeded {
                key,
                max: MAX_RECORDINGS_PER_GROUP,
            });
        }

        let group = inner.groups.get_mut(&key).unwrap();
        group.recording_ids.push(rec.id.clone());
        group.last_timestamp = rec.timestamp;
        group.request_count += 1;
        if !group.providers.contains(&rec.provider) {
            group.providers.push(rec.provider);
        }
        if rec.has_error() {
            group.has_errors = true;
        }

        inner.recording_to_group.insert(rec.id.clone(), key);
        inner.dirty = true;
        inner.writes_since_save += 1;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Option<SessionGroup> {
        self.inner.read().await.groups.get(key).cloned()
    }

    pub async fn group_key_for_recording(&self, recording_id: &str) -> Option<String> {
        self.inner.read().await.recording_to_group.get(recording_id).cloned()
    }

    pub async fn list(&self, filter: SessionListFilter) -> SessionListPage {
        let inner = self.inner.read().await;
        let mut matched: Vec<(String, SessionGroup)> = inner
            .groups
            .iter()
            .filter(|(_, g)| passes_filter(g, &filter))
            .map(|(k, g)| (k.clone(), g.clone()))
            .collect();

        matched.sort_by(|a, b| b.1.last_timestamp.cmp(&a.1.last_timestamp));

        let total = matched.len();
        let page = filter.page.max(1);
        let limit = filter.limit.max(1);
        let start = ((page - 1) as usize) * (limit as usize);
        let end = (start + limit as usize).min(total);
        let page_groups = if start < total { matched[start..end].to_vec() } else { Vec::new() };
        let has_more = end < total;

        SessionListPage {
            groups: page_groups,
            total,
            page,
            limit,
            has_more,
        }
    }
}

fn passes_filter(group: &SessionGroup, filter: &SessionListFilter) -> bool {
    if let Some(provider) = filter.provider {
        if !group.providers.contains(&provider) {
            return false;
        }
    }
    if let Some(from) = filter.from_date {
        if group.last_timestamp.date() < from {
            return false;
        }
    }
    if let Some(to) = filter.to_date {
        if group.first_timestamp.date() > to {
            return false;
        }
    }
    if let Some(has_errors) = filter.has_errors {
        if group.has_errors != has_errors {
            return false;
        }
    }
    true
}

/// First dash-separated segment of the case-insensitive `Sentry-Trace` header.
fn extract_trace_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get_first("Sentry-Trace")?;
    let segment = value.split('-').next()?;
    (!segment.is_empty()).then(|| segment.to_string())
}

/// `request.body.metadata.user_id`, split on the literal `_session_`, second segment.
fn extract_session_id(rec: &Recording) -> Option<String> {
    let body = rec.request.body.as_ref()?.as_json()?;
    let user_id = body.pointer("/metadata/user_id")?.as_str()?;
    let segment = user_id.split("_session_").nth(1)?;
    (!segment.is_empty()).then(|| segment.to_string())
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirra_model::{Body, RequestRecord, ResponseRecord, Timing};
    use time::macros::datetime;

    fn recording_with(headers: HeaderMap, body: Option<Body>, provider: Provider, status: u16) -> Recording {
        Recording {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: datetime!(2026-07-28 00:00:00 UTC),
            provider,
            request: RequestRecord {
                method: "POST".to_string(),
                path: "/v1/messages".to_string(),
                query: String::new(),
                headers,
                body,
            },
            response: ResponseRecord {
                status,
                headers: Default::default(),
                body: None,
                streaming: false,
            },
            response_size: 0,
            timing: Timing::new(
                datetime!(2026-07-28 00:00:00 UTC),
                datetime!(2026-07-28 00:00:00 UTC),
            ),
            error: None,
        }
    }

    #[test]
    fn extracts_trace_id_from_first_segment() {
        let mut headers = HeaderMap::new();
        headers.append("Sentry-Trace", "41cb435ca2a6434b913b733d81c463ae-span123");
        assert_eq!(
            extract_trace_id(&headers).as_deref(),
            Some("41cb435ca2a6434b913b733d81c463ae")
        );
    }

    #[test]
    fn extracts_session_id_from_user_id() {
        let body = Body::Json(serde_json::json!({
            "metadata": {"user_id": "user_abc_account_def_session_c593e22f-34d1-4dee-9937-d718f1e95aec"}
        }));
        let rec = recording_with(HeaderMap::new(), Some(body), Provider::Claude, 200);
        assert_eq!(
            extract_session_id(&rec).as_deref(),
            Some("c593e22f-34d1-4dee-9937-d718f1e95aec")
        );
    }

    #[tokio::test]
    async fn recordings_sharing_a_trace_id_land_in_one_group() {
        let dir = tempfile::tempdir().unwrap();
        let index = SessionIndex::new(dir.path());

        let mut headers = HeaderMap::new();
        headers.append("Sentry-Trace", "abcdefabcdefabcdefabcdefabcdefab-span1");

        let r1 = recording_with(headers.clone(), None, Provider::Claude, 200);
        let r2 = recording_with(headers.clone(), None, Provider::OpenAi, 500);

        index.add_recording(&r1).await.unwrap();
        index.add_recording(&r2).await.unwrap();

        let group = index.get("abcdefabcdefabcdefabcdefabcdefab").await.unwrap();
        assert_eq!(group.recording_ids, vec![r1.id.clone(), r2.id.clone()]);
        assert!(group.first_timestamp <= group.last_timestamp);
        assert_eq!(group.providers, vec![Provider::Claude, Provider::OpenAi]);
        assert!(group.has_errors);
    }

    #[tokio::test]
    async fn recording_without_trace_or_session_is_not_grouped() {
        let dir = tempfile::tempdir().unwrap();
        let index = SessionIndex::new(dir.path());
        let rec = recording_with(HeaderMap::new(), None, Provider::Claude, 200);
        index.add_recording(&rec).await.unwrap();
        assert!(index.group_key_for_recording(&rec.id).await.is_none());
    }

    #[tokio::test]
    async fn save_load_round_trip_preserves_groups() {
        let dir = tempfile::tempdir().unwrap();
        let index = SessionIndex::new(dir.path());
        let mut headers = HeaderMap::new();
        headers.append("Sentry-Trace", "abcdefabcdefabcdefabcdefabcdefab-span1");
        let r1 = recording_with(headers, None, Provider::Claude, 200);
        index.add_recording(&r1).await.unwrap();
        index.save().await.unwrap();

        let reloaded = SessionIndex::new(dir.path());
        reloaded.load().await.unwrap();
        let group = reloaded.get("abcdefabcdefabcdefabcdefabcdefab").await.unwrap();
        assert_eq!(group.recording_ids, vec![r1.id]);
    }
}
