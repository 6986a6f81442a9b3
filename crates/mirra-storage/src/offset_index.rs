use std::collections::HashMap;
use std::path::{Path, PathBuf};

use mirra_model::{IndexEntry, Recording};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};
use tracing::{debug, warn};

use crate::atomic_file::write_json_atomic;
use crate::error::{Result, StorageError};

const INDEX_FILENAME: &str = "index.json";

struct Inner {
    entries: HashMap<String, IndexEntry>,
    dirty: bool,
}

/// `id -> (file, offset, length, timestamp, provider)` lookup over the
/// append-only recording files, persisted as `index.json`.
///
/// Adds, reads, rebuilds, and saves are all serialized through one
/// reader-writer lock: concurrent reads proceed freely, but a rebuild or
/// save excludes everything else while it runs.
pub struct OffsetIndex {
    dir: PathBuf,
    inner: tokio::sync::RwLock<Inner>,
}

impl OffsetIndex {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            inner: tokio::sync::RwLock::new(Inner {
                entries: HashMap::new(),
                dirty: false,
            }),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILENAME)
    }

    /// Load `index.json` into memory. A missing file starts empty; a
    /// malformed file is the caller's cue to trigger [`Self::rebuild`].
    pub async fn load(&self) -> Result<()> {
        let path = self.index_path();
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no index file yet, starting empty");
                return Ok(());
            }
            Err(source) => {
                return Err(StorageError::IndexRead {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        let entries: Vec<IndexEntry> =
            serde_json::from_slice(&bytes).map_err(|source| StorageError::IndexMalformed {
                path: path.display().to_string(),
                source,
            })?;

        let mut inner = self.inner.write().await;
        inner.entries = entries.into_iter().map(|e| (e.id.clone(), e)).collect();
        inner.dirty = false;
        Ok(())
    }

    /// Persist the in-memory map if it has changed since the last save.
    pub async fn save(&self) -> Result<()> {
        let snapshot = {
            let inner = self.inner.read().await;
            if !inner.dirty {
                return Ok(());
            }
            let mut entries: Vec<IndexEntry> = inner.entries.values().cloned().collect();
            entries.sort_by(|a, b| a.id.cmp(&b.id));
            entries
        };

        let path = self.index_path();
        write_json_atomic(&path, &snapshot)
            .await
            .map_err(|source| StorageError::IndexWrite {
                path: path.display().to_string(),
                source,
            })?;

        self.inner.write().await.dirty = false;
        Ok(())
    }

    /// Insert a new locator. Called once per recording, by the recorder
    /// worker, immediately after the append succeeds.
    pub async fn add(&self, entry: IndexEntry) {
        let mut inner = self.inner.write().await;
        inner.entries.insert(entry.id.clone(), entry);
        inner.dirty = true;
    }

    /// Rebuild the whole index by scanning every `recordings-*.jsonl` file
    /// in the directory. Idempotent: running it twice in a row produces the
    /// same map, since it always replaces rather than merges.
    pub async fn rebuild(&self) -> Result<()> {
        let mut entries = HashMap::new();
        let mut read_dir = fs::read_dir(&self.dir)
            .await
            .map_err(|source| StorageError::IndexRead {
                path: self.dir.display().to_string(),
                source,
            })?;

        let mut filenames = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(|source| StorageError::IndexRead {
            path: self.dir.display().to_string(),
            source,
        })? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("recordings-") && name.ends_with(".jsonl") {
                filenames.push(name);
            }
        }
        filenames.sort();

        for filename in filenames {
            rebuild_one_file(&self.dir, &filename, &mut entries).await?;
        }

        let mut inner = self.inner.write().await;
        inner.entries = entries;
        inner.dirty = true;
        Ok(())
    }

    /// Exact id match, falling back to the first entry whose id starts with
    /// `id_or_prefix` (insertion order is not guaranteed across a rebuild,
    /// so "first" only matters when the prefix is genuinely ambiguous).
    pub async fn lookup(&self, id_or_prefix: &str) -> Option<IndexEntry> {
        let inner = self.inner.read().await;
        if let Some(entry) = inner.entries.get(id_or_prefix) {
            return Some(entry.clone());
        }
        inner
            .entries
            .values()
            .find(|e| e.id.starts_with(id_or_prefix))
            .cloned()
    }

    /// Look up `id_or_prefix` and read the exact recording line it points to.
    pub async fn read_recording(&self, id_or_prefix: &str) -> Result<Recording> {
        let entry = self
            .lookup(id_or_prefix)
            .await
            .ok_or_else(|| StorageError::NotFound {
                id: id_or_prefix.to_string(),
            })?;

        let path = self.dir.join(&entry.filename);
        let mut file = fs::File::open(&path)
            .await
            .map_err(|source| StorageError::IndexRead {
                path: path.display().to_string(),
                source,
            })?;
        file.seek(SeekFrom::Start(entry.offset))
            .await
            .map_err(|source| StorageError::IndexRead {
                path: path.display().to_string(),
                source,
            })?;

        let mut buf = vec![0u8; entry.length as usize];
        file.read_exact(&mut buf)
            .await
            .map_err(|source| StorageError::IndexRead {
                path: path.display().to_string(),
                source,
            })?;

        serde_json::from_slice(&buf).map_err(|source| StorageError::IndexMalformed {
            path: path.display().to_string(),
            source,
        })
    }
}

async fn rebuild_one_file(
    dir: &Path,
    filename: &str,
    entries: &mut HashMap<String, IndexEntry>,
) -> Result<()> {
    let path = dir.join(filename);
    let contents = fs::read(&path).await.map_err(|source| StorageError::IndexRead {
        path: path.display().to_string(),
        source,
    })?;

    let mut offset: u64 = 0;
    for line in contents.split(|b| *b == b'\n') {
        let line_len = line.len() as u64;
        if line.is_empty() {
            continue;
        }
        match parse_prefix(line) {
            Ok((id, timestamp, provider)) => {
                entries.insert(
                    id.clone(),
                    IndexEntry {
                        id,
                        filename: filename.to_string(),
                        offset,
                        length: line_len,
                        timestamp,
                        provider,
                    },
                );
            }
            Err(err) => {
                warn!(file = %filename, offset, error = %err, "skipping malformed line during rebuild");
            }
        }
        offset += line_len + 1;
    }
    Ok(())
}

#[derive(serde::Deserialize)]
struct LinePrefix {
    id: String,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: time::OffsetDateTime,
    provider: mirra_model::Provider,
}

fn parse_prefix(line: &[u8]) -> std::result::Result<(String, time::OffsetDateTime, mirra_model::Provider), serde_json::Error> {
    let prefix: LinePrefix = serde_json::from_slice(line)?;
    Ok((prefix.id, prefix.timestamp, prefix.provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirra_model::{Body, Provider, Recording, RequestRecord, ResponseRecord, Timing};
    use time::macros::datetime;
    use tokio::io::AsyncWriteExt;

    fn sample(id: &str) -> Recording {
        Recording {
            id: id.to_string(),
            timestamp: datetime!(2026-07-28 00:00:00 UTC),
            provider: Provider::Claude,
            request: RequestRecord {
                method: "POST".to_string(),
                path: "/v1/messages".to_string(),
                query: String::new(),
                headers: Default::default(),
                body: Some(Body::Text("{}".to_string())),
            },
            response: ResponseRecord {
                status: 200,
                headers: Default::default(),
                body: Some(Body::Text("ok".to_string())),
                streaming: false,
            },
            response_size: 2,
            timing: Timing::new(
                datetime!(2026-07-28 00:00:00 UTC),
                datetime!(2026-07-28 00:00:01 UTC),
            ),
            error: None,
        }
    }

    async fn write_day_file(dir: &Path, filename: &str, recordings: &[Recording]) {
        let mut file = fs::File::create(dir.join(filename)).await.unwrap();
        for rec in recordings {
            let mut line = serde_json::to_vec(rec).unwrap();
            line.push(b'\n');
            file.write_all(&line).await.unwrap();
        }
    }

    #[tokio::test]
    async fn rebuild_round_trips_three_recordings() {
        let dir = tempfile::tempdir().unwrap();
        let recordings = vec![sample("20260728-r1"), sample("20260728-r2"), sample("20260728-r3")];
        write_day_file(dir.path(), "recordings-2026-07-28.jsonl", &recordings).await;

        let index = OffsetIndex::new(dir.path());
        index.rebuild().await.unwrap();

        for rec in &recordings {
            let read_back = index.read_recording(&rec.id).await.unwrap();
            assert_eq!(&read_back, rec);
        }
    }

    #[tokio::test]
    async fn rebuild_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let recordings = vec![sample("20260728-r1"), sample("20260728-r2")];
        write_day_file(dir.path(), "recordings-2026-07-28.jsonl", &recordings).await;

        let index = OffsetIndex::new(dir.path());
        index.rebuild().await.unwrap();
        let first: Vec<IndexEntry> = {
            let inner = index.inner.read().await;
            let mut v: Vec<_> = inner.entries.values().cloned().collect();
            v.sort_by(|a, b| a.id.cmp(&b.id));
            v
        };

        index.rebuild().await.unwrap();
        let second: Vec<IndexEntry> = {
            let inner = index.inner.read().await;
            let mut v: Vec<_> = inner.entries.values().cloned().collect();
            v.sort_by(|a, b| a.id.cmp(&b.id));
            v
        };

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn rebuild_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let recordings = vec![sample("20260728-r1")];
        write_day_file(dir.path(), "recordings-2026-07-28.jsonl", &recordings).await;

        let index = OffsetIndex::new(dir.path());
        index.rebuild().await.unwrap();
        index.save().await.unwrap();

        let reloaded = OffsetIndex::new(dir.path());
        reloaded.load().await.unwrap();
        assert_eq!(
            reloaded.lookup("20260728-r1").await,
            index.lookup("20260728-r1").await
        );
    }

    #[tokio::test]
    async fn lookup_matches_unique_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let recordings = vec![sample("20260728-aaaaaaaa-1111-2222-3333-444444444444")];
        write_day_file(dir.path(), "recordings-2026-07-28.jsonl", &recordings).await;

        let index = OffsetIndex::new(dir.path());
        index.rebuild().await.unwrap();

        let found = index.lookup("20260728-").await.unwrap();
        assert_eq!(found.id, recordings[0].id);
    }
}
