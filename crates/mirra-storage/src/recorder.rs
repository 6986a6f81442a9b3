use std::path::PathBuf;
use std::sync::Arc;

use mirra_model::{IndexEntry, Recording};
use time::OffsetDateTime;
use time::macros::format_description;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::error::Result;
use crate::offset_index::OffsetIndex;
use crate::session_index::SessionIndex;

const QUEUE_DEPTH: usize = 100;

/// Handle producers hold to hand off a finished [`Recording`] to the writer
/// task. Cloning is cheap (it is just a channel sender).
#[derive(Clone)]
pub struct Recorder {
    sender: mpsc::Sender<Recording>,
}

impl Recorder {
    /// Start the single writer task and return a handle plus its join
    /// handle. Dropping every clone of the returned `Recorder` closes the
    /// channel, which lets the writer drain and shut down.
    pub fn spawn(
        dir: impl Into<PathBuf>,
        offset_index: Arc<OffsetIndex>,
        session_index: Arc<SessionIndex>,
    ) -> (Self, JoinHandle<Result<()>>) {
        let (sender, receiver) = mpsc::channel(QUEUE_DEPTH);
        let handle = tokio::spawn(run_writer(dir.into(), offset_index, session_index, receiver));
        (Self { sender }, handle)
    }

    /// Build a `Recorder` directly from a sender, bypassing `spawn`'s writer
    /// task. Exists for tests that only need to observe backpressure or
    /// drive the proxy's response-draining task without a real writer loop.
    pub fn from_sender(sender: mpsc::Sender<Recording>) -> Self {
        Self { sender }
    }

    /// Hand a finished recording to the writer. Never blocks the caller: a
    /// full queue drops the recording and logs a warning, matching the
    /// requirement that the client is never delayed by recording.
    pub fn record(&self, recording: Recording) {
        match self.sender.try_send(recording) {
            Ok(()) => {}
            Err(TrySendError::Full(rec)) => {
                warn!(id = %rec.id, "recorder queue full, dropping recording");
            }
            Err(TrySendError::Closed(rec)) => {
                warn!(id = %rec.id, "recorder queue closed, dropping recording");
            }
        }
    }
}

async fn run_writer(
    dir: PathBuf,
    offset_index: Arc<OffsetIndex>,
    session_index: Arc<SessionIndex>,
    mut receiver: mpsc::Receiver<Recording>,
) -> Result<()> {
    if let Err(err) = tokio::fs::create_dir_all(&dir).await {
        error!(dir = %dir.display(), error = %err, "failed to create recordings directory, recorder exiting");
        return Ok(());
    }

    while let Some(recording) = receiver.recv().await {
        write_one(&dir, &offset_index, &recording).await;

        if let Err(err) = session_index.add_recording(&recording).await {
            warn!(id = %recording.id, error = %err, "session grouping skipped for recording");
        }
        if session_index.should_save().await {
            if let Err(err) = session_index.save().await {
                error!(error = %err, "failed to save session index");
            }
        }
    }

    // Channel closed: drain whatever arrived between the last recv and
    // close, then flush both indexes. A failed index flush here is the one
    // error this task surfaces to its caller.
    while let Ok(recording) = receiver.try_recv() {
        write_one(&dir, &offset_index, &recording).await;
        let _ = session_index.add_recording(&recording).await;
    }

    session_index.save().await.ok();
    offset_index.save().await?;
    Ok(())
}

/// Append one recording to its day file and register it with the offset
/// index. Failures are logged and swallowed: per the recorder's failure
/// semantics, a write error loses the recording for readers rather than
/// blocking or retrying.
async fn write_one(dir: &std::path::Path, offset_index: &OffsetIndex, recording: &Recording) {
    let filename = day_filename(OffsetDateTime::now_utc());
    let path = dir.join(&filename);

    let mut line = match serde_json::to_vec(recording) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(id = %recording.id, error = %err, "failed to serialize recording, dropping");
            return;
        }
    };
    let length = line.len() as u64;
    line.push(b'\n');

    let result: std::io::Result<u64> = async {
        let mut file = OpenOptions::new().create(true).append(true).open(&path).await?;
        let offset = file.metadata().await?.len();
        file.write_all(&line).await?;
        Ok(offset)
    }
    .await;

    match result {
        Ok(offset) => {
            offset_index
                .add(IndexEntry {
                    id: recording.id.clone(),
                    filename,
                    offset,
                    length,
                    timestamp: recording.timestamp,
                    provider: recording.provider,
                })
                .await;
        }
        Err(err) => {
            error!(id = %recording.id, filename = %filename, error = %err, "failed to append recording, index and grouping skipped");
        }
    }
}

fn day_filename(now: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day]");
    format!("recordings-{}.jsonl", now.format(&format).expect("static format never fails"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirra_model::{Body, Provider, RequestRecord, ResponseRecord, Timing};
    use time::macros::datetime;
    use tokio::time::{sleep, Duration};

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

    #[tokio::test]
    async fn recorded_entry_is_retrievable_through_offset_index() {
        let dir = tempfile::tempdir().unwrap();
        let offset_index = Arc::new(OffsetIndex::new(dir.path()));
        let session_index = Arc::new(SessionIndex::new(dir.path()));
        let (recorder, handle) = Recorder::spawn(dir.path(), offset_index.clone(), session_index.clone());

        let rec = sample("20260728-writer-test");
        recorder.record(rec.clone());

        // Give the writer task a chance to drain the channel.
        for _ in 0..50 {
            if offset_index.lookup(&rec.id).await.is_some() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        let found = offset_index.read_recording(&rec.id).await.unwrap();
        assert_eq!(found, rec);

        drop(recorder);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let offset_index = Arc::new(OffsetIndex::new(dir.path()));
        let session_index = Arc::new(SessionIndex::new(dir.path()));
        let (sender, _receiver) = mpsc::channel::<Recording>(1);
        let _ = (offset_index, session_index);
        let recorder = Recorder { sender };

        // First send fills the depth-1 channel; nothing is consuming it, so
        // the second send must return immediately rather than block.
        recorder.record(sample("20260728-a"));
        recorder.record(sample("20260728-b"));
    }
}
