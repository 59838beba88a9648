//! Per-call receive state machine for the upload stream.
//!
//! One `StreamReceiver` exists per inbound `UploadVideo` call and moves
//! through `AwaitingMetadata -> Receiving -> done`, with rejection and abort
//! exits along the way. Transitions are explicit so every cleanup path (slot
//! release, temp-file deletion) can be exercised directly in tests; the
//! surrounding drive loop lives in [`crate::pipeline`].

use crate::admission::AdmissionController;
use crate::generated::{UploadRequest, VideoMetadata};
use crate::job::UploadJob;
use crate::TEMP_SUFFIX;
use eyre::{Context, Result};
use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tonic::Status;
use uuid::Uuid;

pub(crate) struct StreamReceiver<'a> {
    storage_dir: &'a Path,
    admission: &'a AdmissionController,
    state: State,
}

enum State {
    AwaitingMetadata,
    Receiving(Active),
    Closed,
}

struct Active {
    metadata: VideoMetadata,
    temp_path: PathBuf,
    file: File,
    bytes_written: u64,
}

/// Result of feeding a metadata message into the state machine.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum MetadataOutcome {
    /// Slot reserved, temp file open; chunks will be written from here on.
    Admitted,
    /// No slot free. The caller drains the rest of the stream and reports
    /// the capacity rejection; no temp file was created.
    Rejected,
    /// Metadata arrived while already receiving (or after close); ignored.
    Ignored,
}

impl<'a> StreamReceiver<'a> {
    pub(crate) fn new(storage_dir: &'a Path, admission: &'a AdmissionController) -> Self {
        Self {
            storage_dir,
            admission,
            state: State::AwaitingMetadata,
        }
    }

    pub(crate) async fn on_metadata(
        &mut self,
        metadata: VideoMetadata,
    ) -> Result<MetadataOutcome> {
        match self.state {
            State::Receiving(_) => {
                debug!("duplicate metadata mid-stream; ignoring");
                Ok(MetadataOutcome::Ignored)
            }
            State::Closed => Ok(MetadataOutcome::Ignored),
            State::AwaitingMetadata => {
                if !self.admission.try_acquire() {
                    warn!(
                        "dropping upload from producer {} for {}: queue full",
                        metadata.producer_id, metadata.file_name
                    );
                    self.state = State::Closed;
                    return Ok(MetadataOutcome::Rejected);
                }

                match open_temp_file(self.storage_dir).await {
                    Ok((temp_path, file)) => {
                        info!(
                            "accepted upload from producer {} for {}; slot reserved",
                            metadata.producer_id, metadata.file_name
                        );
                        self.state = State::Receiving(Active {
                            metadata,
                            temp_path,
                            file,
                            bytes_written: 0,
                        });
                        Ok(MetadataOutcome::Admitted)
                    }
                    Err(err) => {
                        self.admission.release();
                        self.state = State::Closed;
                        Err(err)
                    }
                }
            }
        }
    }

    pub(crate) async fn on_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        match &mut self.state {
            State::AwaitingMetadata => {
                debug!("chunk received before metadata; ignoring");
                Ok(())
            }
            State::Closed => Ok(()),
            State::Receiving(active) => {
                active
                    .file
                    .write_all(chunk)
                    .await
                    .with_context(|| {
                        format!("writing chunk to {}", active.temp_path.display())
                    })?;
                active.bytes_written += chunk.len() as u64;
                Ok(())
            }
        }
    }

    /// Stream ended normally: flush and close the temp file and hand back the
    /// job. `None` when the call was never admitted (no metadata, or
    /// rejected). On flush failure the temp file and slot are cleaned up here.
    pub(crate) async fn finish(&mut self) -> Result<Option<UploadJob>> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::AwaitingMetadata | State::Closed => Ok(None),
            State::Receiving(mut active) => {
                let flushed = flush_temp_file(&mut active.file).await;
                drop(active.file);
                if let Err(err) = flushed {
                    remove_temp_file(&active.temp_path).await;
                    self.admission.release();
                    return Err(err.wrap_err(format!(
                        "finalizing temp file {}",
                        active.temp_path.display()
                    )));
                }

                let job = UploadJob::new(active.temp_path, &active.metadata, active.bytes_written);
                Ok(Some(job))
            }
        }
    }

    /// Unwind after any mid-stream failure (transport error, client
    /// cancellation, write error): delete the partial temp file and return
    /// the admission slot. Safe to call in any state.
    pub(crate) async fn abort(&mut self) {
        if let State::Receiving(active) = std::mem::replace(&mut self.state, State::Closed) {
            drop(active.file);
            remove_temp_file(&active.temp_path).await;
            self.admission.release();
        }
    }
}

async fn open_temp_file(storage_dir: &Path) -> Result<(PathBuf, File)> {
    tokio::fs::create_dir_all(storage_dir)
        .await
        .with_context(|| format!("creating storage directory {}", storage_dir.display()))?;

    let temp_path = storage_dir.join(format!("tmp_{}{}", Uuid::new_v4().simple(), TEMP_SUFFIX));
    // create_new: a name collision means id generation broke; fail loudly
    // rather than appending to another call's payload.
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("creating temp file {}", temp_path.display()))?;

    Ok((temp_path, file))
}

async fn flush_temp_file(file: &mut File) -> Result<()> {
    file.flush().await.context("flushing temp file")?;
    file.sync_all().await.context("syncing temp file")?;
    Ok(())
}

async fn remove_temp_file(temp_path: &Path) {
    if let Err(err) = tokio::fs::remove_file(temp_path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!("failed to remove temp file {}: {}", temp_path.display(), err);
        }
    }
}

/// Consume and discard the remainder of a rejected stream so the client can
/// finish writing without a transport error masking the response.
pub(crate) async fn drain<S>(stream: &mut S)
where
    S: Stream<Item = Result<UploadRequest, Status>> + Unpin,
{
    while let Some(message) = stream.next().await {
        if message.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(name: &str) -> VideoMetadata {
        VideoMetadata {
            file_name: name.into(),
            producer_id: "producer-1".into(),
            ..Default::default()
        }
    }

    fn part_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.to_string_lossy().ends_with(TEMP_SUFFIX))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn rejection_creates_no_temp_file_and_holds_no_slot() {
        let dir = tempfile::tempdir().unwrap();
        let admission = AdmissionController::new(0);
        let mut receiver = StreamReceiver::new(dir.path(), &admission);

        let outcome = receiver.on_metadata(metadata("clip.mp4")).await.unwrap();
        assert_eq!(outcome, MetadataOutcome::Rejected);
        assert!(part_files(dir.path()).is_empty());
        assert_eq!(admission.in_flight(), 0);
        assert!(receiver.finish().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chunks_before_metadata_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let admission = AdmissionController::new(1);
        let mut receiver = StreamReceiver::new(dir.path(), &admission);

        receiver.on_chunk(b"orphan bytes").await.unwrap();
        receiver.on_metadata(metadata("clip.mp4")).await.unwrap();
        receiver.on_chunk(b"counted").await.unwrap();

        let job = receiver.finish().await.unwrap().unwrap();
        assert_eq!(job.size_bytes, "counted".len() as u64);
    }

    #[tokio::test]
    async fn duplicate_metadata_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let admission = AdmissionController::new(2);
        let mut receiver = StreamReceiver::new(dir.path(), &admission);

        assert_eq!(
            receiver.on_metadata(metadata("first.mp4")).await.unwrap(),
            MetadataOutcome::Admitted
        );
        assert_eq!(
            receiver.on_metadata(metadata("second.mp4")).await.unwrap(),
            MetadataOutcome::Ignored
        );

        // Only one slot held, one temp file open, first metadata wins.
        assert_eq!(admission.in_flight(), 1);
        assert_eq!(part_files(dir.path()).len(), 1);
        let job = receiver.finish().await.unwrap().unwrap();
        assert_eq!(job.original_file_name, "first.mp4");
    }

    #[tokio::test]
    async fn abort_deletes_partial_file_and_releases_slot() {
        let dir = tempfile::tempdir().unwrap();
        let admission = AdmissionController::new(1);
        let mut receiver = StreamReceiver::new(dir.path(), &admission);

        receiver.on_metadata(metadata("clip.mp4")).await.unwrap();
        receiver.on_chunk(b"partial payload").await.unwrap();
        assert_eq!(part_files(dir.path()).len(), 1);

        receiver.abort().await;
        assert!(part_files(dir.path()).is_empty());
        assert_eq!(admission.in_flight(), 0);

        // The freed slot is immediately reusable.
        assert!(admission.try_acquire());
    }

    #[tokio::test]
    async fn finish_hands_over_job_and_keeps_slot_held() {
        let dir = tempfile::tempdir().unwrap();
        let admission = AdmissionController::new(1);
        let mut receiver = StreamReceiver::new(dir.path(), &admission);

        receiver.on_metadata(metadata("clip.mp4")).await.unwrap();
        receiver.on_chunk(b"hello ").await.unwrap();
        receiver.on_chunk(b"world").await.unwrap();

        let job = receiver.finish().await.unwrap().unwrap();
        assert_eq!(job.size_bytes, 11);
        assert!(job.temp_path.exists());
        // Slot ownership transferred to the job; release happens downstream.
        assert_eq!(admission.in_flight(), 1);

        let contents = std::fs::read(&job.temp_path).unwrap();
        assert_eq!(contents, b"hello world");
    }
}
