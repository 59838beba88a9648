//! Job and outcome types shared between the stream receiver and the workers.

use crate::generated::VideoMetadata;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use uuid::Uuid;

/// A fully-received upload awaiting finalization.
///
/// The job owns its temp file: exactly one worker dequeues the job and either
/// moves the file into durable storage or deletes it. A retried upload gets a
/// fresh `job_id` even though the producer reuses its `upload_id`.
#[derive(Debug)]
pub struct UploadJob {
    pub job_id: String,
    pub temp_path: PathBuf,
    pub original_file_name: String,
    pub declared_checksum: Option<String>,
    pub producer_id: String,
    pub size_bytes: u64,
    pub received_at: DateTime<Utc>,
}

impl UploadJob {
    pub fn new(temp_path: PathBuf, metadata: &VideoMetadata, size_bytes: u64) -> Self {
        let declared_checksum = if metadata.checksum_sha256.is_empty() {
            None
        } else {
            Some(metadata.checksum_sha256.clone())
        };

        Self {
            job_id: Uuid::new_v4().simple().to_string(),
            temp_path,
            original_file_name: metadata.file_name.clone(),
            declared_checksum,
            producer_id: metadata.producer_id.clone(),
            size_bytes,
            received_at: Utc::now(),
        }
    }
}

/// Verdict a worker produces for one job, delivered through the completion
/// registry to the call that accepted the upload (if it is still waiting).
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub success: bool,
    pub message: String,
    pub playback_url: String,
}

impl JobOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            playback_url: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(checksum: &str) -> VideoMetadata {
        VideoMetadata {
            file_name: "clip.mp4".into(),
            file_type: "mp4".into(),
            file_size_bytes: 42,
            upload_id: "upload-1".into(),
            checksum_sha256: checksum.into(),
            producer_id: "producer-1".into(),
            timestamp_unix: 0,
        }
    }

    #[test]
    fn empty_checksum_becomes_none() {
        let job = UploadJob::new(PathBuf::from("/tmp/x.part"), &metadata(""), 42);
        assert!(job.declared_checksum.is_none());

        let job = UploadJob::new(PathBuf::from("/tmp/x.part"), &metadata("abc123"), 42);
        assert_eq!(job.declared_checksum.as_deref(), Some("abc123"));
    }

    #[test]
    fn job_ids_are_unique_per_job() {
        let a = UploadJob::new(PathBuf::from("/tmp/a.part"), &metadata(""), 1);
        let b = UploadJob::new(PathBuf::from("/tmp/b.part"), &metadata(""), 1);
        assert_ne!(a.job_id, b.job_id);
    }
}
