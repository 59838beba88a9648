//! Client side of the upload protocol: chunked streaming with
//! exponential-backoff retries.
//!
//! One logical file keeps one `upload_id` across every retry attempt, so the
//! server side (or anything layered above it) can detect re-sends. Retries
//! happen for capacity rejections (response message containing "full") and
//! for resource-exhausted/unavailable transport errors; anything else is
//! terminal.

use crate::checksum::sha256_file;
use crate::generated::video_upload_client::VideoUploadClient;
use crate::generated::{upload_request, UploadRequest, UploadResponse, VideoMetadata};
use chrono::Utc;
use eyre::{eyre, Context, Result};
use log::{info, warn};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Code, Status};
use uuid::Uuid;

/// Practical fragment size for chunk messages.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Upload one file, retrying with exponential backoff where the protocol
/// invites it. Returns the terminal response; `Err` means a local I/O or
/// non-retryable transport failure.
pub async fn upload_with_retries(
    client: &mut VideoUploadClient<Channel>,
    path: &Path,
    producer_id: &str,
    chunk_size: usize,
    max_retries: u32,
) -> Result<UploadResponse> {
    let upload_id = Uuid::new_v4().to_string();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match upload_file(client, path, producer_id, &upload_id, chunk_size).await {
            Ok(response) => {
                if response.success || !should_back_off(&response.message) || attempt >= max_retries
                {
                    return Ok(response);
                }
                let delay = backoff_delay(attempt);
                info!(
                    "queue full for {}; retrying in {}s (attempt {attempt}/{max_retries})",
                    path.display(),
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                let retryable = err
                    .downcast_ref::<Status>()
                    .map(|status| {
                        matches!(status.code(), Code::ResourceExhausted | Code::Unavailable)
                    })
                    .unwrap_or(false);
                if !retryable || attempt >= max_retries {
                    return Err(err);
                }
                let delay = backoff_delay(attempt);
                warn!(
                    "transport rejected {}; backing off {}s (attempt {attempt}/{max_retries})",
                    path.display(),
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Single upload attempt: metadata first, then the file in chunks.
pub async fn upload_file(
    client: &mut VideoUploadClient<Channel>,
    path: &Path,
    producer_id: &str,
    upload_id: &str,
    chunk_size: usize,
) -> Result<UploadResponse> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| eyre!("{} has no file name", path.display()))?;
    let file_size = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("reading metadata for {}", path.display()))?
        .len();
    let checksum = sha256_file(path).await?;

    let metadata = VideoMetadata {
        file_type: Path::new(&file_name)
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_name,
        file_size_bytes: file_size as i64,
        upload_id: upload_id.to_string(),
        checksum_sha256: checksum,
        producer_id: producer_id.to_string(),
        timestamp_unix: Utc::now().timestamp(),
    };

    let (tx, rx) = mpsc::channel::<UploadRequest>(8);
    let feed_path = path.to_path_buf();
    let feeder = tokio::spawn(async move {
        let metadata_msg = UploadRequest {
            request: Some(upload_request::Request::Metadata(metadata)),
        };
        if tx.send(metadata_msg).await.is_err() {
            return Ok(());
        }

        let mut file = File::open(&feed_path)
            .await
            .with_context(|| format!("opening {}", feed_path.display()))?;
        let mut buf = vec![0u8; chunk_size];
        loop {
            let read = file
                .read(&mut buf)
                .await
                .with_context(|| format!("reading {}", feed_path.display()))?;
            if read == 0 {
                break;
            }
            let chunk = UploadRequest {
                request: Some(upload_request::Request::Chunk(buf[..read].to_vec())),
            };
            if tx.send(chunk).await.is_err() {
                // Server hung up; its response says why.
                break;
            }
        }
        Ok::<(), eyre::Report>(())
    });

    let response = client.upload_video(ReceiverStream::new(rx)).await;

    match feeder.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(err.wrap_err("streaming file to server")),
        Err(join_err) => return Err(eyre!("upload feeder task failed: {join_err}")),
    }

    // Kept as a bare Status so retry classification can downcast it.
    let response = response.map_err(eyre::Report::new)?;
    Ok(response.into_inner())
}

/// A response message containing "full" (case-insensitive) is the server's
/// back-off-and-retry signal.
pub fn should_back_off(message: &str) -> bool {
    message.to_ascii_lowercase().contains("full")
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt))
}
