//! Worker pool: dequeue finalized jobs, verify, move into durable storage,
//! resolve completion futures, and return admission slots.

use crate::checksum::{checksums_match, sha256_file};
use crate::job::{JobOutcome, UploadJob};
use crate::naming::{final_file_name, playback_url, sanitize_file_name};
use crate::pipeline::{IngestPipeline, IngestSettings};
use eyre::{Context, Result};
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Spawn the configured number of long-lived workers. Each runs until the
/// job queue is closed and drained.
pub fn spawn_workers(pipeline: &Arc<IngestPipeline>) -> Vec<JoinHandle<()>> {
    (0..pipeline.settings().worker_count)
        .map(|idx| {
            let pipeline = Arc::clone(pipeline);
            tokio::spawn(async move { run_worker(idx, pipeline).await })
        })
        .collect()
}

/// One worker loop. A failed job resolves its future with the failure and
/// the loop moves on; nothing here may tear the worker down.
pub async fn run_worker(idx: usize, pipeline: Arc<IngestPipeline>) {
    while let Some(job) = pipeline.queue.recv().await {
        info!(
            "worker {idx} processing job {} ({})",
            job.job_id, job.original_file_name
        );

        let outcome = match finalize_job(pipeline.settings(), &job).await {
            Ok(outcome) => {
                info!("worker {idx} finished job {}", job.job_id);
                outcome
            }
            Err(err) => {
                error!("worker {idx}: job {} failed: {err:#}", job.job_id);
                remove_stale_temp(&job).await;
                JobOutcome::failure(format!("Processing error: {err:#}"))
            }
        };

        let delivered = pipeline.registry.resolve(&job.job_id, outcome);
        if !delivered {
            debug!(
                "worker {idx}: no caller waiting on job {} (timed out or gone)",
                job.job_id
            );
        }
        pipeline.admission.release();
    }

    debug!("worker {idx} exiting: job queue closed");
}

/// Verify, move, and publish one job's payload.
///
/// A checksum mismatch is deliberately soft: it is logged and reported in the
/// message, but the job still completes and the file is still published.
async fn finalize_job(settings: &IngestSettings, job: &UploadJob) -> Result<JobOutcome> {
    let mut checksum_ok = true;
    if let Some(declared) = &job.declared_checksum {
        let actual = sha256_file(&job.temp_path).await?;
        checksum_ok = checksums_match(declared, &actual);
        if !checksum_ok {
            warn!(
                "checksum mismatch for job {}: declared {}, actual {}",
                job.job_id, declared, actual
            );
        }
    }

    let mut final_name = final_file_name(&job.job_id, &job.original_file_name);
    let mut final_path = settings.storage_dir.join(&final_name);
    if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
        // The uuid prefix makes this near-impossible; disambiguate anyway.
        final_name = format!(
            "{}_{}_{}",
            job.job_id,
            Uuid::new_v4().simple(),
            sanitize_file_name(&job.original_file_name)
        );
        final_path = settings.storage_dir.join(&final_name);
    }

    // Atomic only while temp and final paths share a filesystem; both live
    // under storage_dir, so a half-moved file is never visible to listings.
    tokio::fs::rename(&job.temp_path, &final_path)
        .await
        .with_context(|| {
            format!(
                "moving {} to {}",
                job.temp_path.display(),
                final_path.display()
            )
        })?;

    let message = if checksum_ok {
        "Uploaded".to_string()
    } else {
        "Uploaded (checksum mismatch)".to_string()
    };

    Ok(JobOutcome {
        success: true,
        message,
        playback_url: playback_url(&settings.public_base_url, &final_name),
    })
}

async fn remove_stale_temp(job: &UploadJob) {
    if let Err(err) = tokio::fs::remove_file(&job.temp_path).await {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(
                "failed to remove temp file {} for job {}: {}",
                job.temp_path.display(),
                job.job_id,
                err
            );
        }
    }
}
