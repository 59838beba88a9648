//! The ingest pipeline: admission gate, receive loop, queue hand-off, and the
//! completion-future race that produces the caller's response.
//!
//! `handle_upload` never returns an error: every failure mode is folded into
//! an `UploadResponse` value so the RPC layer stays a thin shim.

use crate::admission::AdmissionController;
use crate::generated::{upload_request, UploadRequest, UploadResponse};
use crate::queue::JobQueue;
use crate::receiver::{drain, MetadataOutcome, StreamReceiver};
use crate::registry::CompletionRegistry;
use futures::{Stream, StreamExt};
use log::{debug, warn};
use std::fmt::Display;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout;
use tonic::Status;

/// Resolved configuration the pipeline runs with. Produced by the daemon's
/// bootstrap from CLI flags and the optional config file.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub storage_dir: PathBuf,
    pub public_base_url: String,
    pub admission_capacity: usize,
    pub worker_count: usize,
    pub response_timeout: Duration,
}

impl IngestSettings {
    pub fn new(storage_dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            public_base_url: public_base_url.into(),
            admission_capacity: 10,
            worker_count: 4,
            response_timeout: Duration::from_secs(30),
        }
    }
}

pub struct IngestPipeline {
    pub(crate) settings: IngestSettings,
    pub(crate) admission: AdmissionController,
    pub(crate) queue: JobQueue,
    pub(crate) registry: CompletionRegistry,
}

impl IngestPipeline {
    pub fn new(settings: IngestSettings) -> Self {
        let admission = AdmissionController::new(settings.admission_capacity);
        Self {
            settings,
            admission,
            queue: JobQueue::new(),
            registry: CompletionRegistry::new(),
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Number of admission slots currently held.
    pub fn admitted_in_flight(&self) -> usize {
        self.admission.in_flight()
    }

    /// Number of registered, unresolved completion futures.
    pub fn pending_completions(&self) -> usize {
        self.registry.pending()
    }

    /// Stop accepting new jobs; uploads that finish receiving after this
    /// point fail their enqueue and unwind. Queued jobs still drain.
    pub fn shutdown(&self) {
        self.queue.close();
    }

    /// Terminate one client-streaming upload call and produce its response.
    pub async fn handle_upload<S>(&self, mut stream: S) -> UploadResponse
    where
        S: Stream<Item = Result<UploadRequest, Status>> + Unpin,
    {
        let mut receiver = StreamReceiver::new(&self.settings.storage_dir, &self.admission);

        loop {
            match stream.next().await {
                Some(Ok(request)) => match request.request {
                    Some(upload_request::Request::Metadata(metadata)) => {
                        match receiver.on_metadata(metadata).await {
                            Ok(MetadataOutcome::Admitted | MetadataOutcome::Ignored) => {}
                            Ok(MetadataOutcome::Rejected) => {
                                drain(&mut stream).await;
                                return queue_full_response();
                            }
                            Err(err) => {
                                receiver.abort().await;
                                return server_error_response(err);
                            }
                        }
                    }
                    Some(upload_request::Request::Chunk(chunk)) => {
                        if let Err(err) = receiver.on_chunk(&chunk).await {
                            receiver.abort().await;
                            return server_error_response(err);
                        }
                    }
                    None => {}
                },
                Some(Err(status)) => {
                    // Client cancelled or the transport failed mid-stream.
                    debug!("upload stream ended with error: {status}");
                    receiver.abort().await;
                    return server_error_response(status);
                }
                None => break,
            }
        }

        let job = match receiver.finish().await {
            Ok(Some(job)) => job,
            Ok(None) => {
                return failure_response("No metadata provided; upload not accepted.");
            }
            Err(err) => return server_error_response(err),
        };

        let job_id = job.job_id.clone();
        let completion = self.registry.register(&job_id);

        if let Err(rejected) = self.queue.enqueue(job) {
            // Shutdown race: fully unwind the admitted job.
            self.registry.remove(&job_id);
            if let Err(err) = tokio::fs::remove_file(&rejected.temp_path).await {
                warn!(
                    "failed to remove temp file {}: {}",
                    rejected.temp_path.display(),
                    err
                );
            }
            self.admission.release();
            return failure_response("Server is not accepting new jobs (shutting down).");
        }

        match timeout(self.settings.response_timeout, completion).await {
            Ok(Ok(outcome)) => UploadResponse {
                success: outcome.success,
                message: outcome.message,
                job_id,
                playback_url: outcome.playback_url,
            },
            Ok(Err(_)) => {
                // Registry entry dropped without a verdict; workers always
                // resolve, so this is a shutdown artifact.
                failure_response("Upload accepted but no result was produced.")
            }
            Err(_) => UploadResponse {
                // The worker still owns the job; it will resolve the unread
                // future and release the slot when it finishes.
                success: true,
                message: "Upload accepted; processing continues in background.".to_string(),
                job_id,
                playback_url: String::new(),
            },
        }
    }
}

/// Capacity rejection. Producers match on "full" to decide to back off.
fn queue_full_response() -> UploadResponse {
    failure_response("Upload queue is full; upload dropped.")
}

fn failure_response(message: impl Into<String>) -> UploadResponse {
    UploadResponse {
        success: false,
        message: message.into(),
        job_id: String::new(),
        playback_url: String::new(),
    }
}

fn server_error_response(err: impl Display) -> UploadResponse {
    failure_response(format!("Server error: {err:#}"))
}
