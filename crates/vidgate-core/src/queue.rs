//! Competing-consumers queue of finalized-but-unprocessed upload jobs.
//!
//! Unbounded by design: admission already caps how many jobs can exist at
//! once, so the queue never holds more than the admission capacity in steady
//! state. Workers share one receiver tail; each job is delivered to exactly
//! one worker, at most once.

use crate::job::UploadJob;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;

pub struct JobQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<UploadJob>>>,
    rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<UploadJob>>>,
}

impl JobQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Arc::new(AsyncMutex::new(rx)),
        }
    }

    /// Enqueue a job for processing. On failure (queue closed during
    /// shutdown) the job is handed back so the caller can unwind it.
    pub fn enqueue(&self, job: UploadJob) -> Result<(), UploadJob> {
        let guard = self.tx.lock();
        match guard.as_ref() {
            Some(tx) => tx.send(job).map_err(|err| err.0),
            None => Err(job),
        }
    }

    /// Wait for the next job. Returns `None` once the queue is closed and
    /// fully drained; workers exit their loop at that point.
    pub async fn recv(&self) -> Option<UploadJob> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Stop accepting new jobs. Jobs already enqueued still drain.
    pub fn close(&self) {
        self.tx.lock().take();
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generated::VideoMetadata;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn job(name: &str) -> UploadJob {
        let metadata = VideoMetadata {
            file_name: name.into(),
            ..Default::default()
        };
        UploadJob::new(PathBuf::from(format!("/tmp/{name}.part")), &metadata, 0)
    }

    #[tokio::test]
    async fn each_job_is_delivered_to_exactly_one_consumer() {
        let queue = Arc::new(JobQueue::new());
        for i in 0..20 {
            queue.enqueue(job(&format!("file-{i}"))).unwrap();
        }
        queue.close();

        let mut consumers = Vec::new();
        for _ in 0..3 {
            let queue = Arc::clone(&queue);
            consumers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(job) = queue.recv().await {
                    seen.push(job.original_file_name);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for consumer in consumers {
            all.extend(consumer.await.unwrap());
        }

        assert_eq!(all.len(), 20);
        let unique: HashSet<_> = all.into_iter().collect();
        assert_eq!(unique.len(), 20);
    }

    #[tokio::test]
    async fn enqueue_fails_after_close_but_queued_jobs_drain() {
        let queue = JobQueue::new();
        queue.enqueue(job("early")).unwrap();
        queue.close();

        let rejected = queue.enqueue(job("late")).unwrap_err();
        assert_eq!(rejected.original_file_name, "late");

        let drained = queue.recv().await.unwrap();
        assert_eq!(drained.original_file_name, "early");
        assert!(queue.recv().await.is_none());
    }
}
