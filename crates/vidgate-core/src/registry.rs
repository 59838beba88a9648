//! Completion registry: single-assignment futures keyed by job id.
//!
//! The stream receiver registers an entry before enqueuing a job; the worker
//! that processes the job resolves it exactly once. Entries are removed on
//! resolution or by the receiver's abort paths, so nothing outlives its job.

use crate::job::JobOutcome;
use log::warn;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::oneshot;

pub struct CompletionRegistry {
    entries: Mutex<HashMap<String, oneshot::Sender<JobOutcome>>>,
}

impl CompletionRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Create the completion future for a job. The returned receiver yields
    /// the worker's verdict, or an error if the entry was removed unresolved.
    pub fn register(&self, job_id: &str) -> oneshot::Receiver<JobOutcome> {
        let (tx, rx) = oneshot::channel();
        let previous = self.entries.lock().insert(job_id.to_string(), tx);
        if previous.is_some() {
            // Job ids are uuid-v4; a duplicate key means id generation broke.
            warn!("completion registry replaced an existing entry for job {job_id}");
        }
        rx
    }

    /// Resolve a job's future and drop the entry. Returns `false` when no
    /// entry exists (already resolved or removed) or the caller stopped
    /// waiting; the outcome is discarded in that case.
    pub fn resolve(&self, job_id: &str, outcome: JobOutcome) -> bool {
        match self.entries.lock().remove(job_id) {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Drop a registered entry without resolving it (abort paths).
    pub fn remove(&self, job_id: &str) {
        self.entries.lock().remove(job_id);
    }

    pub fn pending(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for CompletionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(message: &str) -> JobOutcome {
        JobOutcome {
            success: true,
            message: message.into(),
            playback_url: String::new(),
        }
    }

    #[tokio::test]
    async fn resolve_delivers_to_registered_receiver() {
        let registry = CompletionRegistry::new();
        let rx = registry.register("job-1");

        assert!(registry.resolve("job-1", outcome("done")));
        let received = rx.await.unwrap();
        assert_eq!(received.message, "done");
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn second_resolve_is_a_no_op() {
        let registry = CompletionRegistry::new();
        let _rx = registry.register("job-1");

        assert!(registry.resolve("job-1", outcome("first")));
        assert!(!registry.resolve("job-1", outcome("second")));
    }

    #[test]
    fn resolve_after_receiver_dropped_reports_abandonment() {
        let registry = CompletionRegistry::new();
        let rx = registry.register("job-1");
        drop(rx);

        // The entry still exists, but nothing is listening; the outcome is
        // discarded and the entry removed either way.
        assert!(!registry.resolve("job-1", outcome("late")));
        assert_eq!(registry.pending(), 0);
    }

    #[test]
    fn remove_discards_unresolved_entry() {
        let registry = CompletionRegistry::new();
        let _rx = registry.register("job-1");
        registry.remove("job-1");
        assert_eq!(registry.pending(), 0);
        assert!(!registry.resolve("job-1", outcome("gone")));
    }
}
