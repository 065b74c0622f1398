//! In-memory job registry.
//!
//! All state transitions go through registry methods so the Processing
//! count and job status always move together under one write lock. TTL
//! expiry is applied lazily on every read path.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::debug;

use vcomp_models::{Job, JobId, JobOutput, JobSnapshot, JobStatus};

use crate::error::{SchedulerError, SchedulerResult};

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    processing: usize,
}

impl Inner {
    /// Apply lazy TTL expiry to one job. Terminal jobs are untouched.
    /// Returns true when the job was Processing and its slot is now free.
    fn expire_if_due(&mut self, id: &JobId) -> bool {
        let now = Utc::now();
        if let Some(job) = self.jobs.get_mut(id) {
            if job.is_expired(now) {
                let released = job.status == JobStatus::Processing;
                if released {
                    self.processing -= 1;
                }
                job.expire();
                debug!(job_id = %id, "Job expired");
                return released;
            }
        }
        false
    }
}

/// Shared registry of all known jobs.
#[derive(Default)]
pub struct JobRegistry {
    inner: RwLock<Inner>,
    slot_waker: RwLock<Option<Arc<Notify>>>,
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a freshly created job.
    pub fn insert(&self, job: Job) {
        self.inner.write().jobs.insert(job.id.clone(), job);
    }

    /// Register a notifier poked whenever lazy expiry frees a Processing
    /// slot, so the dispatch loop can refill it without another event.
    pub fn set_slot_waker(&self, waker: Arc<Notify>) {
        *self.slot_waker.write() = Some(waker);
    }

    fn wake_on_release(&self, released: bool) {
        if !released {
            return;
        }
        if let Some(waker) = self.slot_waker.read().as_ref() {
            waker.notify_one();
        }
    }

    /// Transition a Pending job to Processing, claiming a slot.
    ///
    /// Returns false when the job is gone or no longer Pending (cancelled,
    /// deleted, or expired while waiting), in which case no slot is taken.
    pub fn start(&self, id: &JobId) -> bool {
        let mut inner = self.inner.write();
        let released = inner.expire_if_due(id);
        let claimed = match inner.jobs.get_mut(id) {
            Some(job) if job.status == JobStatus::Pending => {
                job.start();
                inner.processing += 1;
                true
            }
            _ => false,
        };
        drop(inner);
        self.wake_on_release(released);
        claimed
    }

    /// Record completion if the job is still Processing.
    ///
    /// A no-op when the job left Processing meanwhile (cancelled or
    /// expired); the render result is discarded. Returns the completed job
    /// for notification.
    pub fn try_complete(&self, id: &JobId, output: JobOutput) -> Option<Job> {
        self.finish(id, |job| job.complete(output))
    }

    /// Record failure if the job is still Processing. Same discard
    /// semantics as [`Self::try_complete`].
    pub fn try_fail(&self, id: &JobId, error: impl Into<String>) -> Option<Job> {
        self.finish(id, |job| job.fail(error))
    }

    fn finish(&self, id: &JobId, apply: impl FnOnce(&mut Job)) -> Option<Job> {
        let mut inner = self.inner.write();
        let released = inner.expire_if_due(id);
        let finished = match inner.jobs.get_mut(id) {
            Some(job) if job.status == JobStatus::Processing => {
                apply(job);
                let job = job.clone();
                inner.processing -= 1;
                Some(job)
            }
            _ => None,
        };
        drop(inner);
        self.wake_on_release(released);
        finished
    }

    /// Cancel a Pending or Processing job.
    pub fn cancel(&self, id: &JobId) -> SchedulerResult<JobSnapshot> {
        let mut inner = self.inner.write();
        let released = inner.expire_if_due(id);
        let result = match inner.jobs.get_mut(id) {
            None => Err(SchedulerError::NotFound(id.clone())),
            Some(job) if job.status.is_terminal() => Err(SchedulerError::conflict(format!(
                "job {} is already {}",
                id, job.status
            ))),
            Some(job) => {
                let was_processing = job.status == JobStatus::Processing;
                job.cancel();
                let snapshot = job.snapshot();
                if was_processing {
                    inner.processing -= 1;
                }
                Ok(snapshot)
            }
        };
        drop(inner);
        self.wake_on_release(released);
        result
    }

    /// Remove a job entirely, implicitly cancelling it first.
    pub fn remove(&self, id: &JobId) -> Option<Job> {
        let mut inner = self.inner.write();
        let job = inner.jobs.remove(id)?;
        if job.status == JobStatus::Processing {
            inner.processing -= 1;
        }
        Some(job)
    }

    /// Read one job's snapshot, applying lazy expiry.
    pub fn snapshot(&self, id: &JobId) -> Option<JobSnapshot> {
        let mut inner = self.inner.write();
        let released = inner.expire_if_due(id);
        let snapshot = inner.jobs.get(id).map(Job::snapshot);
        drop(inner);
        self.wake_on_release(released);
        snapshot
    }

    /// Advance a job's progress (monotone, clamped). While Processing the
    /// value is capped at 99; only completion records 100.
    pub fn advance_progress(&self, id: &JobId, progress: u8) {
        if let Some(job) = self.inner.write().jobs.get_mut(id) {
            if job.status == JobStatus::Processing {
                job.advance_progress(progress.min(99));
            }
        }
    }

    /// All snapshots matching a filter, newest first. Sweeps expiry.
    pub fn list<F>(&self, filter: F) -> Vec<JobSnapshot>
    where
        F: Fn(&JobSnapshot) -> bool,
    {
        let mut inner = self.inner.write();
        let ids: Vec<JobId> = inner.jobs.keys().cloned().collect();
        let mut released = false;
        for id in &ids {
            released |= inner.expire_if_due(id);
        }

        let mut snapshots: Vec<JobSnapshot> = inner
            .jobs
            .values()
            .map(Job::snapshot)
            .filter(|s| filter(s))
            .collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        drop(inner);
        self.wake_on_release(released);
        snapshots
    }

    /// Current Processing count.
    pub fn processing_count(&self) -> usize {
        self.inner.read().processing
    }

    /// (non-terminal, total) job counts.
    pub fn counts(&self) -> (usize, usize) {
        let inner = self.inner.read();
        let active = inner
            .jobs
            .values()
            .filter(|j| !j.status.is_terminal())
            .count();
        (active, inner.jobs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use vcomp_models::JobPriority;

    fn insert_job(registry: &JobRegistry, ttl: Duration) -> JobId {
        let job = Job::new(JobPriority::Normal, ttl, None, HashMap::new());
        let id = job.id.clone();
        registry.insert(job);
        id
    }

    fn output() -> JobOutput {
        JobOutput {
            output_path: PathBuf::from("out.mp4"),
            preview_path: PathBuf::from("out_preview.mp4"),
            file_size: 1,
            duration_seconds: 1.0,
        }
    }

    #[test]
    fn test_start_claims_slot_once() {
        let registry = JobRegistry::new();
        let id = insert_job(&registry, Duration::hours(1));

        assert!(registry.start(&id));
        assert!(!registry.start(&id));
        assert_eq!(registry.processing_count(), 1);
    }

    #[test]
    fn test_complete_releases_slot() {
        let registry = JobRegistry::new();
        let id = insert_job(&registry, Duration::hours(1));
        registry.start(&id);

        let job = registry.try_complete(&id, output()).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(registry.processing_count(), 0);
        assert_eq!(registry.snapshot(&id).unwrap().progress, 100);
    }

    #[test]
    fn test_cancelled_render_result_discarded() {
        let registry = JobRegistry::new();
        let id = insert_job(&registry, Duration::hours(1));
        registry.start(&id);

        registry.cancel(&id).unwrap();
        assert_eq!(registry.processing_count(), 0);

        // The in-flight result arrives after cancellation and must not win.
        assert!(registry.try_complete(&id, output()).is_none());
        assert_eq!(
            registry.snapshot(&id).unwrap().status,
            JobStatus::Cancelled
        );
    }

    #[test]
    fn test_cancel_terminal_conflicts() {
        let registry = JobRegistry::new();
        let id = insert_job(&registry, Duration::hours(1));
        registry.start(&id);
        registry.try_fail(&id, "boom");

        let err = registry.cancel(&id).unwrap_err();
        assert!(matches!(err, SchedulerError::Conflict(_)));
    }

    #[test]
    fn test_lazy_expiry_on_read() {
        let registry = JobRegistry::new();
        let id = insert_job(&registry, Duration::seconds(-1));

        let snapshot = registry.snapshot(&id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Expired);
        // Start must refuse an expired job.
        assert!(!registry.start(&id));
    }

    #[test]
    fn test_progress_capped_while_processing() {
        let registry = JobRegistry::new();
        let id = insert_job(&registry, Duration::hours(1));
        registry.start(&id);

        // An over-eager gateway may report 100 before the completion
        // transition lands; readers must never see 100 outside Completed.
        registry.advance_progress(&id, 100);
        assert_eq!(registry.snapshot(&id).unwrap().progress, 99);

        registry.try_complete(&id, output()).unwrap();
        assert_eq!(registry.snapshot(&id).unwrap().progress, 100);
    }

    #[tokio::test]
    async fn test_expiry_slot_release_pokes_waker() {
        let registry = JobRegistry::new();
        let waker = Arc::new(Notify::new());
        registry.set_slot_waker(waker.clone());

        let id = insert_job(&registry, Duration::hours(1));
        registry.start(&id);
        {
            let mut inner = registry.inner.write();
            inner.jobs.get_mut(&id).unwrap().expires_at = Utc::now() - Duration::seconds(1);
        }

        // The read applies expiry, frees the slot, and must poke the waker.
        registry.snapshot(&id);
        tokio::time::timeout(std::time::Duration::from_millis(100), waker.notified())
            .await
            .expect("slot waker not poked by lazy expiry");
        assert_eq!(registry.processing_count(), 0);
    }

    #[test]
    fn test_expired_processing_releases_slot() {
        let registry = JobRegistry::new();
        let id = insert_job(&registry, Duration::hours(1));
        registry.start(&id);

        // Simulate TTL elapsing while Processing.
        {
            let mut inner = registry.inner.write();
            inner.jobs.get_mut(&id).unwrap().expires_at = Utc::now() - Duration::seconds(1);
        }
        let snapshot = registry.snapshot(&id).unwrap();
        assert_eq!(snapshot.status, JobStatus::Expired);
        assert_eq!(registry.processing_count(), 0);
    }

    #[test]
    fn test_list_newest_first() {
        let registry = JobRegistry::new();
        let first = insert_job(&registry, Duration::hours(1));
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = insert_job(&registry, Duration::hours(1));

        let all = registry.list(|_| true);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].job_id, second);
        assert_eq!(all[1].job_id, first);
    }

    #[test]
    fn test_remove_processing_releases_slot() {
        let registry = JobRegistry::new();
        let id = insert_job(&registry, Duration::hours(1));
        registry.start(&id);

        let job = registry.remove(&id).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(registry.processing_count(), 0);
        assert!(registry.snapshot(&id).is_none());
    }
}
