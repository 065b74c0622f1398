//! Bounded-concurrency job scheduler.
//!
//! One dispatch loop owns admission into the Processing state: whenever a
//! slot is free it pops the highest-priority waiting job, claims a slot
//! through the registry, and spawns the job task. Everything else
//! (cancellation, deletion, reads) goes through the registry and pokes the
//! loop awake.

use std::collections::{BinaryHeap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use vcomp_media::{MediaError, MediaResolver, ProgressFn, RenderGateway};
use vcomp_models::{
    CompositionRequest, Job, JobId, JobOutput, JobPage, JobPriority, JobSnapshot, JobStatus,
};

use crate::config::SchedulerConfig;
use crate::error::{SchedulerError, SchedulerResult};
use crate::notify::WebhookNotifier;
use crate::registry::JobRegistry;
use crate::timeline::TimelineBuilder;

/// Share of the progress range covered by timeline resolution.
const PROGRESS_BUILD_BAND: u32 = 40;

/// A job waiting for a concurrency slot.
struct QueuedJob {
    priority: JobPriority,
    /// Admission sequence number; earlier submissions win within a priority.
    seq: u64,
    id: JobId,
    request: CompositionRequest,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}
impl Eq for QueuedJob {}
impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// One waiting job as reported by `queue_status`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PendingEntry {
    pub job_id: JobId,
    pub priority: JobPriority,
}

/// Point-in-time view of the wait queue and slot usage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueueStatus {
    pub queue_length: usize,
    pub processing: usize,
    pub max_concurrent: usize,
    /// Waiting jobs in dispatch order
    pub pending: Vec<PendingEntry>,
}

/// The scheduling authority. One instance per process.
pub struct JobScheduler {
    config: SchedulerConfig,
    registry: Arc<JobRegistry>,
    builder: TimelineBuilder,
    gateway: Arc<dyn RenderGateway>,
    notifier: WebhookNotifier,
    queue: Mutex<BinaryHeap<QueuedJob>>,
    cancels: Mutex<HashMap<JobId, watch::Sender<bool>>>,
    wake: Arc<Notify>,
    seq: AtomicU64,
}

impl JobScheduler {
    /// Create the scheduler and spawn its dispatch loop.
    pub fn start(config: SchedulerConfig, gateway: Arc<dyn RenderGateway>) -> Arc<Self> {
        let resolver = MediaResolver::new(&config.media_dir, config.limits.max_file_size);
        let registry = JobRegistry::new();
        let wake = Arc::new(Notify::new());
        // Lazy expiry can free a slot on any read path; the loop must hear
        // about it or a waiting job stalls until the next submit or cancel.
        registry.set_slot_waker(wake.clone());
        let scheduler = Arc::new(Self {
            builder: TimelineBuilder::new(resolver, config.limits),
            registry,
            gateway,
            notifier: WebhookNotifier::new(),
            queue: Mutex::new(BinaryHeap::new()),
            cancels: Mutex::new(HashMap::new()),
            wake,
            seq: AtomicU64::new(0),
            config,
        });

        let loop_handle = scheduler.clone();
        tokio::spawn(async move { loop_handle.dispatch_loop().await });
        scheduler
    }

    /// Validate and admit a request. Returns the Pending job's snapshot.
    pub fn submit(&self, request: CompositionRequest) -> SchedulerResult<JobSnapshot> {
        request.validate(&self.config.limits)?;

        let job = Job::new(
            request.priority,
            self.config.job_ttl,
            request.webhook_url.clone(),
            request.metadata.clone(),
        );
        let snapshot = job.snapshot();
        let id = job.id.clone();

        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.config.max_queued_jobs {
                return Err(SchedulerError::AdmissionRejected(queue.len()));
            }
            self.registry.insert(job);
            queue.push(QueuedJob {
                priority: request.priority,
                seq: self.seq.fetch_add(1, Ordering::Relaxed),
                id: id.clone(),
                request,
            });
        }

        info!(job_id = %id, priority = %snapshot.priority.as_str(), "Job admitted");
        self.wake.notify_one();
        Ok(snapshot)
    }

    /// Fetch one job's snapshot.
    pub fn get(&self, id: &JobId) -> SchedulerResult<JobSnapshot> {
        self.registry
            .snapshot(id)
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))
    }

    /// Paginated job listing, newest first.
    pub fn list(
        &self,
        page: usize,
        per_page: usize,
        status: Option<JobStatus>,
        priority: Option<JobPriority>,
    ) -> JobPage {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let all = self.registry.list(|s| {
            status.map_or(true, |want| s.status == want)
                && priority.map_or(true, |want| s.priority == want)
        });

        let total = all.len();
        let total_pages = total.div_ceil(per_page).max(1);
        let jobs = all
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect();

        JobPage {
            jobs,
            total,
            page,
            per_page,
            total_pages,
        }
    }

    /// Cancel a Pending or Processing job.
    pub fn cancel(&self, id: &JobId) -> SchedulerResult<JobSnapshot> {
        let snapshot = self.registry.cancel(id)?;
        // A cancelled waiter must stop occupying queue capacity.
        self.queue.lock().retain(|q| q.id != *id);
        if let Some(tx) = self.cancels.lock().get(id) {
            let _ = tx.send(true);
        }
        info!(job_id = %id, "Job cancelled");
        self.wake.notify_one();
        Ok(snapshot)
    }

    /// Delete a job in any state, cancelling it first if needed and
    /// removing its output files best-effort.
    pub async fn delete(&self, id: &JobId) -> SchedulerResult<()> {
        let job = self
            .registry
            .remove(id)
            .ok_or_else(|| SchedulerError::NotFound(id.clone()))?;

        self.queue.lock().retain(|q| q.id != *id);
        if let Some(tx) = self.cancels.lock().remove(id) {
            let _ = tx.send(true);
        }

        for path in [&job.output_path, &job.preview_path].into_iter().flatten() {
            remove_file_quietly(path).await;
        }

        info!(job_id = %id, "Job deleted");
        self.wake.notify_one();
        Ok(())
    }

    /// Wait-queue and slot usage view.
    pub fn queue_status(&self) -> QueueStatus {
        let queue = self.queue.lock();
        let mut waiting: Vec<&QueuedJob> = queue.iter().collect();
        waiting.sort_by(|a, b| b.cmp(a));
        let pending = waiting
            .into_iter()
            .map(|q| PendingEntry {
                job_id: q.id.clone(),
                priority: q.priority,
            })
            .collect();

        QueueStatus {
            queue_length: queue.len(),
            processing: self.registry.processing_count(),
            max_concurrent: self.config.max_concurrent_jobs,
            pending,
        }
    }

    /// (non-terminal, total) job counts for health reporting.
    pub fn job_counts(&self) -> (usize, usize) {
        self.registry.counts()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    async fn dispatch_loop(self: Arc<Self>) {
        loop {
            loop {
                if self.registry.processing_count() >= self.config.max_concurrent_jobs {
                    break;
                }
                let Some(next) = self.queue.lock().pop() else {
                    break;
                };
                // Left Pending while waiting (cancelled, deleted, expired):
                // drop it without taking a slot.
                if !self.registry.start(&next.id) {
                    debug!(job_id = %next.id, "Skipping job no longer pending");
                    continue;
                }

                let (cancel_tx, cancel_rx) = watch::channel(false);
                self.cancels.lock().insert(next.id.clone(), cancel_tx);

                let task = self.clone();
                tokio::spawn(async move {
                    task.run_job(next.id, next.request, cancel_rx).await;
                });
            }
            self.wake.notified().await;
        }
    }

    async fn run_job(
        self: Arc<Self>,
        id: JobId,
        request: CompositionRequest,
        cancel: watch::Receiver<bool>,
    ) {
        debug!(job_id = %id, "Job started");

        let build_progress = {
            let registry = self.registry.clone();
            let id = id.clone();
            move |done: usize, total: usize| {
                let p = (PROGRESS_BUILD_BAND * done as u32 / total.max(1) as u32) as u8;
                registry.advance_progress(&id, p);
            }
        };

        let outcome = match self.builder.build(&request, build_progress).await {
            Err(e) => Err(e.to_string()),
            Ok(_) if *cancel.borrow() => {
                self.finish_job(&id).await;
                return;
            }
            Ok(timeline) => {
                let render_progress: ProgressFn = {
                    let registry = self.registry.clone();
                    let id = id.clone();
                    Box::new(move |p| registry.advance_progress(&id, p))
                };

                match self
                    .gateway
                    .render(&timeline, id.as_str(), render_progress, cancel)
                    .await
                {
                    Ok(output) => Ok(output),
                    Err(MediaError::Cancelled) => {
                        self.finish_job(&id).await;
                        return;
                    }
                    Err(e) => Err(e.to_string()),
                }
            }
        };

        let finished = match outcome {
            Ok(render) => {
                let output = JobOutput {
                    output_path: render.output.path.clone(),
                    preview_path: render.preview.path.clone(),
                    file_size: render.output.size_bytes,
                    duration_seconds: render.duration_seconds,
                };
                let finished = self.registry.try_complete(&id, output);
                if finished.is_none() {
                    // Job left Processing while rendering; the result is
                    // discarded and its files with it.
                    remove_file_quietly(&render.output.path).await;
                    remove_file_quietly(&render.preview.path).await;
                }
                finished
            }
            Err(message) => {
                warn!(job_id = %id, "Job failed: {}", message);
                self.registry.try_fail(&id, message)
            }
        };

        if let Some(job) = finished {
            if let Some(url) = &job.webhook_url {
                self.notifier.notify(url, &job.webhook_payload()).await;
            }
        }

        self.finish_job(&id).await;
    }

    async fn finish_job(&self, id: &JobId) {
        self.cancels.lock().remove(id);
        self.wake.notify_one();
    }
}

async fn remove_file_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "Failed to remove file: {}", e);
        }
    }
}
