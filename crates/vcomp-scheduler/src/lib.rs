//! Job orchestration: registry, timeline building, scheduling, webhooks.
//!
//! The scheduler is the single authority over job state. Everything above
//! it (the HTTP layer) only submits requests and reads snapshots;
//! everything below it (the render gateway) is driven per job with
//! cooperative cancellation.

pub mod config;
pub mod error;
pub mod notify;
pub mod registry;
pub mod scheduler;
pub mod timeline;

pub use config::SchedulerConfig;
pub use error::{SchedulerError, SchedulerResult};
pub use notify::WebhookNotifier;
pub use registry::JobRegistry;
pub use scheduler::{JobScheduler, PendingEntry, QueueStatus};
pub use timeline::TimelineBuilder;
