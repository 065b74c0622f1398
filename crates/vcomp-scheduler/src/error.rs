//! Error types for job orchestration.

use thiserror::Error;

use vcomp_media::MediaError;
use vcomp_models::{JobId, ValidationError};

/// Result type for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors surfaced by the scheduler and its collaborators.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("{0}")]
    Conflict(String),

    #[error("Job queue is full ({0} jobs waiting)")]
    AdmissionRejected(usize),

    #[error("scene {index}: {source}")]
    SceneResolution {
        index: usize,
        #[source]
        source: MediaError,
    },

    #[error(transparent)]
    Media(#[from] MediaError),
}

impl SchedulerError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}
