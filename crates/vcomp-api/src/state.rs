//! Application state.

use std::sync::Arc;

use vcomp_scheduler::JobScheduler;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub scheduler: Arc<JobScheduler>,
}

impl AppState {
    pub fn new(config: ApiConfig, scheduler: Arc<JobScheduler>) -> Self {
        Self { config, scheduler }
    }
}
