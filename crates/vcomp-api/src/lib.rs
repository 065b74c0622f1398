//! Axum HTTP API server.
//!
//! Thin surface over the scheduler: handlers validate and translate, the
//! scheduler owns all job state.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
