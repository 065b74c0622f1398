//! Shared data models for the VidComposer backend.
//!
//! This crate provides Serde-serializable types for:
//! - Scenes, transitions, and overlay settings
//! - Composition requests and validated timelines
//! - Jobs and their state machine
//! - Quality tiers and output parameters

pub mod asset;
pub mod job;
pub mod quality;
pub mod request;
pub mod scene;
pub mod timeline;

// Re-export common types
pub use asset::Asset;
pub use job::{Job, JobId, JobOutput, JobPage, JobSnapshot, JobStatus, WebhookPayload};
pub use quality::{JobPriority, VideoQuality};
pub use request::{CompositionRequest, Limits, SceneSpec, ValidationError};
pub use scene::{AudioEffect, AudioSettings, Scene, TextOverlay, TextPosition, Transition, VideoSettings};
pub use timeline::{CompositionSettings, MediaKind, OutputFormat, OutputParams, SourceSpec, Timeline};
