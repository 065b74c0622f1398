//! Request handlers.

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::info;

use vcomp_models::{
    CompositionRequest, JobId, JobPage, JobPriority, JobSnapshot, JobStatus, MediaKind,
    OutputFormat, Transition, VideoQuality,
};
use vcomp_scheduler::QueueStatus;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Response to a successful composition submission.
#[derive(Debug, Serialize)]
pub struct ComposeResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub priority: JobPriority,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Validate and admit a composition request.
pub async fn compose(
    State(state): State<AppState>,
    Json(request): Json<CompositionRequest>,
) -> ApiResult<Json<ComposeResponse>> {
    let snapshot = state.scheduler.submit(request)?;
    info!(job_id = %snapshot.job_id, "Composition accepted");
    Ok(Json(ComposeResponse {
        job_id: snapshot.job_id,
        status: snapshot.status,
        priority: snapshot.priority,
        created_at: snapshot.created_at,
        expires_at: snapshot.expires_at,
    }))
}

/// Fetch one job's snapshot.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    let snapshot = state.scheduler.get(&JobId::from_string(job_id))?;
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    pub status: Option<JobStatus>,
    pub priority: Option<JobPriority>,
}

fn default_page() -> usize {
    1
}

fn default_per_page() -> usize {
    10
}

/// Paginated job listing, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<JobPage> {
    Json(state.scheduler.list(
        params.page,
        params.per_page,
        params.status,
        params.priority,
    ))
}

/// Cancel a pending or processing job.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobSnapshot>> {
    let snapshot = state.scheduler.cancel(&JobId::from_string(job_id))?;
    Ok(Json(snapshot))
}

/// Delete a job and its output files.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.scheduler.delete(&JobId::from_string(job_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Stream a completed job's output file.
pub async fn download_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let snapshot = state.scheduler.get(&JobId::from_string(job_id))?;

    if snapshot.status != JobStatus::Completed {
        return Err(ApiError::conflict(format!(
            "job is {}, not completed",
            snapshot.status
        )));
    }
    let path = snapshot
        .output_path
        .ok_or_else(|| ApiError::internal("completed job has no output path"))?;

    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("output file no longer exists"))?;
    let length = file
        .metadata()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .len();

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output.mp4")
        .to_string();
    let content_type = content_type_for(&filename);

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::internal(e.to_string()))
}

fn content_type_for(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".mp4") {
        "video/mp4"
    } else if lower.ends_with(".mov") {
        "video/quicktime"
    } else if lower.ends_with(".avi") {
        "video/x-msvideo"
    } else if lower.ends_with(".webm") {
        "video/webm"
    } else {
        "application/octet-stream"
    }
}

/// Wait-queue and slot usage.
pub async fn queue_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(state.scheduler.queue_status())
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_jobs: usize,
    pub total_jobs: usize,
    pub max_concurrent_jobs: usize,
}

/// Liveness plus coarse job counts.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let (active_jobs, total_jobs) = state.scheduler.job_counts();
    Json(HealthResponse {
        status: "healthy",
        active_jobs,
        total_jobs,
        max_concurrent_jobs: state.scheduler.config().max_concurrent_jobs,
    })
}

#[derive(Debug, Serialize)]
pub struct QualityTier {
    pub name: &'static str,
    pub resolution: String,
    pub preset: &'static str,
    pub crf: u8,
}

#[derive(Debug, Serialize)]
pub struct SupportedFormats {
    pub input_extensions: InputExtensions,
    pub output_formats: Vec<&'static str>,
    pub quality_tiers: Vec<QualityTier>,
    pub transitions: Vec<&'static str>,
    pub limits: LimitsView,
}

#[derive(Debug, Serialize)]
pub struct InputExtensions {
    pub image: &'static [&'static str],
    pub audio: &'static [&'static str],
    pub video: &'static [&'static str],
}

#[derive(Debug, Serialize)]
pub struct LimitsView {
    pub max_file_size: u64,
    pub max_scenes: usize,
    pub max_scene_duration: f64,
    pub max_total_duration: f64,
    pub fps_range: [u8; 2],
}

/// Capability discovery: accepted inputs, outputs, tiers, and limits.
pub async fn supported_formats(State(state): State<AppState>) -> Json<SupportedFormats> {
    let limits = state.scheduler.config().limits;
    Json(SupportedFormats {
        input_extensions: InputExtensions {
            image: MediaKind::Image.allowed_extensions(),
            audio: MediaKind::Audio.allowed_extensions(),
            video: MediaKind::Video.allowed_extensions(),
        },
        output_formats: OutputFormat::ALL.iter().map(|f| f.extension()).collect(),
        quality_tiers: VideoQuality::ALL
            .iter()
            .map(|q| {
                let (w, h) = q.resolution();
                QualityTier {
                    name: q.as_str(),
                    resolution: format!("{w}x{h}"),
                    preset: q.preset(),
                    crf: q.crf(),
                }
            })
            .collect(),
        transitions: Transition::ALL.iter().map(|t| t.as_str()).collect(),
        limits: LimitsView {
            max_file_size: limits.max_file_size,
            max_scenes: limits.max_scenes,
            max_scene_duration: limits.max_scene_duration,
            max_total_duration: limits.max_total_duration,
            fps_range: [15, 60],
        },
    })
}
