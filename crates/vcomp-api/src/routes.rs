//! API routes.

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_api_key;
use crate::handlers::{
    cancel_job, compose, delete_job, download_job, get_job, health, list_jobs, queue_status,
    supported_formats,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let mutating = Router::new()
        .route("/compose", post(compose))
        .route("/cancel/:job_id", post(cancel_job))
        .route("/job/:job_id", delete(delete_job))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let read_only = Router::new()
        .route("/job/:job_id", get(get_job))
        .route("/jobs", get(list_jobs))
        .route("/download/:job_id", get(download_job))
        .route("/queue-status", get(queue_status))
        .route("/health", get(health))
        .route("/supported-formats", get(supported_formats));

    Router::new()
        .merge(mutating)
        .merge(read_only)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    use vcomp_media::FfmpegGateway;
    use vcomp_scheduler::{JobScheduler, SchedulerConfig};

    use crate::config::ApiConfig;

    fn app(dir: &tempfile::TempDir, api_key: Option<&str>) -> Router {
        let scheduler_config = SchedulerConfig {
            media_dir: dir.path().join("media"),
            work_dir: dir.path().join("work"),
            output_dir: dir.path().join("out"),
            ..SchedulerConfig::default()
        };
        let gateway = Arc::new(FfmpegGateway::new(
            scheduler_config.work_dir.clone(),
            scheduler_config.output_dir.clone(),
        ));
        let scheduler = JobScheduler::start(scheduler_config, gateway);
        let config = ApiConfig {
            api_key: api_key.map(String::from),
            ..ApiConfig::default()
        };
        create_router(AppState::new(config, scheduler))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn compose_body() -> String {
        serde_json::json!({
            "scenes": [
                { "source": format!("data:image/png;base64,{}", BASE64.encode([1u8, 2, 3])), "duration": 2.0 }
            ],
            "fps": 30
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir, None)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["total_jobs"], 0);
    }

    #[tokio::test]
    async fn test_supported_formats_lists_capabilities() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir, None)
            .oneshot(
                Request::get("/supported-formats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert!(json["input_extensions"]["image"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!(".jpg")));
        assert_eq!(json["limits"]["max_scenes"], 20);
        assert_eq!(json["quality_tiers"][2]["crf"], 18);
        assert!(json["transitions"]
            .as_array()
            .unwrap()
            .contains(&serde_json::json!("slide_left")));
    }

    #[tokio::test]
    async fn test_compose_accepts_valid_request() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir, None)
            .oneshot(
                Request::post("/compose")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(compose_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "pending");
        assert!(json["job_id"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_compose_rejects_invalid_request() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir, None)
            .oneshot(
                Request::post("/compose")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{ "scenes": [], "fps": 30 }"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert!(json["detail"].as_str().unwrap().contains("scenes"));
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir, None)
            .oneshot(Request::get("/job/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mutating_routes_require_api_key() {
        let dir = tempfile::tempdir().unwrap();
        let router = app(&dir, Some("secret"));

        let denied = router
            .clone()
            .oneshot(
                Request::post("/compose")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(compose_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = router
            .clone()
            .oneshot(
                Request::post("/compose")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::from(compose_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        // Reads stay open.
        let read = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(read.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_download_of_unfinished_job_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let router = app(&dir, None);

        let response = router
            .clone()
            .oneshot(
                Request::post("/compose")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(compose_body()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let job_id = body_json(response).await["job_id"]
            .as_str()
            .unwrap()
            .to_string();

        let download = router
            .oneshot(
                Request::get(format!("/download/{job_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(download.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_queue_status_shape() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir, None)
            .oneshot(Request::get("/queue-status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["max_concurrent"], 5);
        assert!(json["pending"].as_array().unwrap().is_empty());
    }
}
