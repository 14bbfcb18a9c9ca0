use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use audiosub::TranscriptionService;

use crate::handlers;

pub fn router(service: Arc<TranscriptionService>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/upload", post(handlers::upload))
        .route("/jobs", post(handlers::create_job).get(handlers::list_jobs))
        .route("/jobs/:job_id", get(handlers::job_status))
        .route("/jobs/:job_id/download", get(handlers::download))
        // The submission gate enforces the upload ceiling while streaming
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use audiosub::{ServiceConfig, StubEngine};

    const BOUNDARY: &str = "audiosub-test-boundary";

    fn app(temp: &TempDir, max_upload_bytes: u64) -> Router {
        let config = ServiceConfig {
            work_directory: temp.path().join("work"),
            max_upload_bytes,
            worker_count: 1,
            ..ServiceConfig::default()
        };
        let service =
            TranscriptionService::start(config, Arc::new(StubEngine::new())).unwrap();
        router(Arc::new(service))
    }

    fn multipart_request(uri: &str, filename: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_unloaded_model() {
        let temp = TempDir::new().unwrap();
        let response = app(&temp, 1024 * 1024)
            .oneshot(get_request("/health"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert!(body["model"].is_null());
        assert_eq!(body["engine"], "stub");
    }

    #[tokio::test]
    async fn test_root_lists_formats() {
        let temp = TempDir::new().unwrap();
        let response = app(&temp, 10 * 1024 * 1024)
            .oneshot(get_request("/"))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["max_file_size_mb"], 10);
        assert_eq!(body["supported_formats"][0], "mp3");
    }

    #[tokio::test]
    async fn test_upload_returns_srt_attachment() {
        let temp = TempDir::new().unwrap();
        let response = app(&temp, 1024 * 1024)
            .oneshot(multipart_request("/upload", "talk.wav", &[0u8; 64_000]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/x-subrip"
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"talk_subtitles.srt\""
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(text, "1\n00:00:00,000 --> 00:00:02,000\nStub segment 1\n\n");
    }

    #[tokio::test]
    async fn test_upload_rejections() {
        let temp = TempDir::new().unwrap();
        let app = app(&temp, 1024 * 1024);

        let response = app
            .clone()
            .oneshot(multipart_request("/upload", "notes.txt", b"hello"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Unsupported file format"));

        let response = app
            .oneshot(multipart_request(
                "/upload",
                "long.wav",
                &vec![0u8; 1024 * 1024 + 1],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "File too large. Maximum size: 1MB");
    }

    #[tokio::test]
    async fn test_job_round_trip() {
        let temp = TempDir::new().unwrap();
        let app = app(&temp, 1024 * 1024);

        let response = app
            .clone()
            .oneshot(multipart_request("/jobs", "talk.mp3", &[0u8; 1000]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = json_body(response).await;
        assert_eq!(body["status"], "pending");
        let job_id = body["job_id"].as_str().unwrap().to_string();

        let mut status = String::new();
        for _ in 0..200 {
            let response = app
                .clone()
                .oneshot(get_request(&format!("/jobs/{job_id}")))
                .await
                .unwrap();
            status = json_body(response).await["status"]
                .as_str()
                .unwrap()
                .to_string();
            if status == "completed" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, "completed");

        let response = app
            .clone()
            .oneshot(get_request(&format!("/jobs/{job_id}/download")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"talk_subtitles.srt\""
        );

        let response = app
            .oneshot(get_request("/jobs?status=completed&limit=5"))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["jobs"][0]["job_id"], job_id.as_str());
    }

    #[tokio::test]
    async fn test_unknown_job_and_bad_filter() {
        let temp = TempDir::new().unwrap();
        let app = app(&temp, 1024 * 1024);

        let response = app
            .clone()
            .oneshot(get_request("/jobs/does-not-exist"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "Job not found: does-not-exist");

        let response = app
            .oneshot(get_request("/jobs?status=done"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let temp = TempDir::new().unwrap();
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhi\r\n--{BOUNDARY}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/jobs")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app(&temp, 1024 * 1024).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
