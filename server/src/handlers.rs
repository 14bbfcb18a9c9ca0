use std::io;
use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::TryStreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::io::StreamReader;
use tracing::{info, instrument};

use audiosub::sanitize::header_filename;
use audiosub::subtitle::MEDIA_TYPE;
use audiosub::{HealthReport, JobStatus, JobView, TranscriptionService};

use crate::error::ApiError;

pub type AppState = Arc<TranscriptionService>;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 500;

/// Multipart field carrying the audio upload.
const FILE_FIELD: &str = "file";

pub async fn root(State(service): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "Audio transcription service is running",
        "supported_formats": service.supported_formats(),
        "max_file_size_mb": service.config().max_upload_bytes / (1024 * 1024),
    }))
}

#[instrument(name = "health", skip_all)]
pub async fn health(State(service): State<AppState>) -> Json<HealthReport> {
    Json(service.health())
}

/// Transcribes the upload in the request and answers with the SRT file.
pub async fn upload(
    State(service): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let body = StreamReader::new(field.map_err(io::Error::other));
        let file = service.transcribe_now(filename.as_deref(), body).await?;

        info!(
            segments = file.summary.segments_count,
            model = %file.summary.model_tier,
            "Synchronous transcription served"
        );
        return Ok(srt_attachment(&file.filename, file.content));
    }

    Err(missing_file())
}

/// Queues the upload and answers right away with the pending job.
pub async fn create_job(
    State(service): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let body = StreamReader::new(field.map_err(io::Error::other));
        let view = service.submit(filename.as_deref(), body).await?;

        let payload = json!({
            "job_id": view.job_id,
            "status": view.status,
            "filename": view.filename,
            "file_size_bytes": view.file_size_bytes,
        });
        return Ok((StatusCode::ACCEPTED, Json(payload)).into_response());
    }

    Err(missing_file())
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

pub async fn list_jobs(
    State(service): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Value>, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);

    let jobs = service.list_jobs(status, limit);
    Ok(Json(json!({ "total": jobs.len(), "jobs": jobs })))
}

pub async fn job_status(
    State(service): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    Ok(Json(service.status(&job_id)?))
}

pub async fn download(
    State(service): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let download = service.download(&job_id).await?;
    Ok(srt_attachment(&download.filename, download.content))
}

fn srt_attachment(filename: &str, content: String) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", header_filename(filename));
    (
        [
            (header::CONTENT_TYPE, MEDIA_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content,
    )
        .into_response()
}

fn missing_file() -> ApiError {
    ApiError::BadRequest(format!("Missing multipart field '{}'", FILE_FIELD))
}
