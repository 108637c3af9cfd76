//! Submit, status and download handlers.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::Serialize;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use beatreel_models::{ExportRequestBody, Job, JobId, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// `POST /export` response.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// `GET /export/:job_id` response.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    /// Present only once the job has failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        let error = match job.status {
            JobStatus::Failed => job.error_message,
            _ => None,
        };
        Self {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            error,
        }
    }
}

/// Validate a render request, queue the job and hand it to the runner.
///
/// Returns as soon as the job exists; rendering happens in the background.
pub async fn submit_export(
    State(state): State<AppState>,
    payload: Result<Json<ExportRequestBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let Json(body) = payload?;
    let request = body.into_render_request().map_err(|violations| {
        metrics::record_validation_failure();
        ApiError::Validation(violations)
    })?;

    let plan = request.plan;
    let duration_sec = request.duration_sec;
    let job = state.store.create(request).await?;
    metrics::record_job_submitted(plan.as_str());
    info!(
        job_id = %job.id,
        plan = %plan,
        duration_sec,
        total_frames = job.total_frames,
        "Render job queued"
    );

    state.runner.spawn(job.id.clone());

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

/// Current status and progress of a job.
pub async fn get_export_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = find_job(&state, job_id).await?;
    Ok(Json(job.into()))
}

/// Stream a finished job's video as an attachment.
pub async fn download_export(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    let job = find_job(&state, job_id).await?;
    if job.status != JobStatus::Done {
        return Err(ApiError::not_found(format!("Video for job {} is not ready", job.id)));
    }

    let path = state.runner.output_path(&job.id);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(job_id = %job.id, "Finished job has no output file");
            return Err(ApiError::not_found(format!("Video for job {} is not available", job.id)));
        }
        Err(e) => {
            warn!(job_id = %job.id, "Failed to open output: {}", e);
            return Err(ApiError::internal("failed to open video"));
        }
    };
    let len = file
        .metadata()
        .await
        .map_err(|_| ApiError::internal("failed to read video metadata"))?
        .len();

    metrics::record_download(len);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, len)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.mp4\"", job.id),
        )
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::internal(e.to_string()))
}

async fn find_job(state: &AppState, job_id: String) -> ApiResult<Job> {
    let job_id = JobId::from_string(job_id);
    state
        .store
        .get(&job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job {} not found", job_id)))
}
