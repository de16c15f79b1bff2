//! Northbound job endpoints consumed by the batch scheduler.

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domains::jobs::{Job, JobError, JobStatus, SubmitRequest};
use crate::server::app::AppState;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(err: JobError) -> Response {
    let status = match &err {
        JobError::Validation(_) | JobError::UnknownNodes(_) => StatusCode::BAD_REQUEST,
        JobError::NodesAllocated(_) | JobError::InvalidState { .. } => StatusCode::CONFLICT,
        JobError::NotFound(_) => StatusCode::NOT_FOUND,
        JobError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
        .into_response()
}

#[derive(Serialize)]
pub struct JobResponse {
    pub job: Job,
}

/// `POST /api/v1/jobs` - submit (provision) a job.
///
/// 201 on first create, 200 on idempotent replay, 409 on node-allocation
/// conflict, 400 on validation failure.
pub async fn submit_job_handler(
    Extension(state): Extension<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Response {
    match state.engine.submit(request).await {
        Ok(outcome) => {
            let status = if outcome.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(outcome)).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// `POST /api/v1/jobs/{external_id}/complete` - deprovision a job.
pub async fn complete_job_handler(
    Extension(state): Extension<AppState>,
    Path(external_id): Path<String>,
) -> Response {
    match state.engine.complete(&external_id).await {
        Ok(job) => (StatusCode::OK, Json(JobResponse { job })).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
}

/// `GET /api/v1/jobs?status=` - list jobs, optionally by status.
pub async fn list_jobs_handler(
    Extension(state): Extension<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Response {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match JobStatus::parse(raw) {
            Some(status) => Some(status),
            None => {
                return error_response(JobError::Validation(format!(
                    "unknown job status {:?}",
                    raw
                )));
            }
        },
    };

    match state.engine.list(status).await {
        Ok(jobs) => (StatusCode::OK, Json(jobs)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub cleaned_job_ids: Vec<String>,
}

/// `POST /api/v1/jobs/cleanup` - reclaim expired jobs now.
pub async fn cleanup_expired_handler(Extension(state): Extension<AppState>) -> Response {
    match state.engine.cleanup_expired().await {
        Ok(cleaned_job_ids) => {
            (StatusCode::OK, Json(CleanupResponse { cleaned_job_ids })).into_response()
        }
        Err(err) => error_response(err),
    }
}
