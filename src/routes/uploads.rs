//! HTTP API (§10.5) — thin edge over the orchestrator and progress
//! projector. Grounded in the teacher's `routes/jobs.rs` handler shape.

use crate::db::connection::with_conn;
use crate::error::AppError;
use crate::models::file;
use crate::models::upload_job::{self, CreateUploadJobRequest, UploadJob};
use crate::services::{orchestrator, progress};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::path::Path as FsPath;
use std::sync::Arc;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_uploads).post(create_upload))
        .route("/{id}", get(get_upload))
        .route("/{id}/files", get(get_upload_files))
        .route("/{id}/retry", post(retry_upload))
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    #[serde(flatten)]
    job: UploadJob,
    #[serde(flatten)]
    progress: progress::JobProgress,
}

async fn load_response(state: &AppState, job: UploadJob) -> anyhow::Result<UploadResponse> {
    let job_id = job.id.clone();
    let counts = with_conn(&state.db, move |conn| file::state_counts(conn, &job_id)).await?;
    let progress = progress::compute_job_progress(counts);
    Ok(UploadResponse { job, progress })
}

async fn list_uploads(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<UploadResponse>>, AppError> {
    let jobs = with_conn(&state.db, |conn| upload_job::find_all(conn)).await?;
    let mut out = Vec::with_capacity(jobs.len());
    for job in jobs {
        out.push(load_response(&state, job).await?);
    }
    Ok(Json(out))
}

async fn get_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UploadResponse>, AppError> {
    let job_id = id.clone();
    let job = with_conn(&state.db, move |conn| upload_job::find_by_id(conn, &job_id)).await?;
    match job {
        Some(job) => Ok(Json(load_response(&state, job).await?)),
        None => Err(AppError::NotFound(format!("upload job {id} not found"))),
    }
}

async fn get_upload_files(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<file::File>>, AppError> {
    let job_id = id.clone();
    let exists = with_conn(&state.db, move |conn| upload_job::exists(conn, &job_id)).await?;
    if !exists {
        return Err(AppError::NotFound(format!("upload job {id} not found")));
    }

    let job_id = id.clone();
    let files = with_conn(&state.db, move |conn| file::find_by_job_id(conn, &job_id)).await?;
    Ok(Json(files))
}

async fn create_upload(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateUploadJobRequest>,
) -> Result<(StatusCode, Json<UploadJob>), AppError> {
    if body.source_folder.trim().is_empty() {
        return Err(AppError::BadRequest("source_folder is required".into()));
    }
    if body.destination_bucket.trim().is_empty() {
        return Err(AppError::BadRequest("destination_bucket is required".into()));
    }
    if !FsPath::new(&body.source_folder).is_dir() {
        return Err(AppError::BadRequest(format!(
            "source_folder {:?} does not exist",
            body.source_folder
        )));
    }
    if let Some(id) = &body.id {
        let id = id.clone();
        if with_conn(&state.db, move |conn| upload_job::exists(conn, &id)).await? {
            return Err(AppError::Conflict(format!("upload job {id:?} already exists")));
        }
    }

    let job = with_conn(&state.db, move |conn| upload_job::create(conn, &body)).await?;

    let job_id = job.id.clone();
    let bg_state = state.clone();
    tokio::spawn(async move {
        orchestrator::process_upload_job(&bg_state, &job_id, false).await;
    });

    Ok((StatusCode::CREATED, Json(job)))
}

async fn retry_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UploadJob>, AppError> {
    let job_id = id.clone();
    let exists = with_conn(&state.db, move |conn| upload_job::exists(conn, &job_id)).await?;
    if !exists {
        return Err(AppError::NotFound(format!("upload job {id} not found")));
    }

    let bg_state = state.clone();
    let bg_id = id.clone();
    tokio::spawn(async move {
        orchestrator::retry_job(&bg_state, &bg_id).await;
    });

    let job_id = id.clone();
    let job = with_conn(&state.db, move |conn| upload_job::find_by_id(conn, &job_id)).await?;
    job.map(Json)
        .ok_or_else(|| AppError::NotFound(format!("upload job {id} not found")))
}
