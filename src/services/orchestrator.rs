//! Orchestrator (§4.4) — the job state machine. Grounded in
//! `agent_orchestrator.rs`'s `run_backup_job` shape (semaphore-gated
//! dispatch, `spawn_blocking`-wrapped DB access, log-and-continue on
//! per-unit failure) and in `orchestrator.py`'s exact reconciliation
//! algorithm.

use crate::db::connection::with_conn;
use crate::models::file::{self, File, FileState};
use crate::models::upload_job::{self, JobState};
use crate::object_store::ensure_bucket_exists;
use crate::services::{progress, scanner, upload_worker};
use crate::state::AppState;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unified entry point for initial processing, monitored re-scan, and
/// recovery. Returns `true` if the job reached `COMPLETED`.
pub async fn process_upload_job(
    state: &AppState,
    job_id: &str,
    recently_changed_filter: bool,
) -> bool {
    match process_upload_job_inner(state, job_id, recently_changed_filter).await {
        Ok(completed) => completed,
        Err(e) => {
            tracing::error!(job_id, "process_upload_job failed: {e:#}");
            false
        }
    }
}

async fn process_upload_job_inner(
    state: &AppState,
    job_id: &str,
    recently_changed_filter: bool,
) -> anyhow::Result<bool> {
    let job_id_owned = job_id.to_string();
    let job = with_conn(&state.db, move |conn| upload_job::find_by_id(conn, &job_id_owned)).await?;
    let Some(job) = job else {
        tracing::warn!(job_id, "job not found, skipping");
        return Ok(false);
    };

    let job_id_owned = job_id.to_string();
    with_conn(&state.db, move |conn| {
        upload_job::update_state(conn, &job_id_owned, JobState::InProgress)
    })
    .await?;

    let bucket_ok = ensure_bucket_exists(
        state.object_store.as_ref(),
        &job.destination_bucket,
        &state.config.aws_region,
    )
    .await?;
    if !bucket_ok {
        let job_id_owned = job_id.to_string();
        with_conn(&state.db, move |conn| {
            upload_job::update_state(conn, &job_id_owned, JobState::Failed)
        })
        .await?;
        return Ok(false);
    }

    let source_folder = PathBuf::from(&job.source_folder);
    let pattern = job.pattern.clone();
    let current = tokio::task::spawn_blocking(move || scanner::scan(&source_folder, &pattern)).await?;

    if current.is_empty() {
        let job_id_owned = job_id.to_string();
        with_conn(&state.db, move |conn| {
            upload_job::update_state(conn, &job_id_owned, JobState::Completed)
        })
        .await?;
        return Ok(true);
    }

    let stability_threshold = state.config.file_stability_threshold;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();

    let job_id_owned = job_id.to_string();
    let enqueued: Vec<File> = with_conn(&state.db, move |conn| {
        let existing = file::map_by_path(conn, &job_id_owned)?;
        let mut enqueued = Vec::new();

        for (path, fp) in current.iter() {
            if recently_changed_filter && now - fp.mtime < stability_threshold as f64 {
                continue;
            }

            match existing.get(path) {
                None => {
                    let row = file::create(conn, &job_id_owned, path, fp.mtime, fp.size)?;
                    enqueued.push(row);
                }
                Some(row) if row.state == FileState::Uploaded => {
                    if row.mtime != Some(fp.mtime) || row.size != Some(fp.size) {
                        file::reopen_for_reupload(conn, row.id, fp.mtime, fp.size)?;
                        if let Some(refreshed) = file::find_by_id(conn, row.id)? {
                            enqueued.push(refreshed);
                        }
                    }
                }
                Some(row) => {
                    // PENDING / IN_PROGRESS / FAILED: reset to PENDING but
                    // leave mtime/size untouched (§4.4 step 5).
                    file::reset_for_retry(conn, row.id)?;
                    if let Some(refreshed) = file::find_by_id(conn, row.id)? {
                        enqueued.push(refreshed);
                    }
                }
            }
        }

        Ok(enqueued)
    })
    .await?;

    let semaphore = state.job_semaphore(job_id).await;
    let mut tasks = Vec::with_capacity(enqueued.len());
    for row in enqueued {
        let permit = semaphore.clone().acquire_owned().await?;
        let pool = state.db.clone();
        let store = state.object_store.clone();
        let chunk_semaphore = state.chunk_semaphore.clone();
        let destination_bucket = job.destination_bucket.clone();
        let chunk_size = state.config.chunk_size;
        let source_folder = PathBuf::from(&job.source_folder);

        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            let result = upload_worker::upload_file(
                &pool,
                store.as_ref(),
                &chunk_semaphore,
                &row.upload_job_id,
                &destination_bucket,
                chunk_size,
                &source_folder,
                &row,
            )
            .await;
            if let Err(e) = result {
                tracing::warn!("upload worker failed: {e:#}");
            }
        }));
    }

    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!("upload task panicked: {e:#}");
        }
    }

    let job_id_owned = job_id.to_string();
    let job_id_for_state = job_id.to_string();
    let (counts, persisted) = with_conn(&state.db, move |conn| {
        let counts = file::state_counts(conn, &job_id_owned)?;
        let job = upload_job::find_by_id(conn, &job_id_owned)?
            .ok_or_else(|| anyhow::anyhow!("job disappeared mid-run"))?;
        Ok((counts, job.state))
    })
    .await?;

    let derived = progress::compute_job_state(counts, persisted);
    with_conn(&state.db, move |conn| {
        upload_job::update_state(conn, &job_id_for_state, derived)
    })
    .await?;

    Ok(derived == JobState::Completed)
}

/// `retry_job` (§4.4) — drop every non-`UPLOADED` row and re-run from
/// scratch.
pub async fn retry_job(state: &AppState, job_id: &str) -> bool {
    let job_id_owned = job_id.to_string();
    if let Err(e) = with_conn(&state.db, move |conn| {
        file::delete_non_uploaded(conn, &job_id_owned)
    })
    .await
    {
        tracing::error!(job_id, "retry_job failed to clear stale rows: {e:#}");
        return false;
    }

    process_upload_job(state, job_id, false).await
}
