//! Recovery (§4.7) — at process start, revive jobs left in a non-terminal
//! state by a previous run. Fire-and-forget, mirroring the teacher's
//! startup-time background spawns in `main.rs`.

use crate::db::connection::with_conn;
use crate::models::upload_job::{self, JobState};
use crate::services::orchestrator;
use crate::state::AppState;
use std::sync::Arc;

pub async fn resume_incomplete_jobs(state: Arc<AppState>) {
    let jobs = with_conn(&state.db, |conn| {
        upload_job::find_by_state(conn, &[JobState::Pending, JobState::InProgress])
    })
    .await;

    let jobs = match jobs {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::error!("recovery failed to list incomplete jobs: {e:#}");
            return;
        }
    };

    tracing::info!("resuming {} incomplete job(s)", jobs.len());

    for job in jobs {
        let state = state.clone();
        tokio::spawn(async move {
            orchestrator::retry_job(&state, &job.id).await;
        });
    }
}
