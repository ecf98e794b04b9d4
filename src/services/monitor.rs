//! File Monitor (§4.5) — periodic re-scan of completed jobs. Grounded in
//! `server_ping.rs`'s `tokio::select!` + `CancellationToken` + interval
//! loop shape.

use crate::db::connection::with_conn;
use crate::models::upload_job::{self, JobState};
use crate::services::orchestrator;
use crate::state::AppState;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn start_file_monitor(state: Arc<AppState>, cancel: CancellationToken) {
    let period = Duration::from_secs(state.config.file_monitor_interval.max(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("file monitor stopping");
                    break;
                }
                _ = interval.tick() => {
                    run_tick(&state).await;
                }
            }
        }
    });
}

async fn run_tick(state: &AppState) {
    let jobs = with_conn(&state.db, |conn| {
        upload_job::find_by_state(conn, &[JobState::Completed])
    })
    .await;

    let jobs = match jobs {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::error!("file monitor failed to list completed jobs: {e:#}");
            return;
        }
    };

    for job in jobs {
        if !Path::new(&job.source_folder).exists() {
            tracing::warn!(job_id = %job.id, "source folder missing, skipping monitored re-scan");
            continue;
        }
        orchestrator::process_upload_job(state, &job.id, true).await;
    }
}
