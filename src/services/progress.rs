//! Progress Projector (§4.6) — a pure function over File row counts, never
//! persisting its own output. Grounded in the original `core/progress.py`,
//! expressed here against `models::file::StateCounts`.

use crate::models::file::StateCounts;
use crate::models::upload_job::JobState;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct JobProgress {
    pub total_files: i64,
    pub uploaded_files: i64,
    pub failed_files: i64,
    pub progress: f64,
}

pub fn compute_job_progress(counts: StateCounts) -> JobProgress {
    let progress = if counts.total == 0 {
        1.0
    } else {
        counts.uploaded as f64 / counts.total as f64
    };
    JobProgress {
        total_files: counts.total,
        uploaded_files: counts.uploaded,
        failed_files: counts.failed,
        progress,
    }
}

/// Derive the live job state from file counts and the persisted state,
/// without writing anything back.
pub fn compute_job_state(counts: StateCounts, persisted: JobState) -> JobState {
    if counts.total == 0 {
        return JobState::Completed;
    }
    if counts.uploaded == counts.total {
        return JobState::Completed;
    }
    if counts.failed > 0 && counts.uploaded + counts.failed == counts.total {
        return JobState::Failed;
    }
    match persisted {
        JobState::Pending | JobState::InProgress => persisted,
        _ => JobState::InProgress,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(total: i64, uploaded: i64, failed: i64) -> StateCounts {
        StateCounts {
            total,
            uploaded,
            failed,
        }
    }

    #[test]
    fn empty_job_is_complete_with_full_progress() {
        let c = counts(0, 0, 0);
        assert_eq!(compute_job_progress(c).progress, 1.0);
        assert_eq!(compute_job_state(c, JobState::Pending), JobState::Completed);
    }

    #[test]
    fn all_uploaded_is_complete() {
        let c = counts(4, 4, 0);
        assert_eq!(compute_job_state(c, JobState::InProgress), JobState::Completed);
    }

    #[test]
    fn partial_failure_with_no_pending_work_is_failed() {
        let c = counts(4, 3, 1);
        assert_eq!(compute_job_progress(c).progress, 0.75);
        assert_eq!(compute_job_state(c, JobState::InProgress), JobState::Failed);
    }

    #[test]
    fn persisted_pending_or_in_progress_is_preserved_while_work_remains() {
        let c = counts(4, 2, 0);
        assert_eq!(compute_job_state(c, JobState::Pending), JobState::Pending);
        assert_eq!(compute_job_state(c, JobState::InProgress), JobState::InProgress);
    }

    #[test]
    fn remaining_work_with_non_pending_persisted_state_is_in_progress() {
        let c = counts(4, 2, 0);
        assert_eq!(compute_job_state(c, JobState::Completed), JobState::InProgress);
        assert_eq!(compute_job_state(c, JobState::Failed), JobState::InProgress);
    }
}
