//! Integration tests exercising reconcile → upload → verify → project
//! end to end, against an in-memory sqlite pool and the in-memory fake
//! `ObjectStore` (§10.7, §8 scenarios).

use objstore_sync::config::AppConfig;
use objstore_sync::db::connection::{create_pool, with_conn, DbPool};
use objstore_sync::db::migrate::migrate;
use objstore_sync::models::file::{self, FileState};
use objstore_sync::models::upload_job::{self, CreateUploadJobRequest, JobState};
use objstore_sync::object_store::fake::FakeObjectStore;
use objstore_sync::object_store::ObjectStore;
use objstore_sync::services::orchestrator;
use objstore_sync::state::AppState;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn test_config(stability_threshold: u64) -> AppConfig {
    AppConfig {
        port: 0,
        database_url: PathBuf::from("sqlite::memory:"),
        aws_access_key_id: "test".into(),
        aws_secret_access_key: "test".into(),
        aws_region: "us-east-1".into(),
        aws_endpoint_url: None,
        chunk_size: 10,
        worker_concurrency: 5,
        chunks_concurrency: 10,
        file_monitor_interval: 60,
        file_stability_threshold: stability_threshold,
        log_level: "info".into(),
    }
}

fn fresh_pool() -> DbPool {
    let pool = create_pool("sqlite::memory:");
    migrate(&pool, &PathBuf::from("sqlite::memory:")).unwrap();
    pool
}

fn make_state(pool: DbPool, config: AppConfig, store: Arc<dyn ObjectStore>) -> Arc<AppState> {
    Arc::new(AppState::new(pool, config, store))
}

async fn create_job(pool: &DbPool, source_folder: &TempDir, pattern: &str) -> String {
    let req = CreateUploadJobRequest {
        id: None,
        source_folder: source_folder.path().to_string_lossy().to_string(),
        destination_bucket: "bucket".into(),
        pattern: pattern.to_string(),
    };
    let job = with_conn(pool, move |conn| upload_job::create(conn, &req))
        .await
        .unwrap();
    job.id
}

async fn job_state(pool: &DbPool, job_id: &str) -> JobState {
    let job_id = job_id.to_string();
    with_conn(pool, move |conn| upload_job::find_by_id(conn, &job_id))
        .await
        .unwrap()
        .unwrap()
        .state
}

async fn files_for(pool: &DbPool, job_id: &str) -> Vec<file::File> {
    let job_id = job_id.to_string();
    with_conn(pool, move |conn| file::find_by_job_id(conn, &job_id))
        .await
        .unwrap()
}

#[tokio::test]
async fn small_and_large_mix_uploads_every_matching_file() {
    let pool = fresh_pool();
    let state = make_state(pool.clone(), test_config(30), Arc::new(FakeObjectStore::new()));
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), vec![0u8; 1]).unwrap();
    std::fs::write(dir.path().join("b.txt"), vec![0u8; 5]).unwrap();
    std::fs::write(dir.path().join("c.txt"), vec![0u8; 20]).unwrap();
    std::fs::write(dir.path().join("d.txt"), vec![0u8; 25]).unwrap();

    let job_id = create_job(&pool, &dir, "*.txt").await;
    let completed = orchestrator::process_upload_job(&state, &job_id, false).await;
    assert!(completed);
    assert_eq!(job_state(&pool, &job_id).await, JobState::Completed);

    let files = files_for(&pool, &job_id).await;
    assert_eq!(files.len(), 4);
    assert!(files.iter().all(|f| f.state == FileState::Uploaded));
}

#[tokio::test]
async fn pattern_filter_excludes_non_matching_files() {
    let pool = fresh_pool();
    let state = make_state(pool.clone(), test_config(30), Arc::new(FakeObjectStore::new()));
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), vec![0u8; 4]).unwrap();
    std::fs::write(dir.path().join("e.log"), vec![0u8; 4]).unwrap();

    let job_id = create_job(&pool, &dir, "*.txt").await;
    orchestrator::process_upload_job(&state, &job_id, false).await;

    let files = files_for(&pool, &job_id).await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "a.txt");
}

#[tokio::test]
async fn stability_deferral_skips_recently_written_files_then_picks_them_up() {
    let pool = fresh_pool();
    let store: Arc<dyn ObjectStore> = Arc::new(FakeObjectStore::new());
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), vec![0u8; 4]).unwrap();

    let job_id = create_job(&pool, &dir, "*.txt").await;

    let state_strict = make_state(pool.clone(), test_config(30), store.clone());
    orchestrator::process_upload_job(&state_strict, &job_id, false).await;

    std::fs::write(dir.path().join("new.txt"), vec![0u8; 4]).unwrap();
    orchestrator::process_upload_job(&state_strict, &job_id, true).await;
    assert_eq!(
        files_for(&pool, &job_id).await.len(),
        1,
        "new.txt should be deferred while inside the stability window"
    );

    tokio::time::sleep(Duration::from_millis(50)).await;

    let state_lenient = make_state(pool.clone(), test_config(0), store.clone());
    orchestrator::process_upload_job(&state_lenient, &job_id, true).await;
    assert_eq!(files_for(&pool, &job_id).await.len(), 2, "new.txt should now be picked up");
}

#[tokio::test]
async fn modified_file_is_reuploaded_with_new_size() {
    let pool = fresh_pool();
    let state = make_state(pool.clone(), test_config(0), Arc::new(FakeObjectStore::new()));
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("f.txt"), vec![1u8; 4]).unwrap();

    let job_id = create_job(&pool, &dir, "*.txt").await;
    orchestrator::process_upload_job(&state, &job_id, false).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    std::fs::write(dir.path().join("f.txt"), vec![2u8; 9]).unwrap();

    orchestrator::process_upload_job(&state, &job_id, true).await;

    let files = files_for(&pool, &job_id).await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].state, FileState::Uploaded);
    assert_eq!(files[0].size, Some(9));
}

#[tokio::test]
async fn retry_job_reuploads_files_cleared_after_a_transient_failure() {
    let pool = fresh_pool();
    let fake = Arc::new(FakeObjectStore::new());
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), vec![0u8; 4]).unwrap();
    std::fs::write(dir.path().join("bad.txt"), vec![0u8; 4]).unwrap();

    let job_id = create_job(&pool, &dir, "*.txt").await;
    fake.fail_key("bucket", &format!("{job_id}/bad.txt"));

    let store: Arc<dyn ObjectStore> = fake.clone();
    let state = make_state(pool.clone(), test_config(30), store);
    orchestrator::process_upload_job(&state, &job_id, false).await;
    assert_eq!(job_state(&pool, &job_id).await, JobState::Failed);

    // The transient condition clears; retrying should now converge.
    fake.unfail_key("bucket", &format!("{job_id}/bad.txt"));
    let retried = orchestrator::retry_job(&state, &job_id).await;
    assert!(retried);
    assert_eq!(job_state(&pool, &job_id).await, JobState::Completed);

    let files = files_for(&pool, &job_id).await;
    assert!(files.iter().all(|f| f.state == FileState::Uploaded));
}

#[tokio::test]
async fn partial_failure_leaves_job_failed_with_correct_progress() {
    let pool = fresh_pool();
    let fake = Arc::new(FakeObjectStore::new());
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), vec![0u8; 4]).unwrap();
    std::fs::write(dir.path().join("b.txt"), vec![0u8; 4]).unwrap();
    std::fs::write(dir.path().join("c.txt"), vec![0u8; 4]).unwrap();
    std::fs::write(dir.path().join("bad.txt"), vec![0u8; 4]).unwrap();

    let job_id = create_job(&pool, &dir, "*.txt").await;
    fake.fail_key("bucket", &format!("{job_id}/bad.txt"));

    let store: Arc<dyn ObjectStore> = fake;
    let state = make_state(pool.clone(), test_config(30), store);
    let completed = orchestrator::process_upload_job(&state, &job_id, false).await;
    assert!(!completed);

    let files = files_for(&pool, &job_id).await;
    let uploaded = files.iter().filter(|f| f.state == FileState::Uploaded).count();
    let failed = files.iter().filter(|f| f.state == FileState::Failed).count();
    assert_eq!(uploaded, 3);
    assert_eq!(failed, 1);

    let failed_row = files.iter().find(|f| f.state == FileState::Failed).unwrap();
    assert!(failed_row.failure_reason.is_some());
    assert_eq!(job_state(&pool, &job_id).await, JobState::Failed);
}
