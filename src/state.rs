use crate::config::AppConfig;
use crate::db::connection::DbPool;
use crate::object_store::ObjectStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};

/// Shared application state, handed to route handlers and background
/// tasks behind an `Arc`. Mirrors the teacher's `AppState`: a DB pool, a
/// global concurrency gate, and a lazily-populated per-job gate.
pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub object_store: Arc<dyn ObjectStore>,

    /// Bounds the total number of chunks/parts in flight across every job
    /// (§6.3 `chunks_concurrency`).
    pub chunk_semaphore: Arc<Semaphore>,

    /// Bounds how many files a single job uploads concurrently
    /// (§6.3 `worker_concurrency`), keyed by job id and created on first use.
    job_semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig, object_store: Arc<dyn ObjectStore>) -> Self {
        let chunk_semaphore = Arc::new(Semaphore::new(config.chunks_concurrency));
        Self {
            db,
            config,
            object_store,
            chunk_semaphore,
            job_semaphores: Mutex::new(HashMap::new()),
        }
    }

    pub async fn job_semaphore(&self, job_id: &str) -> Arc<Semaphore> {
        let mut map = self.job_semaphores.lock().await;
        map.entry(job_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.worker_concurrency)))
            .clone()
    }
}
