use crate::db::connection::DbPool;
use std::path::Path;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS upload_jobs (
  id TEXT PRIMARY KEY,
  source_folder TEXT NOT NULL,
  destination_bucket TEXT NOT NULL,
  pattern TEXT NOT NULL DEFAULT '*',
  state TEXT NOT NULL DEFAULT 'PENDING' CHECK(state IN ('PENDING','IN_PROGRESS','COMPLETED','FAILED')),
  created_at TEXT NOT NULL DEFAULT (datetime('now')),
  updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS files (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  upload_job_id TEXT NOT NULL REFERENCES upload_jobs(id) ON DELETE CASCADE,
  path TEXT NOT NULL,
  state TEXT NOT NULL DEFAULT 'PENDING' CHECK(state IN ('PENDING','IN_PROGRESS','UPLOADED','FAILED')),
  failure_reason TEXT,
  mtime REAL,
  size INTEGER,
  created_at TEXT NOT NULL DEFAULT (datetime('now')),
  updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_files_job_path ON files(upload_job_id, path);
CREATE INDEX IF NOT EXISTS idx_files_job_state ON files(upload_job_id, state);
"#;

pub fn migrate(pool: &DbPool, database_path: &Path) -> anyhow::Result<()> {
    tracing::info!("Starting database migration...");

    let is_in_memory = database_path.to_string_lossy().starts_with("sqlite::memory:");
    if !is_in_memory {
        if let Some(parent) = database_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }

    let conn = pool.get()?;
    conn.execute_batch(SCHEMA)?;

    tracing::info!("Migration completed successfully");
    Ok(())
}
