use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileState {
    Pending,
    InProgress,
    Uploaded,
    Failed,
}

impl FileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Pending => "PENDING",
            FileState::InProgress => "IN_PROGRESS",
            FileState::Uploaded => "UPLOADED",
            FileState::Failed => "FAILED",
        }
    }
}

impl FromStr for FileState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(FileState::Pending),
            "IN_PROGRESS" => Ok(FileState::InProgress),
            "UPLOADED" => Ok(FileState::Uploaded),
            "FAILED" => Ok(FileState::Failed),
            other => anyhow::bail!("unknown file state: {other}"),
        }
    }
}

impl ToSql for FileState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for FileState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        FileState::from_str(s).map_err(|e| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub id: i64,
    pub upload_job_id: String,
    pub path: String,
    pub state: FileState,
    pub failure_reason: Option<String>,
    pub mtime: Option<f64>,
    pub size: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Counts used by the progress projector (§4.6): total, uploaded, failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateCounts {
    pub total: i64,
    pub uploaded: i64,
    pub failed: i64,
}

fn row_to_file(row: &Row) -> rusqlite::Result<File> {
    Ok(File {
        id: row.get("id")?,
        upload_job_id: row.get("upload_job_id")?,
        path: row.get("path")?,
        state: row.get("state")?,
        failure_reason: row.get("failure_reason")?,
        mtime: row.get("mtime")?,
        size: row.get("size")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn find_by_job_id(conn: &Connection, upload_job_id: &str) -> anyhow::Result<Vec<File>> {
    let mut stmt =
        conn.prepare("SELECT * FROM files WHERE upload_job_id = ? ORDER BY path ASC")?;
    let rows = stmt.query_map(params![upload_job_id], row_to_file)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Existing rows for a job, keyed by relative path, for reconciliation.
pub fn map_by_path(conn: &Connection, upload_job_id: &str) -> anyhow::Result<HashMap<String, File>> {
    Ok(find_by_job_id(conn, upload_job_id)?
        .into_iter()
        .map(|f| (f.path.clone(), f))
        .collect())
}

pub fn find_by_id(conn: &Connection, id: i64) -> anyhow::Result<Option<File>> {
    let mut stmt = conn.prepare("SELECT * FROM files WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id], row_to_file)?;
    Ok(rows.next().and_then(|r| r.ok()))
}

pub fn create(
    conn: &Connection,
    upload_job_id: &str,
    path: &str,
    mtime: f64,
    size: i64,
) -> anyhow::Result<File> {
    conn.execute(
        "INSERT INTO files (upload_job_id, path, state, mtime, size)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![upload_job_id, path, FileState::Pending, mtime, size],
    )?;
    let id = conn.last_insert_rowid();
    find_by_id(conn, id)?.ok_or_else(|| anyhow::anyhow!("Failed to retrieve created file row"))
}

/// Reopen an UPLOADED row whose source changed: refresh the fingerprint and
/// reset to PENDING.
pub fn reopen_for_reupload(conn: &Connection, id: i64, mtime: f64, size: i64) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE files SET state = ?, mtime = ?, size = ?, failure_reason = NULL, updated_at = datetime('now') WHERE id = ?",
        params![FileState::Pending, mtime, size, id],
    )?;
    Ok(())
}

/// Reset a PENDING/IN_PROGRESS/FAILED row back to PENDING without touching
/// its recorded mtime/size (§4.4 step 5, §9 open question).
pub fn reset_for_retry(conn: &Connection, id: i64) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE files SET state = ?, failure_reason = NULL, updated_at = datetime('now') WHERE id = ?",
        params![FileState::Pending, id],
    )?;
    Ok(())
}

pub fn mark_in_progress(conn: &Connection, id: i64) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE files SET state = ?, updated_at = datetime('now') WHERE id = ?",
        params![FileState::InProgress, id],
    )?;
    Ok(())
}

pub fn mark_uploaded(conn: &Connection, id: i64) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE files SET state = ?, failure_reason = NULL, updated_at = datetime('now') WHERE id = ?",
        params![FileState::Uploaded, id],
    )?;
    Ok(())
}

pub fn mark_failed(conn: &Connection, id: i64, reason: &str) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE files SET state = ?, failure_reason = ?, updated_at = datetime('now') WHERE id = ?",
        params![FileState::Failed, reason, id],
    )?;
    Ok(())
}

/// Delete every row for `upload_job_id` that is not UPLOADED, as used by
/// `retry_job` (§4.4).
pub fn delete_non_uploaded(conn: &Connection, upload_job_id: &str) -> anyhow::Result<usize> {
    let changed = conn.execute(
        "DELETE FROM files WHERE upload_job_id = ? AND state != ?",
        params![upload_job_id, FileState::Uploaded],
    )?;
    Ok(changed)
}

pub fn state_counts(conn: &Connection, upload_job_id: &str) -> anyhow::Result<StateCounts> {
    let mut counts = StateCounts::default();
    let mut stmt = conn.prepare(
        "SELECT state, COUNT(*) FROM files WHERE upload_job_id = ? GROUP BY state",
    )?;
    let rows = stmt.query_map(params![upload_job_id], |row| {
        let state: FileState = row.get(0)?;
        let count: i64 = row.get(1)?;
        Ok((state, count))
    })?;
    for row in rows {
        let (state, count) = row?;
        counts.total += count;
        match state {
            FileState::Uploaded => counts.uploaded += count,
            FileState::Failed => counts.failed += count,
            _ => {}
        }
    }
    Ok(counts)
}
