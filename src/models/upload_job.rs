use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::InProgress => "IN_PROGRESS",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
        }
    }
}

impl FromStr for JobState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobState::Pending),
            "IN_PROGRESS" => Ok(JobState::InProgress),
            "COMPLETED" => Ok(JobState::Completed),
            "FAILED" => Ok(JobState::Failed),
            other => anyhow::bail!("unknown job state: {other}"),
        }
    }
}

impl ToSql for JobState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for JobState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        JobState::from_str(s).map_err(|e| FromSqlError::Other(e.into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadJob {
    pub id: String,
    pub source_folder: String,
    pub destination_bucket: String,
    pub pattern: String,
    pub state: JobState,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUploadJobRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub source_folder: String,
    pub destination_bucket: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
}

fn default_pattern() -> String {
    "*".to_string()
}

fn row_to_job(row: &Row) -> rusqlite::Result<UploadJob> {
    Ok(UploadJob {
        id: row.get("id")?,
        source_folder: row.get("source_folder")?,
        destination_bucket: row.get("destination_bucket")?,
        pattern: row.get("pattern")?,
        state: row.get("state")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn find_all(conn: &Connection) -> anyhow::Result<Vec<UploadJob>> {
    let mut stmt = conn.prepare("SELECT * FROM upload_jobs ORDER BY created_at DESC")?;
    let rows = stmt.query_map([], row_to_job)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn find_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<UploadJob>> {
    let mut stmt = conn.prepare("SELECT * FROM upload_jobs WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id], row_to_job)?;
    Ok(rows.next().and_then(|r| r.ok()))
}

pub fn find_by_state(conn: &Connection, states: &[JobState]) -> anyhow::Result<Vec<UploadJob>> {
    let placeholders = states.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = format!(
        "SELECT * FROM upload_jobs WHERE state IN ({placeholders}) ORDER BY created_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let values: Vec<&dyn ToSql> = states.iter().map(|s| s as &dyn ToSql).collect();
    let rows = stmt.query_map(values.as_slice(), row_to_job)?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn create(conn: &Connection, data: &CreateUploadJobRequest) -> anyhow::Result<UploadJob> {
    let id = data
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO upload_jobs (id, source_folder, destination_bucket, pattern, state, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            id,
            data.source_folder,
            data.destination_bucket,
            data.pattern,
            JobState::Pending,
            now,
            now,
        ],
    )?;
    find_by_id(conn, &id)?.ok_or_else(|| anyhow::anyhow!("Failed to retrieve created job"))
}

pub fn update_state(conn: &Connection, id: &str, state: JobState) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE upload_jobs SET state = ?, updated_at = datetime('now') WHERE id = ?",
        params![state, id],
    )?;
    Ok(())
}

pub fn exists(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    Ok(find_by_id(conn, id)?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_state_round_trips_through_str() {
        for state in [
            JobState::Pending,
            JobState::InProgress,
            JobState::Completed,
            JobState::Failed,
        ] {
            let parsed: JobState = state.as_str().parse().unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn job_state_rejects_unknown_string() {
        assert!("BOGUS".parse::<JobState>().is_err());
    }
}
