use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Run `f` against a pooled connection on a blocking-pool thread, following
/// the teacher's `spawn_blocking`-around-every-`rusqlite`-call convention
/// without repeating the join/get boilerplate at each call site.
pub async fn with_conn<F, T>(pool: &DbPool, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        f(&conn)
    })
    .await?
}

/// Create a pooled connection to `database_url`. Accepts a filesystem path,
/// or the special values `sqlite::memory:` / `sqlite::memory:?cache=shared`
/// used by tests that want the pool's shape without touching disk.
pub fn create_pool(database_url: &str) -> DbPool {
    let in_memory = database_url.starts_with("sqlite::memory:");
    let manager = if in_memory {
        SqliteConnectionManager::memory()
    } else {
        SqliteConnectionManager::file(database_url)
    };

    // An in-memory sqlite database is private to the connection that opened
    // it, so a pool of >1 connections would each see an empty schema. Cap
    // the pool at a single connection in that case; tests never need more.
    let pool = Pool::builder()
        .max_size(if in_memory { 1 } else { 8 })
        .build(manager)
        .expect("Failed to create DB pool");

    let conn = pool.get().expect("Failed to get DB connection");
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;",
    )
    .expect("Failed to set PRAGMA");

    pool
}

pub fn close_pool(pool: &DbPool) {
    if let Ok(conn) = pool.get() {
        let _ = conn.execute_batch("PRAGMA wal_checkpoint(FULL)");
    }
}
