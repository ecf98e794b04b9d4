//! Upload Worker (§4.3) — uploads a single File row's bytes, single-PUT or
//! multipart depending on size, then verifies and settles the row's
//! terminal state. Grounded in `upload_worker.py`'s `upload_file` /
//! `_multipart_upload`, re-expressed against the `ObjectStore` trait and
//! the process-wide chunk semaphore from `AppState`.

use crate::db::connection::{with_conn, DbPool};
use crate::models::file;
use crate::object_store::{ObjectStore, UploadedPart};
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Upload the bytes at `source_path` to `bucket`/`key`, gating every
/// multipart part on `chunk_semaphore`. Does not touch the database; the
/// caller settles the File row's terminal state from the result.
///
/// Verification compares against the length of the bytes actually read
/// from `source_path` at upload time, not any previously recorded size —
/// a row reset for retry (`reset_for_retry`) keeps its stale `size` until
/// the row reaches `UPLOADED`, so that value is not a trustworthy
/// expectation here.
pub async fn upload_object(
    store: &dyn ObjectStore,
    chunk_semaphore: &Arc<Semaphore>,
    bucket: &str,
    key: &str,
    source_path: &Path,
    chunk_size: u64,
) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(source_path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", source_path.display()))?;
    let expected_size = bytes.len() as u64;

    if expected_size <= chunk_size {
        store.put_object(bucket, key, Bytes::from(bytes)).await?;
    } else {
        upload_multipart(store, chunk_semaphore, bucket, key, Bytes::from(bytes), chunk_size).await?;
    }

    let meta = store.head_object(bucket, key).await?;
    if meta.content_length != expected_size {
        anyhow::bail!("Upload verification failed");
    }
    Ok(())
}

async fn upload_multipart(
    store: &dyn ObjectStore,
    chunk_semaphore: &Arc<Semaphore>,
    bucket: &str,
    key: &str,
    body: Bytes,
    chunk_size: u64,
) -> anyhow::Result<()> {
    let upload_id = store.create_multipart(bucket, key).await?;

    let chunks: Vec<Bytes> = body
        .chunks(chunk_size as usize)
        .map(|c| Bytes::copy_from_slice(c))
        .collect();

    // Parts run concurrently as local futures (not spawned tasks) so they
    // can borrow `store` directly instead of requiring it behind an Arc.
    // The semaphore is only cloned here; each future acquires its own
    // permit once `join_all` actually polls it, so at most
    // `chunks_concurrency` permits are ever held regardless of how many
    // parts `N` this file has.
    let mut tasks = Vec::with_capacity(chunks.len());
    for (idx, chunk) in chunks.into_iter().enumerate() {
        let part_number = idx as i32 + 1;
        let chunk_semaphore = chunk_semaphore.clone();
        let upload_id = upload_id.clone();
        tasks.push(async move {
            let permit = chunk_semaphore.acquire_owned().await?;
            let result = store
                .upload_part(bucket, key, &upload_id, part_number, chunk)
                .await;
            drop(permit);
            result
        });
    }

    let results = futures_util::future::join_all(tasks).await;

    let mut parts = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(part) => parts.push(part),
            Err(e) => {
                let _ = store.abort_multipart(bucket, key, &upload_id).await;
                return Err(e);
            }
        }
    }

    parts.sort_by_key(|p: &UploadedPart| p.part_number);
    store.complete_multipart(bucket, key, &upload_id, parts).await?;
    Ok(())
}

/// Drive a single File row through `IN_PROGRESS → {UPLOADED, FAILED}`.
/// Returns `true` on success, matching the source worker's boolean
/// contract. The object-store calls run directly on the async task (they
/// are already non-blocking `aws-sdk-s3` futures); only the bookkeeping
/// `rusqlite` writes go through `spawn_blocking` via `with_conn`.
pub async fn upload_file(
    pool: &DbPool,
    store: &dyn ObjectStore,
    chunk_semaphore: &Arc<Semaphore>,
    upload_job_id: &str,
    destination_bucket: &str,
    chunk_size: u64,
    source_folder: &Path,
    file_row: &file::File,
) -> anyhow::Result<bool> {
    let file_id = file_row.id;
    with_conn(pool, move |conn| file::mark_in_progress(conn, file_id)).await?;

    let key = format!("{upload_job_id}/{}", file_row.path);
    let source_path = source_folder.join(&file_row.path);

    let result = upload_object(
        store,
        chunk_semaphore,
        destination_bucket,
        &key,
        &source_path,
        chunk_size,
    )
    .await;

    match result {
        Ok(()) => {
            with_conn(pool, move |conn| file::mark_uploaded(conn, file_id)).await?;
            Ok(true)
        }
        Err(e) => {
            let reason = e.to_string();
            with_conn(pool, move |conn| file::mark_failed(conn, file_id, &reason)).await?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::fake::FakeObjectStore;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn small_file_uses_single_put() {
        let store = FakeObjectStore::new();
        store.create_bucket("bucket", "us-east-1").await.unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello world").unwrap();

        let sem = Arc::new(Semaphore::new(4));
        upload_object(&store, &sem, "bucket", "job/a.txt", &path, 5 * 1024 * 1024)
            .await
            .unwrap();

        assert_eq!(store.get("bucket", "job/a.txt").unwrap().len(), 11);
    }

    #[tokio::test]
    async fn large_file_splits_into_multipart() {
        let store = FakeObjectStore::new();
        store.create_bucket("bucket", "us-east-1").await.unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        let data = vec![7u8; 25];
        std::fs::write(&path, &data).unwrap();

        let sem = Arc::new(Semaphore::new(4));
        upload_object(&store, &sem, "bucket", "job/big.bin", &path, 10)
            .await
            .unwrap();

        let stored = store.get("bucket", "job/big.bin").unwrap();
        assert_eq!(stored.as_ref(), data.as_slice());
    }

    /// Regression test for a deadlock where all `N` part permits were
    /// acquired up front in the loop body, before any part future was
    /// polled, starving the `(chunks_concurrency + 1)`-th part forever.
    /// 7 parts against a semaphore of capacity 2 forces the queueing path.
    #[tokio::test]
    async fn part_count_exceeding_semaphore_capacity_does_not_deadlock() {
        let store = FakeObjectStore::new();
        store.create_bucket("bucket", "us-east-1").await.unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        let data: Vec<u8> = (0..70u32).map(|b| b as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let sem = Arc::new(Semaphore::new(2));
        tokio::time::timeout(
            Duration::from_secs(5),
            upload_object(&store, &sem, "bucket", "job/big.bin", &path, 10),
        )
        .await
        .expect("upload_object hung instead of draining the part queue")
        .unwrap();

        let stored = store.get("bucket", "job/big.bin").unwrap();
        assert_eq!(stored.as_ref(), data.as_slice());
    }

    #[tokio::test]
    async fn verification_uses_bytes_actually_read_not_a_caller_supplied_size() {
        // A row reset for retry keeps its stale `size` column. Verification
        // must succeed off the freshly read byte count regardless of what
        // any earlier, possibly-stale record said the size should be.
        let store = FakeObjectStore::new();
        store.create_bucket("bucket", "us-east-1").await.unwrap();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        let sem = Arc::new(Semaphore::new(4));
        upload_object(&store, &sem, "bucket", "job/a.txt", &path, 5 * 1024 * 1024)
            .await
            .unwrap();

        assert_eq!(store.get("bucket", "job/a.txt").unwrap().len(), 5);
    }
}
