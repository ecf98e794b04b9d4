//! Thin wrapper over the S3-compatible object-store API (§4.1).
//!
//! Expressed as a trait rather than a concrete singleton (per the
//! "Global singleton services" redesign flag) so the orchestrator and
//! upload worker can be exercised against an in-memory fake in tests.

pub mod fake;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;

#[derive(Debug, Clone)]
pub struct UploadedPart {
    pub part_number: i32,
    pub etag: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ObjectMeta {
    pub content_length: u64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn head_bucket(&self, bucket: &str) -> anyhow::Result<bool>;

    async fn create_bucket(&self, bucket: &str, region: &str) -> anyhow::Result<()>;

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> anyhow::Result<()>;

    async fn create_multipart(&self, bucket: &str, key: &str) -> anyhow::Result<String>;

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> anyhow::Result<UploadedPart>;

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> anyhow::Result<()>;

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> anyhow::Result<()>;

    async fn head_object(&self, bucket: &str, key: &str) -> anyhow::Result<ObjectMeta>;
}

/// `ensure_bucket_exists` (source: `s3_client.ensure_bucket_exists`) — check
/// then create-on-404, tolerant of the store reporting existence via an
/// already-owned-by-us conflict.
pub async fn ensure_bucket_exists(
    store: &dyn ObjectStore,
    bucket: &str,
    region: &str,
) -> anyhow::Result<bool> {
    if store.head_bucket(bucket).await.unwrap_or(false) {
        return Ok(true);
    }

    match store.create_bucket(bucket, region).await {
        Ok(()) => Ok(true),
        Err(e) => {
            // The bucket may have been created by a racing job between the
            // head check and the create call; re-check before giving up.
            if store.head_bucket(bucket).await.unwrap_or(false) {
                Ok(true)
            } else {
                tracing::error!("Failed to create bucket {bucket}: {e:#}");
                Ok(false)
            }
        }
    }
}
