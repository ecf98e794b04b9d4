//! In-memory `ObjectStore` used by integration tests, capable of
//! simulating per-key failures (§8 scenario 6, partial failure).

use super::{ObjectMeta, ObjectStore, UploadedPart};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct MultipartUpload {
    parts: HashMap<i32, Bytes>,
}

#[derive(Default)]
pub struct FakeObjectStore {
    buckets: Mutex<HashSet<String>>,
    objects: Mutex<HashMap<(String, String), Bytes>>,
    multiparts: Mutex<HashMap<String, MultipartUpload>>,
    failing_keys: Mutex<HashSet<(String, String)>>,
}

impl FakeObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any upload touching this (bucket, key) pair fails until cleared.
    pub fn fail_key(&self, bucket: &str, key: &str) {
        self.failing_keys
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()));
    }

    /// Clear a previously injected failure for (bucket, key).
    pub fn unfail_key(&self, bucket: &str, key: &str) {
        self.failing_keys
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
    }

    fn should_fail(&self, bucket: &str, key: &str) -> bool {
        self.failing_keys
            .lock()
            .unwrap()
            .contains(&(bucket.to_string(), key.to_string()))
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn head_bucket(&self, bucket: &str) -> anyhow::Result<bool> {
        Ok(self.buckets.lock().unwrap().contains(bucket))
    }

    async fn create_bucket(&self, bucket: &str, _region: &str) -> anyhow::Result<()> {
        self.buckets.lock().unwrap().insert(bucket.to_string());
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> anyhow::Result<()> {
        if self.should_fail(bucket, key) {
            anyhow::bail!("simulated failure for {bucket}/{key}");
        }
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }

    async fn create_multipart(&self, bucket: &str, key: &str) -> anyhow::Result<String> {
        if self.should_fail(bucket, key) {
            anyhow::bail!("simulated failure for {bucket}/{key}");
        }
        let upload_id = format!("fake-upload-{}-{}", bucket, key.replace('/', "_"));
        self.multiparts
            .lock()
            .unwrap()
            .insert(upload_id.clone(), MultipartUpload::default());
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> anyhow::Result<UploadedPart> {
        if self.should_fail(bucket, key) {
            anyhow::bail!("simulated failure for {bucket}/{key}");
        }
        let mut multiparts = self.multiparts.lock().unwrap();
        let upload = multiparts
            .get_mut(upload_id)
            .ok_or_else(|| anyhow::anyhow!("unknown upload id {upload_id}"))?;
        upload.parts.insert(part_number, body);
        Ok(UploadedPart {
            part_number,
            etag: format!("etag-{part_number}"),
        })
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> anyhow::Result<()> {
        if self.should_fail(bucket, key) {
            anyhow::bail!("simulated failure for {bucket}/{key}");
        }
        let upload = self
            .multiparts
            .lock()
            .unwrap()
            .remove(upload_id)
            .ok_or_else(|| anyhow::anyhow!("unknown upload id {upload_id}"))?;

        let mut assembled = BytesMut::new();
        let mut numbers: Vec<i32> = parts.iter().map(|p| p.part_number).collect();
        numbers.sort_unstable();
        for number in numbers {
            let chunk = upload
                .parts
                .get(&number)
                .ok_or_else(|| anyhow::anyhow!("missing part {number} for {upload_id}"))?;
            assembled.extend_from_slice(chunk);
        }

        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), assembled.freeze());
        Ok(())
    }

    async fn abort_multipart(&self, _bucket: &str, _key: &str, upload_id: &str) -> anyhow::Result<()> {
        self.multiparts.lock().unwrap().remove(upload_id);
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> anyhow::Result<ObjectMeta> {
        let objects = self.objects.lock().unwrap();
        let body = objects
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| anyhow::anyhow!("object not found: {bucket}/{key}"))?;
        Ok(ObjectMeta {
            content_length: body.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_head_reports_matching_length() {
        let store = FakeObjectStore::new();
        store.create_bucket("b", "us-east-1").await.unwrap();
        store
            .put_object("b", "k", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        let meta = store.head_object("b", "k").await.unwrap();
        assert_eq!(meta.content_length, 5);
    }

    #[tokio::test]
    async fn failing_key_rejects_put_and_multipart() {
        let store = FakeObjectStore::new();
        store.create_bucket("b", "us-east-1").await.unwrap();
        store.fail_key("b", "bad");
        assert!(store
            .put_object("b", "bad", Bytes::from_static(b"x"))
            .await
            .is_err());
        assert!(store.create_multipart("b", "bad").await.is_err());
    }

    #[tokio::test]
    async fn multipart_assembles_parts_in_order() {
        let store = FakeObjectStore::new();
        store.create_bucket("b", "us-east-1").await.unwrap();
        let upload_id = store.create_multipart("b", "k").await.unwrap();
        let p2 = store
            .upload_part("b", "k", &upload_id, 2, Bytes::from_static(b"world"))
            .await
            .unwrap();
        let p1 = store
            .upload_part("b", "k", &upload_id, 1, Bytes::from_static(b"hello"))
            .await
            .unwrap();
        store
            .complete_multipart("b", "k", &upload_id, vec![p1, p2])
            .await
            .unwrap();
        assert_eq!(store.get("b", "k").unwrap(), Bytes::from_static(b"helloworld"));
    }
}
