//! `S3ObjectStore` — the production `ObjectStore`, backed by `aws-sdk-s3`.
//!
//! Grounded in the multipart-upload shape from `upload_worker.py` and the
//! custom-endpoint wiring used by `s3_client.py` for MinIO/localstack.

use super::{ObjectMeta, ObjectStore, UploadedPart};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub async fn new(
        region: &str,
        endpoint_url: Option<&str>,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> Self {
        let region_provider = aws_config::Region::new(region.to_string());
        let credentials = aws_sdk_s3::config::Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "objstore-sync",
        );

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(region_provider)
            .credentials_provider(credentials);

        if let Some(endpoint) = endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let shared_config = loader.load().await;
        let mut s3_config = aws_sdk_s3::config::Builder::from(&shared_config);
        if endpoint_url.is_some() {
            // Path-style addressing is required by most S3-compatible
            // emulators (MinIO, localstack) when using a custom endpoint.
            s3_config = s3_config.force_path_style(true);
        }

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config.build()),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn head_bucket(&self, bucket: &str) -> anyhow::Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn create_bucket(&self, bucket: &str, region: &str) -> anyhow::Result<()> {
        let mut req = self.client.create_bucket().bucket(bucket);

        // us-east-1 is the default region and rejects an explicit
        // LocationConstraint pointing back at itself.
        if region != "us-east-1" {
            let constraint = aws_sdk_s3::types::BucketLocationConstraint::from(region);
            let cfg = aws_sdk_s3::types::CreateBucketConfiguration::builder()
                .location_constraint(constraint)
                .build();
            req = req.create_bucket_configuration(cfg);
        }

        req.send().await?;
        Ok(())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Bytes) -> anyhow::Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await?;
        Ok(())
    }

    async fn create_multipart(&self, bucket: &str, key: &str) -> anyhow::Result<String> {
        let resp = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;
        resp.upload_id()
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("create_multipart_upload returned no upload id"))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> anyhow::Result<UploadedPart> {
        let resp = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(body))
            .send()
            .await?;
        let etag = resp
            .e_tag()
            .map(String::from)
            .ok_or_else(|| anyhow::anyhow!("upload_part returned no etag"))?;
        Ok(UploadedPart { part_number, etag })
    }

    async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<UploadedPart>,
    ) -> anyhow::Result<()> {
        let completed_parts = parts
            .into_iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(p.etag)
                    .build()
            })
            .collect();

        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await?;
        Ok(())
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> anyhow::Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await?;
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> anyhow::Result<ObjectMeta> {
        let resp = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await?;
        Ok(ObjectMeta {
            content_length: resp.content_length().unwrap_or(0).max(0) as u64,
        })
    }
}
