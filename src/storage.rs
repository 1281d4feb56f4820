use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::{presigning::PresigningConfig, primitives::ByteStream};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// StorageError
///
/// Failures of the object store. All of them surface as 503 to clients.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    Upload(String),

    #[error("delete failed: {0}")]
    Delete(String),

    #[error("signed url generation failed: {0}")]
    SignedUrl(String),

    #[error("invalid object key: {0}")]
    InvalidKey(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService
///
/// Contract for the CV bucket. The real client talks to the Supabase S3 gateway
/// (MinIO locally); the mock keeps objects in memory.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in the `Env::Local` setup to provision
    /// the bucket in MinIO.
    async fn ensure_bucket_exists(&self);

    /// Stores `bytes` under `key`, overwriting any existing object. Returns the key.
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str)
    -> StorageResult<String>;

    /// Removes the object stored under `key`.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Generates a time-limited GET URL for `key`.
    async fn signed_url(&self, key: &str, expires_in: Duration) -> StorageResult<String>;
}

/// StorageState
pub type StorageState = Arc<dyn StorageService>;

/// sanitize_key
///
/// Drops directory navigation components (`..`, `.`) and empty segments from a key.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

fn checked_key(key: &str) -> StorageResult<String> {
    let sanitized = sanitize_key(key);
    if sanitized.is_empty() {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(sanitized)
}

/// S3StorageClient
///
/// AWS SDK client pointed at an S3-compatible endpoint. `force_path_style(true)` is
/// required by both MinIO and the Supabase Storage gateway.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    async fn ensure_bucket_exists(&self) {
        // CreateBucket is idempotent; an "already owned" error is expected on restart.
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!(bucket = %self.bucket_name, error = ?e, "create_bucket skipped");
        }
    }

    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<String> {
        if bytes.is_empty() {
            return Err(StorageError::Upload("empty file".to_string()));
        }
        let key = checked_key(key)?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| StorageError::Upload(e.to_string()))?;

        Ok(key)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let key = checked_key(key)?;

        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::Delete(e.to_string()))?;

        Ok(())
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let key = checked_key(key)?;
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::SignedUrl(e.to_string()))?;

        let presigned_req = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::SignedUrl(e.to_string()))?;

        Ok(presigned_req.uri().to_string())
    }
}

/// MockStorageService
///
/// In-memory `StorageService` for tests. Objects live in a map; `should_fail` makes
/// every operation return a simulated error.
#[derive(Default)]
pub struct MockStorageService {
    pub should_fail: bool,
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Seeds an object directly, bypassing `should_fail`.
    pub fn put_object(&self, key: &str, bytes: &[u8]) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(sanitize_key(key), bytes.to_vec());
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .map(|objects| objects.contains_key(&sanitize_key(key)))
            .unwrap_or(false)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> StorageResult<String> {
        if self.should_fail {
            return Err(StorageError::Upload("Mock Storage Error".to_string()));
        }
        if bytes.is_empty() {
            return Err(StorageError::Upload("empty file".to_string()));
        }
        let key = checked_key(key)?;
        self.objects
            .lock()
            .map_err(|e| StorageError::Upload(e.to_string()))?
            .insert(key.clone(), bytes);
        Ok(key)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.should_fail {
            return Err(StorageError::Delete("Mock Storage Error".to_string()));
        }
        let key = checked_key(key)?;
        self.objects
            .lock()
            .map_err(|e| StorageError::Delete(e.to_string()))?
            .remove(&key);
        Ok(())
    }

    async fn signed_url(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        if self.should_fail {
            return Err(StorageError::SignedUrl("Mock Storage Error".to_string()));
        }
        let key = checked_key(key)?;
        if !self.contains(&key) {
            return Err(StorageError::SignedUrl(format!("object not found: {key}")));
        }
        Ok(format!(
            "http://localhost:9000/mock-bucket/{}?token=fake&expires={}",
            key,
            expires_in.as_secs()
        ))
    }
}
