//! Object-store access for the raw CSV exports. S3-compatible backends (MinIO in
//! production) and an in-memory store share the [`BucketStore`] trait.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::error::SdkError;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub force_path_style: bool,
    pub operation_timeout: Option<Duration>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            operation_timeout: Some(Duration::from_secs(60)),
        }
    }
}

#[derive(Debug, Error)]
pub enum BucketError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("sdk error: {0}")]
    Sdk(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl BucketError {
    fn from_sdk(err: impl fmt::Display) -> Self {
        Self::Sdk(err.to_string())
    }

    fn from_service_message(message: String, target: &str) -> Self {
        if message.contains("NoSuchBucket") || message.contains("NoSuchKey") {
            BucketError::NotFound(target.to_string())
        } else {
            BucketError::from_sdk(message)
        }
    }
}

#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Lists every object key in `bucket`, in the order the backend returns them.
    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>, BucketError>;
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, BucketError>;
    async fn put_object(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<(), BucketError>;
}

/// Downloads every object in `bucket`, keyed by object name.
///
/// An existing bucket with no objects yields an empty map; deciding whether that is an
/// error belongs to the caller.
pub async fn fetch_all(
    store: &dyn BucketStore,
    bucket: &str,
) -> Result<BTreeMap<String, Bytes>, BucketError> {
    let keys = store.list_objects(bucket).await?;
    let mut objects = BTreeMap::new();
    for key in keys {
        let bytes = store.get_object(bucket, &key).await?;
        debug!(bucket, key = %key, size = bytes.len(), "fetched object");
        objects.insert(key, bytes);
    }
    Ok(objects)
}

#[derive(Clone)]
pub struct S3BucketStore {
    client: Client,
}

impl S3BucketStore {
    pub async fn new(config: S3Config) -> Result<Self, BucketError> {
        if config.region.is_empty() {
            return Err(BucketError::Configuration("region cannot be empty".into()));
        }

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = Credentials::new(access_key, secret_key, None, None, "static");
            loader = loader.credentials_provider(SharedCredentialsProvider::new(credentials));
        }

        let shared_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared_config);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        if let Some(timeout) = config.operation_timeout {
            builder = builder.timeout_config(
                TimeoutConfig::builder().operation_timeout(timeout).build(),
            );
        }

        let client = Client::from_conf(builder.build());
        Ok(Self { client })
    }
}

#[async_trait]
impl BucketStore for S3BucketStore {
    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>, BucketError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|err| match err {
                    SdkError::ServiceError(service_err) => {
                        BucketError::from_service_message(service_err.err().to_string(), bucket)
                    }
                    other => BucketError::from_sdk(other),
                })?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_string());
                }
            }

            match (output.is_truncated(), output.next_continuation_token()) {
                (Some(true), Some(token)) => continuation = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, BucketError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| match err {
                SdkError::ServiceError(service_err) => {
                    BucketError::from_service_message(service_err.err().to_string(), key)
                }
                other => BucketError::from_sdk(other),
            })?;

        let data = output.body.collect().await.map_err(BucketError::from_sdk)?;
        Ok(data.into_bytes())
    }

    async fn put_object(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<(), BucketError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(bytes.into())
            .content_type("text/csv")
            .send()
            .await
            .map_err(BucketError::from_sdk)?;
        Ok(())
    }
}

/// Bucket store held entirely in process memory. Buckets must be created before use,
/// matching the behaviour of a real backend.
#[derive(Debug, Default)]
pub struct MemoryBucketStore {
    buckets: Mutex<HashMap<String, BTreeMap<String, Bytes>>>,
}

impl MemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_bucket(&self, bucket: &str) {
        let mut buckets = self.buckets.lock().unwrap_or_else(|err| err.into_inner());
        buckets.entry(bucket.to_string()).or_default();
    }
}

#[async_trait]
impl BucketStore for MemoryBucketStore {
    async fn list_objects(&self, bucket: &str) -> Result<Vec<String>, BucketError> {
        let buckets = self.buckets.lock().unwrap_or_else(|err| err.into_inner());
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| BucketError::NotFound(bucket.to_string()))?;
        Ok(objects.keys().cloned().collect())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes, BucketError> {
        let buckets = self.buckets.lock().unwrap_or_else(|err| err.into_inner());
        buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| BucketError::NotFound(format!("{bucket}/{key}")))
    }

    async fn put_object(&self, bucket: &str, key: &str, bytes: Bytes) -> Result<(), BucketError> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|err| err.into_inner());
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| BucketError::NotFound(bucket.to_string()))?;
        objects.insert(key.to_string(), bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_all_returns_every_object_by_name() {
        let store = MemoryBucketStore::new();
        store.create_bucket("gameweeks");
        store
            .put_object("gameweeks", "gw_02.csv", Bytes::from_static(b"b"))
            .await
            .unwrap();
        store
            .put_object("gameweeks", "gw_01.csv", Bytes::from_static(b"a"))
            .await
            .unwrap();

        let objects = fetch_all(&store, "gameweeks").await.unwrap();
        let names: Vec<&str> = objects.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["gw_01.csv", "gw_02.csv"]);
        assert_eq!(objects["gw_01.csv"], Bytes::from_static(b"a"));
    }

    #[tokio::test]
    async fn fetch_all_on_empty_bucket_is_empty() {
        let store = MemoryBucketStore::new();
        store.create_bucket("fixtures");
        let objects = fetch_all(&store, "fixtures").await.unwrap();
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn missing_bucket_is_not_found() {
        let store = MemoryBucketStore::new();
        let err = fetch_all(&store, "nope").await.unwrap_err();
        assert!(matches!(err, BucketError::NotFound(name) if name == "nope"));
    }
}
