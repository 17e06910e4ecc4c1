//! S3-based ObjectStore implementation.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ObjectCannedAcl, StorageClass};
use std::path::Path;
use tracing::debug;

use super::{Error, ObjectStore, ObjectSummary, PutOptions, Result, normalize_etag};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for S3ObjectStore.
#[derive(Debug, Clone)]
pub struct S3ObjectStoreConfig {
    /// S3 bucket name.
    pub bucket: String,
    /// Optional custom endpoint URL (for LocalStack, MinIO, etc.).
    pub endpoint_url: Option<String>,
    /// Optional region override.
    pub region: Option<String>,
}

impl S3ObjectStoreConfig {
    /// Create a new S3ObjectStoreConfig with the given bucket name.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            endpoint_url: None,
            region: None,
        }
    }

    /// Set a custom endpoint URL (for LocalStack, MinIO, etc.).
    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    /// Set a region override.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

// =============================================================================
// S3ObjectStore
// =============================================================================

/// An ObjectStore backed by an S3 bucket.
///
/// Uses the standard AWS credential chain (env vars, ~/.aws, IAM roles, etc.).
pub struct S3ObjectStore {
    client: Client,
    config: S3ObjectStoreConfig,
}

impl S3ObjectStore {
    /// Create a new S3ObjectStore with the given configuration.
    pub async fn new(config: S3ObjectStoreConfig) -> Self {
        let mut aws_config_loader = aws_config::defaults(BehaviorVersion::latest());

        if let Some(ref region) = config.region {
            aws_config_loader =
                aws_config_loader.region(aws_sdk_s3::config::Region::new(region.clone()));
        }

        let aws_config = aws_config_loader.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

        if let Some(ref endpoint) = config.endpoint_url {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        let client = Client::from_conf(s3_config_builder.build());

        Self { client, config }
    }
}

fn sdk_error<E>(context: &str, err: E) -> Error
where
    E: std::error::Error,
{
    Error::Other(format!("{}: {}", context, DisplayErrorContext(err)))
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    async fn bucket_exists(&self) -> Result<bool> {
        match self
            .client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(sdk_error(
                        &format!("head bucket {} failed", self.config.bucket),
                        service_err,
                    ))
                }
            }
        }
    }

    async fn list_objects(
        &self,
        marker: Option<&str>,
        max_keys: u32,
    ) -> Result<Vec<ObjectSummary>> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.config.bucket)
            .max_keys(i32::try_from(max_keys).unwrap_or(i32::MAX))
            .set_start_after(marker.map(str::to_string))
            .send()
            .await
            .map_err(|e| sdk_error(&format!("list {} failed", self.config.bucket), e))?;

        let objects: Vec<ObjectSummary> = response
            .contents()
            .iter()
            .filter_map(|obj| {
                obj.key().map(|key| ObjectSummary {
                    key: key.to_string(),
                    etag: obj.e_tag().map(normalize_etag),
                })
            })
            .collect();

        debug!(
            "listed {} objects from s3://{} after {:?}",
            objects.len(),
            self.config.bucket,
            marker
        );
        Ok(objects)
    }

    async fn put_object(&self, key: &str, source: &Path, options: PutOptions) -> Result<()> {
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| Error::Other(format!("cannot read {}: {}", source.display(), e)))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .acl(ObjectCannedAcl::from(options.access.as_str()))
            .body(body);

        if options.reduced_redundancy {
            request = request.storage_class(StorageClass::ReducedRedundancy);
        }

        request
            .send()
            .await
            .map_err(|e| sdk_error(&format!("upload failed for {}", key), e))?;

        debug!("uploaded {} to s3://{}/{}", source.display(), self.config.bucket, key);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
