use anyhow::{Context, Result};
use object_store::{aws::AmazonS3Builder, gcp::GoogleCloudStorageBuilder, ObjectStore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    S3,
    Gcs,
    #[default]
    Local,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "s3" | "oci" | "aws" => Ok(StorageBackend::S3),
            "gcs" | "google" => Ok(StorageBackend::Gcs),
            "local" | "file" => Ok(StorageBackend::Local),
            _ => anyhow::bail!("Unknown storage backend: {}", s),
        }
    }
}

/// Bucket or directory that holds model artifacts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Root directory for the local backend.
    pub path: Option<String>,
}

impl StorageConfig {
    pub fn describe(&self) -> String {
        match self.backend {
            StorageBackend::S3 => format!("s3://{}", self.bucket.as_deref().unwrap_or("")),
            StorageBackend::Gcs => format!("gs://{}", self.bucket.as_deref().unwrap_or("")),
            StorageBackend::Local => format!("file://{}", self.path.as_deref().unwrap_or(".")),
        }
    }
}

pub fn create_object_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.backend {
        StorageBackend::S3 => {
            let bucket = config.bucket.as_deref().context("Bucket name required for S3/OCI")?;
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

            if let Some(region) = &config.region {
                builder = builder.with_region(region);
            }

            if let Some(endpoint) = &config.endpoint {
                builder = builder.with_endpoint(endpoint);
                if endpoint.starts_with("http://") {
                    builder = builder.with_allow_http(true);
                }
            }

            if let Some(key) = &config.access_key {
                builder = builder.with_access_key_id(key);
            }

            if let Some(secret) = &config.secret_key {
                builder = builder.with_secret_access_key(secret);
            }

            let store = builder.build().context("Failed to build S3 object store")?;
            Ok(Arc::new(store))
        }
        StorageBackend::Gcs => {
            let bucket = config.bucket.as_deref().context("Bucket name required for GCS")?;
            // Credentials come from GOOGLE_APPLICATION_CREDENTIALS / GOOGLE_SERVICE_ACCOUNT.
            let store = GoogleCloudStorageBuilder::from_env()
                .with_bucket_name(bucket)
                .build()
                .context("Failed to build GCS object store")?;
            Ok(Arc::new(store))
        }
        StorageBackend::Local => {
            let root = Path::new(config.path.as_deref().unwrap_or("."));
            let store = object_store::local::LocalFileSystem::new_with_prefix(root)
                .with_context(|| format!("Failed to open model directory {}", root.display()))?;
            Ok(Arc::new(store))
        }
    }
}
