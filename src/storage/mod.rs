//! Fetching model bytes from wherever the deployment keeps them.

pub mod object_store;

pub use self::object_store::{create_object_store, StorageBackend, StorageConfig};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{ModelConfig, ModelSourceConfig};
use crate::model_client::ModelApiClient;

/// Read model bytes from the configured source, once.
/// Returns `None` when no source is configured.
pub async fn fetch_model_bytes(source: &ModelSourceConfig) -> Result<Option<Vec<u8>>> {
    match source {
        ModelSourceConfig::None => Ok(None),
        ModelSourceConfig::Local { paths } => {
            let Some(path) = paths.iter().find(|p| p.exists()) else {
                anyhow::bail!("No model file found; searched {:?}", paths);
            };
            info!("Loading model from {}", path.display());
            let bytes = tokio::fs::read(path)
                .await
                .with_context(|| format!("Failed to read model file {}", path.display()))?;
            Ok(Some(bytes))
        }
        ModelSourceConfig::ObjectStore { storage, key } => {
            info!("Downloading model {} from {}", key, storage.describe());
            let store = create_object_store(storage)?;
            let location = ::object_store::path::Path::from(key.as_str());
            let bytes = store
                .get(&location)
                .await
                .with_context(|| format!("Failed to fetch {} from object store", key))?
                .bytes()
                .await
                .context("Failed to read model bytes from object store")?;
            Ok(Some(bytes.to_vec()))
        }
        ModelSourceConfig::Url { url, api_key } => {
            info!("Downloading model from {}", url);
            let client = ModelApiClient::new(url.clone(), api_key.clone());
            Ok(Some(client.fetch_artifact().await?))
        }
    }
}

pub fn verify_sha256(bytes: &[u8], expected: &str) -> Result<()> {
    let actual = format!("{:x}", Sha256::digest(bytes));
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        anyhow::bail!("model checksum mismatch: expected {}, got {}", expected, actual);
    }
    Ok(())
}

/// Fetch and verify model bytes, retrying remote sources.
pub async fn load_model_bytes(config: &ModelConfig) -> Result<Option<Vec<u8>>> {
    let attempts = if config.source.is_remote() {
        config.load_retries.max(1)
    } else {
        1
    };

    let mut last_err = None;
    for attempt in 1..=attempts {
        match fetch_model_bytes(&config.source).await {
            Ok(None) => return Ok(None),
            Ok(Some(bytes)) => {
                if let Some(expected) = &config.sha256 {
                    verify_sha256(&bytes, expected)?;
                }
                info!("Fetched model ({} bytes)", bytes.len());
                return Ok(Some(bytes));
            }
            Err(e) => {
                warn!("Model fetch attempt {}/{} failed: {:#}", attempt, attempts, e);
                last_err = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(Duration::from_millis(config.retry_delay_ms)).await;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("model fetch was not attempted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_no_source() {
        let config = ModelConfig::default();
        assert!(load_model_bytes(&config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_first_existing_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("second.safetensors");
        std::fs::write(&present, b"weights").unwrap();

        let source = ModelSourceConfig::Local {
            paths: vec![dir.path().join("missing.safetensors"), present],
        };
        let bytes = fetch_model_bytes(&source).await.unwrap().unwrap();
        assert_eq!(bytes, b"weights");
    }

    #[tokio::test]
    async fn test_local_missing_is_error() {
        let source = ModelSourceConfig::Local {
            paths: vec![PathBuf::from("/nonexistent/model.safetensors")],
        };
        assert!(fetch_model_bytes(&source).await.is_err());
    }

    #[tokio::test]
    async fn test_object_store_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("models")).unwrap();
        std::fs::write(dir.path().join("models/model.safetensors"), b"remote weights").unwrap();

        let config = ModelConfig {
            source: ModelSourceConfig::ObjectStore {
                storage: StorageConfig {
                    backend: StorageBackend::Local,
                    path: Some(dir.path().to_string_lossy().into_owned()),
                    ..Default::default()
                },
                key: "models/model.safetensors".to_string(),
            },
            sha256: Some(format!("{:x}", Sha256::digest(b"remote weights"))),
            load_retries: 1,
            ..Default::default()
        };
        let bytes = load_model_bytes(&config).await.unwrap().unwrap();
        assert_eq!(bytes, b"remote weights");
    }

    #[test]
    fn test_checksum_mismatch() {
        let digest = format!("{:x}", Sha256::digest(b"abc"));
        assert!(verify_sha256(b"abc", &digest).is_ok());
        assert!(verify_sha256(b"abc", &digest.to_uppercase()).is_ok());
        assert!(verify_sha256(b"abd", &digest).is_err());
    }
}
