use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::analysis::Backend;
use crate::ml::models::OutputActivation;
use crate::preprocess::{AlphabetPolicy, DEFAULT_MAX_ARRAY_BYTES, DEFAULT_MAX_LENGTH};
use crate::storage::StorageConfig;

/// Where the classifier weights come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSourceConfig {
    /// No classifier; the stand-in serves every prediction.
    #[default]
    None,
    /// First existing file among candidate paths.
    Local { paths: Vec<PathBuf> },
    /// A key in an S3, GCS or local object store.
    ObjectStore { storage: StorageConfig, key: String },
    /// An HTTP(S) download.
    Url {
        url: String,
        #[serde(default)]
        api_key: Option<String>,
    },
}

impl ModelSourceConfig {
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            ModelSourceConfig::ObjectStore { .. } | ModelSourceConfig::Url { .. }
        )
    }

    pub fn describe(&self) -> String {
        match self {
            ModelSourceConfig::None => "none".to_string(),
            ModelSourceConfig::Local { paths } => {
                let paths: Vec<_> = paths.iter().map(|p| p.display().to_string()).collect();
                format!("local:{}", paths.join(","))
            }
            ModelSourceConfig::ObjectStore { storage, key } => {
                format!("{}/{}", storage.describe(), key)
            }
            ModelSourceConfig::Url { url, .. } => url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub source: ModelSourceConfig,
    pub backend: Backend,
    pub activation: OutputActivation,
    /// Expected hex SHA-256 of the model bytes.
    pub sha256: Option<String>,
    pub load_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            source: ModelSourceConfig::None,
            backend: Backend::Candle,
            activation: OutputActivation::Auto,
            sha256: None,
            load_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub max_length: usize,
    pub alphabet: AlphabetPolicy,
    pub max_upload_bytes: usize,
    /// Cap on the decompressed size of an uploaded array.
    pub max_array_bytes: usize,
    /// Upload name suffixes routed to the preprocessed-array loader.
    pub array_extensions: Vec<String>,
    pub model: ModelConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            max_length: DEFAULT_MAX_LENGTH,
            alphabet: AlphabetPolicy::Fixed,
            max_upload_bytes: 10 * 1024 * 1024,
            max_array_bytes: DEFAULT_MAX_ARRAY_BYTES,
            array_extensions: vec![".npz".to_string()],
            model: ModelConfig::default(),
        }
    }
}

/// Parse a config document. The file extension picks the format; without
/// one, JSON is tried before YAML.
pub fn parse_config(bytes: &[u8], path_hint: Option<&Path>) -> Result<ServiceConfig> {
    let ext = path_hint
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    if ext == "yaml" || ext == "yml" {
        return serde_yaml::from_slice(bytes).context("invalid yaml config");
    }

    if ext == "json" {
        return serde_json::from_slice(bytes).context("invalid json config");
    }

    if let Ok(c) = serde_json::from_slice::<ServiceConfig>(bytes) {
        return Ok(c);
    }

    serde_yaml::from_slice(bytes).context("invalid config")
}

impl ServiceConfig {
    /// Defaults, then the optional file, then `DSPD_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let bytes = std::fs::read(p)
                    .with_context(|| format!("Failed to read config file {}", p.display()))?;
                parse_config(&bytes, Some(p))?
            }
            None => ServiceConfig::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(bind) = var("DSPD_BIND") {
            self.bind = bind.parse().context("invalid DSPD_BIND")?;
        }
        if let Some(len) = var("DSPD_MAX_LENGTH") {
            self.max_length = len.parse().context("invalid DSPD_MAX_LENGTH")?;
        }
        if let Some(bytes) = var("DSPD_MAX_ARRAY_BYTES") {
            self.max_array_bytes = bytes.parse().context("invalid DSPD_MAX_ARRAY_BYTES")?;
        }
        if let Some(alphabet) = var("DSPD_ALPHABET") {
            self.alphabet = match alphabet.to_ascii_lowercase().as_str() {
                "fixed" => AlphabetPolicy::Fixed,
                "observed" => AlphabetPolicy::Observed,
                other => anyhow::bail!("invalid DSPD_ALPHABET: {}", other),
            };
        }

        if let Some(paths) = var("DSPD_MODEL_PATH") {
            let paths = paths
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
            self.model.source = ModelSourceConfig::Local { paths };
        }
        if let Some(url) = var("DSPD_MODEL_URL") {
            self.model.source = ModelSourceConfig::Url {
                url,
                api_key: var("DSPD_MODEL_API_KEY"),
            };
        }
        if let Some(key) = var("DSPD_MODEL_KEY") {
            let mut storage = StorageConfig {
                bucket: var("DSPD_MODEL_BUCKET"),
                ..Default::default()
            };
            if let Some(backend) = var("DSPD_STORAGE_BACKEND") {
                storage.backend = backend.parse()?;
            }
            self.model.source = ModelSourceConfig::ObjectStore { storage, key };
        }
        if let Some(sha) = var("DSPD_MODEL_SHA256") {
            self.model.sha256 = Some(sha);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_length == 0 {
            anyhow::bail!("max_length must be greater than zero");
        }
        if self.max_array_bytes == 0 {
            anyhow::bail!("max_array_bytes must be greater than zero");
        }
        if self.array_extensions.is_empty() {
            anyhow::bail!("array_extensions must list at least one extension");
        }
        if let ModelSourceConfig::ObjectStore { key, .. } = &self.model.source {
            if key.trim().is_empty() {
                anyhow::bail!("object store model source needs a key");
            }
        }
        Ok(())
    }
}
