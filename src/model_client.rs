use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::debug;

/// Downloads model artifacts over HTTP(S), e.g. a public bucket URL or an
/// artifact server that expects an `x-api-key` header.
#[derive(Clone)]
pub struct ModelApiClient {
    pub url: String,
    pub api_key: Option<String>,
}

impl ModelApiClient {
    pub fn new(url: String, api_key: Option<String>) -> Self {
        Self { url, api_key }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            headers.insert(
                "x-api-key",
                HeaderValue::from_str(key).context("invalid api key")?,
            );
        }
        Ok(headers)
    }

    pub async fn fetch_artifact(&self) -> Result<Vec<u8>> {
        let resp = reqwest::Client::new()
            .get(&self.url)
            .headers(self.headers()?)
            .send()
            .await
            .context("model request failed")?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("model request failed with status {}", status);
        }

        let body = resp.bytes().await.context("failed to read model body")?;
        debug!("Downloaded {} bytes from {}", body.len(), self.url);
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers() {
        let client = ModelApiClient::new("http://localhost/model".to_string(), None);
        assert!(client.headers().unwrap().is_empty());

        let client = ModelApiClient::new("http://localhost/model".to_string(), Some(" key ".to_string()));
        let headers = client.headers().unwrap();
        assert_eq!(headers.get("x-api-key").unwrap(), "key");

        let client = ModelApiClient::new("http://localhost/model".to_string(), Some("bad\nkey".to_string()));
        assert!(client.headers().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_error() {
        let client = ModelApiClient::new("http://127.0.0.1:1/model.safetensors".to_string(), None);
        assert!(client.fetch_artifact().await.is_err());
    }
}
