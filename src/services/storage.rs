use super::AssetStorage;
use crate::config::StorageConfig;
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use tracing::info;

const SERVICE: &str = "storage";

/// Copies remote assets into an S3-compatible bucket via plain HTTP PUT
#[derive(Debug, Clone)]
pub struct HttpAssetStorage {
    client: Client,
    upload_url: String,
    public_base_url: String,
    bearer_token: Option<String>,
}

impl HttpAssetStorage {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| OrchestratorError::ConfigurationError(format!("storage client: {e}")))?;
        Ok(Self {
            client,
            upload_url: config.upload_url.trim_end_matches('/').to_string(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
        })
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.public_base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl AssetStorage for HttpAssetStorage {
    async fn upload_from_url(&self, source_url: &str, path: &str) -> Result<String> {
        let download = self.client.get(source_url).send().await?;
        let status = download.status();
        if !status.is_success() {
            return Err(OrchestratorError::upstream(
                SERVICE,
                format!("download of source asset failed: HTTP {}", status.as_u16()),
            ));
        }
        let bytes = download.bytes().await?;
        if bytes.is_empty() {
            return Err(OrchestratorError::upstream(SERVICE, "source asset is empty"));
        }
        let size = bytes.len();

        let mut upload = self
            .client
            .put(format!("{}/{}", self.upload_url, path.trim_start_matches('/')))
            .header(CONTENT_TYPE, "video/mp4")
            .body(bytes);
        if let Some(token) = self.bearer_token.as_deref() {
            upload = upload.bearer_auth(token);
        }

        let response = upload.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::upstream(
                SERVICE,
                format!("upload to {path} failed: HTTP {}", status.as_u16()),
            ));
        }

        let public_url = self.public_url(path);
        info!(path, size_bytes = size, public_url = %public_url, "Asset uploaded to durable storage");
        Ok(public_url)
    }
}
