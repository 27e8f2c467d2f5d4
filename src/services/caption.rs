use super::{CaptionProjectRequest, CaptionService};
use crate::config::ServiceEndpointConfig;
use crate::error::{OrchestratorError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::{debug, info};

const SERVICE: &str = "caption";
const TEMPLATE_NAME: &str = "Hormozi 2";
const BROLL_PERCENTAGE: u32 = 50;

/// Caption enhancement API client
#[derive(Debug, Clone)]
pub struct HttpCaptionService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCaptionService {
    pub fn new(config: &ServiceEndpointConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| OrchestratorError::ConfigurationError(format!("caption client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| OrchestratorError::upstream(SERVICE, "caption API key not configured"))
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(OrchestratorError::upstream(
        SERVICE,
        format!("HTTP {} - {}", status.as_u16(), body.chars().take(500).collect::<String>()),
    ))
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl CaptionService for HttpCaptionService {
    async fn create_project(&self, request: &CaptionProjectRequest) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/projects", self.base_url))
            .header("x-api-key", self.api_key()?)
            .json(&json!({
                "title": request.title,
                "language": request.language,
                "videoUrl": request.video_url,
                "templateName": TEMPLATE_NAME,
                "magicBrolls": true,
                "magicBrollsPercentage": BROLL_PERCENTAGE,
                "magicZooms": true,
                "webhookUrl": request.webhook_url,
            }))
            .send()
            .await?;

        let body: Value = ensure_success(response).await?.json().await?;
        let project_id = string_field(&body, &["id", "project_id", "projectId"])
            .ok_or_else(|| OrchestratorError::upstream(SERVICE, "project created without an id"))?;

        info!(project_id = %project_id, "Caption project created");
        Ok(project_id)
    }

    async fn request_export(&self, project_id: &str, webhook_url: &str) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/projects/{}/export", self.base_url, project_id))
            .header("x-api-key", self.api_key()?)
            .json(&json!({ "webhookUrl": webhook_url }))
            .send()
            .await?;
        ensure_success(response).await?;
        debug!(project_id, "Caption export requested");
        Ok(())
    }

    async fn fetch_media_url(&self, project_id: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(format!("{}/projects/{}", self.base_url, project_id))
            .header("x-api-key", self.api_key()?)
            .send()
            .await?;
        let body: Value = ensure_success(response).await?.json().await?;
        Ok(string_field(
            &body,
            &["downloadUrl", "directUrl", "media_url", "mediaUrl", "video_url", "videoUrl", "download_url"],
        ))
    }
}
