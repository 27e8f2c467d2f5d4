use super::{PlatformOutcome, ScheduleRequest, ScheduleResponse, SchedulingService};
use crate::config::ServiceEndpointConfig;
use crate::error::{OrchestratorError, Result};
use crate::scheduling::Platform;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{info, warn};

const SERVICE: &str = "scheduling";

/// Multi-platform scheduling API client
#[derive(Debug, Clone)]
pub struct HttpSchedulingService {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpSchedulingService {
    pub fn new(config: &ServiceEndpointConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| OrchestratorError::ConfigurationError(format!("scheduling client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

fn request_body(request: &ScheduleRequest) -> Value {
    let platforms: Vec<Value> = request
        .slots
        .iter()
        .map(|slot| {
            json!({
                "platform": slot.platform,
                "scheduledFor": slot.scheduled_for.to_rfc3339(),
            })
        })
        .collect();

    json!({
        "profile": request.tenant,
        "title": request.title,
        "content": request.caption,
        "timezone": request.timezone,
        "mediaItems": [{ "type": "video", "url": request.asset_url }],
        "platforms": platforms,
    })
}

/// Accepts `{ platforms: [...] }`, `{ post: { platforms: [...] } }` or a bare array
fn parse_outcomes(body: &Value) -> Vec<PlatformOutcome> {
    let entries = body
        .get("platforms")
        .or_else(|| body.get("post").and_then(|p| p.get("platforms")))
        .or_else(|| body.get("results"))
        .unwrap_or(body);

    entries
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let platform: Platform = item.get("platform")?.as_str()?.parse().ok()?;
                    let post_id = ["postId", "platformPostId", "_id", "id"]
                        .iter()
                        .find_map(|k| item.get(*k).and_then(Value::as_str))
                        .map(str::to_string);
                    let error = item
                        .get("error")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    Some(PlatformOutcome {
                        platform,
                        post_id: if error.is_some() { None } else { post_id },
                        error,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SchedulingService for HttpSchedulingService {
    async fn schedule(&self, request: &ScheduleRequest) -> Result<ScheduleResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| OrchestratorError::upstream(SERVICE, "scheduling API key not configured"))?;

        let response = self
            .client
            .post(format!("{}/posts", self.base_url))
            .bearer_auth(api_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .json(&request_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::upstream(
                SERVICE,
                format!("HTTP {} - {}", status.as_u16(), body.chars().take(500).collect::<String>()),
            ));
        }

        let body: Value = response.json().await?;
        let result = ScheduleResponse {
            outcomes: parse_outcomes(&body),
        };

        for error in result.errors() {
            warn!(tenant = %request.tenant, error = %error, "Platform rejected scheduled post");
        }
        info!(
            tenant = %request.tenant,
            scheduled = result.succeeded(),
            requested = request.slots.len(),
            "Scheduling request accepted"
        );
        Ok(result)
    }
}
