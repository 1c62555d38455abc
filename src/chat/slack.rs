use std::time::Duration;

use async_trait::async_trait;
use color_eyre::eyre::{Context, Result};
use serde::Deserialize;

use super::{ChatApi, ChatError, PostParams, Posted};

const DEFAULT_BASE_URL: &str = "https://slack.com/api";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Slack Web API client (`chat.postMessage`)
pub struct SlackClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl SlackClient {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    /// Point the client at another API root (tests, proxies).
    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .wrap_err("failed to build Slack HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat.postMessage", self.base_url)
    }

    fn build_body(channel_id: &str, text: &str, params: &PostParams) -> serde_json::Value {
        let mut body = serde_json::json!({
            "channel": channel_id,
            "text": text,
            "as_user": params.as_user,
        });
        if !params.attachments.is_empty() {
            body["attachments"] = serde_json::json!(params.attachments);
        }
        body
    }

    fn parse_response(body: SlackResponse, channel_id: &str) -> Result<Posted, ChatError> {
        if !body.ok {
            let reason = body.error.unwrap_or_else(|| "unknown_error".to_string());
            return Err(ChatError::Api(reason));
        }
        let timestamp = body
            .ts
            .ok_or_else(|| ChatError::Api("response missing message timestamp".to_string()))?;
        Ok(Posted {
            channel_id: body.channel.unwrap_or_else(|| channel_id.to_string()),
            timestamp,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SlackResponse {
    ok: bool,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl ChatApi for SlackClient {
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        params: &PostParams,
    ) -> Result<Posted, ChatError> {
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.token)
            .json(&Self::build_body(channel_id, text, params))
            .send()
            .await
            .map_err(|e| ChatError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::Http(format!("HTTP {}: {}", status, body)));
        }

        let body: SlackResponse = resp
            .json()
            .await
            .map_err(|e| ChatError::Http(format!("invalid response body: {}", e)))?;

        Self::parse_response(body, channel_id)
    }
}
