use crate::config::Config;
use crate::errors::AppError;
use crate::handlers::AppState;
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Keys that n8n flows commonly use for the reply text, in lookup order.
const REPLY_KEYS: [&str; 4] = ["output", "reply", "message", "text"];

/// Body of `POST /api/assistant`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AssistantRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Normalized assistant reply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssistantResponse {
    pub reply: String,
}

/// Forwards assistant messages to an n8n webhook.
pub struct AssistantProxy {
    client: reqwest::Client,
    webhook_url: String,
}

impl AssistantProxy {
    pub fn new(webhook_url: String, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::InternalError(format!("Failed to create n8n client: {}", e))
            })?;

        Ok(Self {
            client,
            webhook_url,
        })
    }

    /// Builds the proxy when `N8N_WEBHOOK_URL` is configured.
    pub fn from_config(config: &Config) -> Result<Option<Self>, AppError> {
        config
            .n8n_webhook_url
            .clone()
            .map(|url| Self::new(url, Duration::from_secs(config.n8n_timeout_secs)))
            .transpose()
    }

    /// Sends one message and returns the reshaped reply.
    ///
    /// # Errors
    ///
    /// * `InvalidRequest` - blank message.
    /// * `UpstreamTimeout` - the webhook did not answer in time.
    /// * `ExternalApiError` - non-2xx status or a body without reply text.
    pub async fn forward(&self, request: &AssistantRequest) -> Result<AssistantResponse, AppError> {
        let message = request
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| AppError::InvalidRequest("message is required".to_string()))?;

        let body = json!({
            "message": message,
            "sessionId": request.session_id,
            "userId": request.user_id,
        });

        tracing::info!(
            "Forwarding assistant message ({} chars) to n8n",
            message.chars().count()
        );

        let response = self
            .client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::UpstreamTimeout(format!("n8n webhook timed out: {}", e))
                } else {
                    AppError::ExternalApiError(format!("n8n request failed: {}", e))
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(AppError::from)?;

        if !status.is_success() {
            return Err(AppError::ExternalApiError(format!(
                "n8n returned {}: {}",
                status,
                text.chars().take(200).collect::<String>()
            )));
        }

        reply_from_body(&text).map(|reply| AssistantResponse { reply }).ok_or_else(|| {
            AppError::ExternalApiError("n8n response did not contain a reply".to_string())
        })
    }
}

/// Reply text from a raw webhook body.
///
/// JSON bodies go through `extract_reply`. Plain text, and bare JSON numbers or booleans
/// (a text reply that happens to parse as JSON), are used as-is after trimming.
pub fn reply_from_body(body: &str) -> Option<String> {
    let plain = || Some(body.trim().to_string()).filter(|t| !t.is_empty());
    match serde_json::from_str::<Value>(body) {
        Ok(value @ (Value::Number(_) | Value::Bool(_))) => extract_reply(&value).or_else(plain),
        Ok(value) => extract_reply(&value),
        Err(_) => plain(),
    }
}

/// Pulls the reply text out of the shapes n8n flows return.
///
/// Accepts an object with one of `output`, `reply`, `message`, `text`, an array whose first
/// element is such an object (or a string), or a bare string.
pub fn extract_reply(value: &Value) -> Option<String> {
    let found = match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.first().and_then(extract_reply),
        Value::Object(map) => REPLY_KEYS.iter().find_map(|key| match map.get(*key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(nested @ Value::Object(_)) => extract_reply(nested),
            _ => None,
        }),
        _ => None,
    };
    found.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// POST /api/assistant
pub async fn assistant_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AssistantRequest>, JsonRejection>,
) -> Result<Json<AssistantResponse>, AppError> {
    let Json(request) =
        payload.map_err(|e| AppError::InvalidRequest(format!("Invalid JSON body: {}", e)))?;

    let proxy = state.assistant.as_ref().ok_or_else(|| {
        AppError::ServiceUnavailable("N8N_WEBHOOK_URL is not configured".to_string())
    })?;

    let response = proxy.forward(&request).await?;
    Ok(Json(response))
}
