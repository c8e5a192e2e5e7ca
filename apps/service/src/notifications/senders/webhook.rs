use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, Method, header};
use serde::Deserialize;
use serde_json::{Value, json};

use super::SenderError;
use crate::notifications::event::TransitionEvent;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Generic JSON webhook channel.
pub struct WebhookSender {
    client: Client,
}

impl WebhookSender {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    pub async fn deliver(
        &self,
        config: &WebhookConfig,
        event: &TransitionEvent,
    ) -> Result<(), SenderError> {
        let method = Method::from_bytes(config.method.to_uppercase().as_bytes())
            .map_err(|_| {
                SenderError::InvalidConfiguration(format!(
                    "unsupported HTTP method: {}",
                    config.method
                ))
            })?;

        let mut header_map = header::HeaderMap::new();
        for (key, value) in &config.headers {
            let name = header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                SenderError::InvalidConfiguration(format!("invalid header name: {e}"))
            })?;
            let value = header::HeaderValue::from_str(value).map_err(|e| {
                SenderError::InvalidConfiguration(format!("invalid header value: {e}"))
            })?;
            header_map.insert(name, value);
        }

        let response = self
            .client
            .request(method, &config.url)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .headers(header_map)
            .json(&payload(event))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SenderError::SendFailed(format!(
                "webhook returned non-success status: {status}"
            )));
        }

        Ok(())
    }
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

/// The wire payload; shared by every webhook delivery.
pub(crate) fn payload(event: &TransitionEvent) -> Value {
    let incident = &event.incident;
    json!({
        "type": event.kind.as_str(),
        "monitor": {
            "id": event.monitor.id,
            "name": event.monitor.name,
            "url": event.monitor.url,
            "status": event.monitor_status(),
        },
        "timestamp": event.timestamp.to_rfc3339(),
        "incident": {
            "id": incident.id,
            "started_at": incident.started_at.to_rfc3339(),
            "duration": incident.duration_formatted(),
            "error_message": incident.error_message,
            "is_resolved": incident.resolved,
        },
    })
}
