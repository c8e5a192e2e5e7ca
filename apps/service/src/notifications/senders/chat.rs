use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use super::SenderError;
use crate::notifications::event::{TransitionEvent, TransitionKind};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatWebhookConfig {
    pub webhook_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    30
}

/// Chat webhook channel posting a rich attachment card.
pub struct ChatWebhookSender {
    client: Client,
}

impl ChatWebhookSender {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    pub async fn deliver(
        &self,
        config: &ChatWebhookConfig,
        event: &TransitionEvent,
    ) -> Result<(), SenderError> {
        let response = self
            .client
            .post(&config.webhook_url)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .json(&payload(event))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SenderError::SendFailed(format!(
                "chat webhook returned non-success status: {status}"
            )));
        }

        Ok(())
    }
}

impl Default for ChatWebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn payload(event: &TransitionEvent) -> Value {
    let (color, text) = match event.kind {
        TransitionKind::IncidentStarted => (
            "danger",
            format!(
                "Service is down: {}",
                event.incident.error_message.as_deref().unwrap_or("Service unavailable")
            ),
        ),
        TransitionKind::IncidentResolved => (
            "good",
            format!("Service is back up! Downtime: {}", event.incident.duration_formatted()),
        ),
    };

    json!({
        "attachments": [{
            "color": color,
            "title": format!("Monitor Alert: {}", event.monitor.name),
            "text": text,
            "fields": [
                { "title": "Monitor", "value": event.monitor.name, "short": true },
                { "title": "URL", "value": event.monitor.url, "short": true },
                { "title": "Status", "value": event.monitor_status().to_uppercase(), "short": true },
                {
                    "title": "Time",
                    "value": event.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
                    "short": true
                },
            ],
            "footer": "vigil",
            "ts": event.timestamp.timestamp(),
        }]
    })
}
