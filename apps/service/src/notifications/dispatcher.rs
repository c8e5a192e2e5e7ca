use std::sync::Arc;

use tracing::{debug, error, info};

use super::event::TransitionEvent;
use super::senders::SenderError;
use super::senders::chat::{ChatWebhookConfig, ChatWebhookSender};
use super::senders::email::{EmailConfig, EmailSender};
use super::senders::webhook::{WebhookConfig, WebhookSender};
use crate::database::Database;
use crate::database::models::NotificationChannel;

/// The closed set of channel adapters, each a parsed configuration for
/// one delivery mechanism.
#[derive(Debug)]
pub enum ChannelAdapter {
    Email(EmailConfig),
    Webhook(WebhookConfig),
    ChatWebhook(ChatWebhookConfig),
}

impl ChannelAdapter {
    /// Parse a stored channel row into its adapter. Unknown types and
    /// malformed config blobs are configuration errors.
    pub fn from_channel(channel: &NotificationChannel) -> Result<Self, SenderError> {
        let bad_config = |e: serde_json::Error| {
            SenderError::InvalidConfiguration(format!(
                "channel {} has malformed config: {e}",
                channel.name
            ))
        };

        match channel.channel_type.as_str() {
            "email" => Ok(Self::Email(serde_json::from_str(&channel.config).map_err(bad_config)?)),
            "webhook" => {
                Ok(Self::Webhook(serde_json::from_str(&channel.config).map_err(bad_config)?))
            }
            "chat-webhook" => {
                Ok(Self::ChatWebhook(serde_json::from_str(&channel.config).map_err(bad_config)?))
            }
            other => {
                Err(SenderError::InvalidConfiguration(format!("unsupported channel type: {other}")))
            }
        }
    }
}

/// Notification dispatcher - fans transition events out to every enabled
/// channel. One channel's failure never blocks delivery to the others,
/// and nothing here propagates an error to the caller.
pub struct NotificationDispatcher {
    database: Arc<dyn Database>,
    email: EmailSender,
    webhook: WebhookSender,
    chat: ChatWebhookSender,
}

impl NotificationDispatcher {
    pub fn new(database: Arc<dyn Database>) -> Self {
        Self {
            database,
            email: EmailSender,
            webhook: WebhookSender::new(),
            chat: ChatWebhookSender::new(),
        }
    }

    pub async fn dispatch(&self, event: &TransitionEvent) {
        let channels = match self.database.get_enabled_channels().await {
            Ok(channels) => channels,
            Err(err) => {
                error!("Failed to load notification channels: {err:#}");
                return;
            }
        };

        if channels.is_empty() {
            debug!("No enabled notification channels configured");
            return;
        }

        for channel in &channels {
            match self.deliver(channel, event).await {
                Ok(()) => {
                    info!(
                        "Notification sent via {} channel {} ({})",
                        channel.channel_type, channel.name, event.kind
                    );
                }
                Err(err) => {
                    error!(
                        "Failed to send notification via {} channel {}: {err}",
                        channel.channel_type, channel.name
                    );
                }
            }
        }
    }

    /// Deliver one event through one channel's adapter.
    async fn deliver(
        &self,
        channel: &NotificationChannel,
        event: &TransitionEvent,
    ) -> Result<(), SenderError> {
        match ChannelAdapter::from_channel(channel)? {
            ChannelAdapter::Email(config) => self.email.deliver(&config, event).await,
            ChannelAdapter::Webhook(config) => self.webhook.deliver(&config, event).await,
            ChannelAdapter::ChatWebhook(config) => self.chat.deliver(&config, event).await,
        }
    }
}
