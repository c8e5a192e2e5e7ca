use thiserror::Error;

pub mod chat;
pub mod email;
pub mod webhook;

/// Why a channel delivery failed. Failures never propagate past the
/// dispatcher; this type exists so each channel's result can be logged
/// with a useful cause.
#[derive(Error, Debug)]
pub enum SenderError {
    #[error("failed to send notification: {0}")]
    SendFailed(String),
    #[error("invalid configuration for channel: {0}")]
    InvalidConfiguration(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}
