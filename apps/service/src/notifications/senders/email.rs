use chrono::{DateTime, Utc};
use lettre::message::{Mailbox, SinglePart, header::ContentType};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;

use super::SenderError;
use crate::notifications::event::{TransitionEvent, TransitionKind};

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_server")]
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_from_email")]
    pub from_email: String,
    pub to_email: String,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
}

fn default_smtp_server() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_email() -> String {
    "monitor@example.com".to_string()
}

fn default_use_tls() -> bool {
    true
}

/// SMTP email channel.
pub struct EmailSender;

impl EmailSender {
    pub async fn deliver(
        &self,
        config: &EmailConfig,
        event: &TransitionEvent,
    ) -> Result<(), SenderError> {
        let from: Mailbox = config
            .from_email
            .parse()
            .map_err(|e| SenderError::InvalidConfiguration(format!("invalid from address: {e}")))?;
        let to: Mailbox = config
            .to_email
            .parse()
            .map_err(|e| SenderError::InvalidConfiguration(format!("invalid to address: {e}")))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject(event))
            .singlepart(
                SinglePart::builder().header(ContentType::TEXT_HTML).body(html_body(event)),
            )
            .map_err(|e| SenderError::SendFailed(format!("failed to build message: {e}")))?;

        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
                .map_err(|e| SenderError::SendFailed(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_server)
        };
        builder = builder.port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        builder
            .build()
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| SenderError::SendFailed(e.to_string()))
    }
}

pub(crate) fn subject(event: &TransitionEvent) -> String {
    match event.kind {
        TransitionKind::IncidentStarted => format!("ALERT: {} is DOWN", event.monitor.name),
        TransitionKind::IncidentResolved => format!("RESOLVED: {} is back UP", event.monitor.name),
    }
}

fn format_utc(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

pub(crate) fn html_body(event: &TransitionEvent) -> String {
    let header_color = match event.kind {
        TransitionKind::IncidentStarted => "red",
        TransitionKind::IncidentResolved => "green",
    };

    let mut rows = format!(
        "<tr><th>Monitor</th><td>{}</td></tr>\
         <tr><th>URL</th><td>{}</td></tr>\
         <tr><th>Type</th><td>{}</td></tr>\
         <tr><th>Status</th><td>{}</td></tr>\
         <tr><th>Timestamp</th><td>{}</td></tr>",
        event.monitor.name,
        event.monitor.url,
        event.monitor.monitor_type.to_uppercase(),
        event.monitor_status().to_uppercase(),
        format_utc(event.timestamp),
    );

    let incident = &event.incident;
    rows.push_str(&format!(
        "<tr><th>Started At</th><td>{}</td></tr>",
        format_utc(incident.started_at)
    ));
    match incident.ended_at {
        Some(ended) => {
            rows.push_str(&format!("<tr><th>Ended At</th><td>{}</td></tr>", format_utc(ended)));
            rows.push_str(&format!(
                "<tr><th>Duration</th><td>{}</td></tr>",
                incident.duration_formatted()
            ));
        }
        None => {
            rows.push_str(&format!(
                "<tr><th>Duration</th><td>{} (ongoing)</td></tr>",
                incident.duration_formatted()
            ));
        }
    }
    if let Some(error) = &incident.error_message {
        rows.push_str(&format!("<tr><th>Error</th><td>{error}</td></tr>"));
    }

    format!(
        "<!DOCTYPE html>\
         <html><body style=\"font-family: Arial, sans-serif; color: #333;\">\
         <div style=\"max-width: 600px; margin: 0 auto;\">\
         <div style=\"background: {header_color}; color: white; padding: 15px;\">\
         <h2>{}</h2></div>\
         <table style=\"width: 100%; border-collapse: collapse;\">{rows}</table>\
         <p style=\"font-size: 12px; color: #666;\">This alert was sent by vigil</p>\
         </div></body></html>",
        subject(event),
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::database::models::{Incident, Monitor};

    fn event(kind: TransitionKind) -> TransitionEvent {
        let monitor = Monitor::new("api", "https://example.com/health", "https");
        let started = Utc::now() - chrono::Duration::seconds(90);
        let incident = Incident {
            id: Some(3),
            monitor_uuid: monitor.uuid,
            started_at: started,
            ended_at: matches!(kind, TransitionKind::IncidentResolved)
                .then(|| started + chrono::Duration::seconds(90)),
            duration_seconds: matches!(kind, TransitionKind::IncidentResolved).then_some(90),
            error_message: Some("expected status 200, got 500".to_string()),
            resolved: matches!(kind, TransitionKind::IncidentResolved),
        };
        TransitionEvent { kind, monitor, incident, timestamp: Utc::now() }
    }

    #[test]
    fn subjects_follow_transition_kind() {
        assert_eq!(subject(&event(TransitionKind::IncidentStarted)), "ALERT: api is DOWN");
        assert_eq!(subject(&event(TransitionKind::IncidentResolved)), "RESOLVED: api is back UP");
    }

    #[test]
    fn body_includes_monitor_and_incident_details() {
        let body = html_body(&event(TransitionKind::IncidentStarted));
        assert!(body.contains("https://example.com/health"));
        assert!(body.contains("HTTPS"));
        assert!(body.contains("DOWN"));
        assert!(body.contains("expected status 200, got 500"));
        assert!(body.contains("(ongoing)"));
    }

    #[test]
    fn resolved_body_reports_duration() {
        let body = html_body(&event(TransitionKind::IncidentResolved));
        assert!(body.contains("1m 30s"));
        assert!(body.contains("Ended At"));
    }

    #[test]
    fn config_defaults_apply() {
        let config: EmailConfig =
            serde_json::from_str(r#"{"to_email": "ops@example.com"}"#).unwrap();
        assert_eq!(config.smtp_server, "localhost");
        assert_eq!(config.smtp_port, 587);
        assert!(config.use_tls);
        assert_eq!(config.from_email, "monitor@example.com");
    }

    #[test]
    fn config_requires_recipient() {
        assert!(serde_json::from_str::<EmailConfig>("{}").is_err());
    }
}
