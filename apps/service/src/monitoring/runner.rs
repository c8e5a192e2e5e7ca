use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::probe::{HttpProber, PingProber, PortProber};
use super::types::{MonitorType, ProbeOutcome};
use crate::database::models::{Check, Monitor};

/// One HTTP attempt. `Err` means the transport failed (connect, TLS,
/// timeout, body read); a completed exchange is always `Ok`, even when the
/// response mismatched expectations.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn attempt(&self, monitor: &Monitor) -> Result<ProbeOutcome>;
}

#[async_trait]
impl HttpTransport for HttpProber {
    async fn attempt(&self, monitor: &Monitor) -> Result<ProbeOutcome> {
        self.request(monitor).await.map_err(Into::into)
    }
}

/// Check runner - wraps the probers with timeout and retry policy and
/// produces exactly one durable check per invocation.
pub struct CheckRunner {
    http: Arc<dyn HttpTransport>,
    port: PortProber,
    ping: PingProber,
    retry_backoff: Duration,
}

impl CheckRunner {
    pub fn new() -> Result<Self> {
        Ok(Self {
            http: Arc::new(HttpProber::new()?),
            port: PortProber,
            ping: PingProber,
            retry_backoff: Duration::from_secs(1),
        })
    }

    #[cfg(test)]
    fn with_transport(http: Arc<dyn HttpTransport>, retry_backoff: Duration) -> Self {
        Self { http, port: PortProber, ping: PingProber, retry_backoff }
    }

    /// Run the appropriate probe for the monitor. The check is timestamped
    /// at invocation start.
    pub async fn run(&self, monitor: &Monitor) -> Check {
        let checked_at = Utc::now();

        let outcome = match monitor.kind() {
            Some(MonitorType::Http | MonitorType::Https) => self.run_http(monitor).await,
            Some(MonitorType::Port) => self.port.probe(monitor).await,
            Some(MonitorType::Ping) => self.ping.probe(monitor).await,
            None => {
                ProbeOutcome::failure(format!("unsupported monitor type: {}", monitor.monitor_type))
            }
        };

        Check::from_outcome(monitor.uuid, outcome, checked_at)
    }

    /// HTTP(S) retry loop. Only transport failures are retried; a
    /// completed exchange ends the loop immediately, so status or text
    /// mismatches count as the attempt's outcome and are never retried.
    /// Ping and port probes are single-attempt by design of the callers.
    async fn run_http(&self, monitor: &Monitor) -> ProbeOutcome {
        let attempts = monitor.retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.http.attempt(monitor).await {
                Ok(outcome) => return outcome,
                Err(err) => {
                    debug!(
                        monitor = %monitor.name,
                        attempt,
                        of = attempts,
                        "transport failure: {err}"
                    );
                    last_error = Some(err);
                    if attempt < attempts {
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                }
            }
        }

        let message = last_error
            .map(|err| err.to_string())
            .unwrap_or_else(|| "request failed".to_string());
        ProbeOutcome::failure(message)
    }
}
