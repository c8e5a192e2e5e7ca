use std::net::IpAddr;
use std::time::{Duration, Instant};

use anyhow::Result;
use rand::random;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::types::ProbeOutcome;
use crate::database::models::Monitor;

/// How much of a response body is kept on the check record
const RESPONSE_SNIPPET_CHARS: usize = 1000;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// HTTP/HTTPS prober
///
/// One `request` call is one attempt: a transport-level failure surfaces
/// as `Err` so the runner can apply its retry policy, while a completed
/// exchange always yields an outcome, mismatched or not.
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self> {
        // Timeouts are per-monitor, set on each request.
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    pub async fn request(&self, monitor: &Monitor) -> Result<ProbeOutcome, reqwest::Error> {
        let method = reqwest::Method::from_bytes(monitor.method.as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut request = self
            .client
            .request(method, &monitor.url)
            .timeout(Duration::from_secs(monitor.timeout_seconds));

        for (name, value) in monitor.parsed_headers() {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &monitor.body {
            request = request.body(body.clone());
        }

        let start = Instant::now();
        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        Ok(evaluate_response(monitor, status, &body, latency_ms))
    }
}

/// Judge a completed HTTP exchange against the monitor's expectations.
///
/// The status verdict is written after the text verdict, so when both fail
/// only the status-mismatch message survives.
pub(crate) fn evaluate_response(
    monitor: &Monitor,
    status: u16,
    body: &str,
    latency_ms: f64,
) -> ProbeOutcome {
    let snippet: String = body.chars().take(RESPONSE_SNIPPET_CHARS).collect();

    let mut error = None;
    let mut text_ok = true;
    if let Some(expected) = monitor.expected_text.as_deref() {
        if !body.contains(expected) {
            text_ok = false;
            error = Some(format!("expected text \"{expected}\" not found in response"));
        }
    }

    let status_ok = status == monitor.expected_status;
    if !status_ok {
        error = Some(format!("expected status {}, got {}", monitor.expected_status, status));
    }

    ProbeOutcome {
        success: status_ok && text_ok,
        latency_ms: Some(round2(latency_ms)),
        status_code: Some(status),
        error,
        body_snippet: Some(snippet),
    }
}

/// Raw TCP port prober
pub struct PortProber;

impl PortProber {
    pub async fn probe(&self, monitor: &Monitor) -> ProbeOutcome {
        let (host, port) = parse_port_target(&monitor.url);
        let start = Instant::now();

        let connect = TcpStream::connect((host.as_str(), port));
        match timeout(Duration::from_secs(monitor.timeout_seconds), connect).await {
            Ok(Ok(_stream)) => ProbeOutcome::up(round2(start.elapsed().as_secs_f64() * 1000.0)),
            Ok(Err(err)) => ProbeOutcome::failure(format!("connection failed to {host}:{port}: {err}"))
                .with_latency(round2(start.elapsed().as_secs_f64() * 1000.0)),
            Err(_) => ProbeOutcome::failure(format!("connection timed out to {host}:{port}")),
        }
    }
}

/// Extract host and port from a monitor URL. Without an explicit port the
/// scheme decides: 443 for https, otherwise 80.
pub(crate) fn parse_port_target(url: &str) -> (String, u16) {
    let default_port = if url.starts_with("https") { 443 } else { 80 };

    let stripped =
        url.strip_prefix("http://").or_else(|| url.strip_prefix("https://")).unwrap_or(url);
    let authority = stripped.split('/').next().unwrap_or(stripped);

    match authority.split_once(':') {
        Some((host, port)) => (host.to_string(), port.parse().unwrap_or(default_port)),
        None => (authority.to_string(), default_port),
    }
}

/// ICMP echo prober (surge-ping)
///
/// Raw ICMP sockets need elevated privileges; when the socket cannot be
/// created the probe reports a normal failure outcome.
pub struct PingProber;

impl PingProber {
    pub async fn probe(&self, monitor: &Monitor) -> ProbeOutcome {
        let host = parse_ping_host(&monitor.url);

        let addr = match resolve_host(&host).await {
            Ok(addr) => addr,
            Err(err) => return ProbeOutcome::failure(format!("failed to resolve {host}: {err}")),
        };

        let client = match surge_ping::Client::new(&surge_ping::Config::default()) {
            Ok(client) => client,
            Err(err) => return ProbeOutcome::failure(format!("icmp socket unavailable: {err}")),
        };

        let mut pinger = client.pinger(addr, surge_ping::PingIdentifier(random())).await;
        pinger.timeout(Duration::from_secs(monitor.timeout_seconds));

        match pinger.ping(surge_ping::PingSequence(0), &[]).await {
            Ok((_reply, rtt)) => ProbeOutcome::up(round2(rtt.as_secs_f64() * 1000.0)),
            Err(surge_ping::SurgeError::Timeout { .. }) => ProbeOutcome::failure("ping timeout"),
            Err(err) => ProbeOutcome::failure(format!("ping failed: {err}")),
        }
    }
}

/// Extract a bare hostname: scheme, path, and port are all stripped.
pub(crate) fn parse_ping_host(url: &str) -> String {
    let stripped =
        url.strip_prefix("http://").or_else(|| url.strip_prefix("https://")).unwrap_or(url);
    let host = stripped.split('/').next().unwrap_or(stripped);
    host.split(':').next().unwrap_or(host).to_string()
}

async fn resolve_host(host: &str) -> std::io::Result<IpAddr> {
    let mut addrs = tokio::net::lookup_host((host, 0)).await?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses returned"))
}
