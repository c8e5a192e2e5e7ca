//! Monitor configuration validation.
//!
//! Invariants enforced before a monitor reaches the scheduler: positive,
//! bounded interval and timeout, at least one attempt, and a target that
//! parses for its monitor type.

use anyhow::{Result, anyhow};
use url::Url;

use crate::database::models::Monitor;
use crate::monitoring::probe::parse_port_target;
use crate::monitoring::types::MonitorType;

/// Validate a monitor's invariants. Called on every save.
pub fn validate_monitor(monitor: &Monitor) -> Result<()> {
    validate_check_interval(monitor.interval_seconds)?;
    validate_timeout(monitor.timeout_seconds)?;
    validate_retries(monitor.retries)?;

    match monitor.kind() {
        Some(MonitorType::Http | MonitorType::Https) => validate_http_target(&monitor.url),
        Some(MonitorType::Port) => validate_port_target(&monitor.url),
        Some(MonitorType::Ping) => validate_ping_target(&monitor.url),
        None => Err(anyhow!("unsupported monitor type: {}", monitor.monitor_type)),
    }
}

fn validate_http_target(target: &str) -> Result<()> {
    let url = Url::parse(target).map_err(|e| anyhow!("invalid URL: {e}"))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow!("invalid scheme for HTTP monitor: {other}")),
    }

    if url.host_str().is_none() {
        return Err(anyhow!("HTTP monitor URL has no host"));
    }

    Ok(())
}

fn validate_port_target(target: &str) -> Result<()> {
    let (host, port) = parse_port_target(target);
    if host.is_empty() {
        return Err(anyhow!("port monitor target has no host"));
    }
    if port == 0 {
        return Err(anyhow!("port 0 is not valid"));
    }
    Ok(())
}

fn validate_ping_target(target: &str) -> Result<()> {
    if crate::monitoring::probe::parse_ping_host(target).is_empty() {
        return Err(anyhow!("ping monitor target has no host"));
    }
    Ok(())
}

/// Validate check interval bounds
pub fn validate_check_interval(interval_seconds: u64) -> Result<()> {
    const MIN_INTERVAL: u64 = 10; // 10 seconds
    const MAX_INTERVAL: u64 = 86400; // 24 hours

    if interval_seconds < MIN_INTERVAL {
        return Err(anyhow!(
            "check interval too short: {} seconds (minimum: {})",
            interval_seconds,
            MIN_INTERVAL
        ));
    }

    if interval_seconds > MAX_INTERVAL {
        return Err(anyhow!(
            "check interval too long: {} seconds (maximum: {})",
            interval_seconds,
            MAX_INTERVAL
        ));
    }

    Ok(())
}

/// Validate timeout bounds
pub fn validate_timeout(timeout_seconds: u64) -> Result<()> {
    const MIN_TIMEOUT: u64 = 1;
    const MAX_TIMEOUT: u64 = 300; // 5 minutes

    if timeout_seconds < MIN_TIMEOUT {
        return Err(anyhow!(
            "timeout too short: {} seconds (minimum: {})",
            timeout_seconds,
            MIN_TIMEOUT
        ));
    }

    if timeout_seconds > MAX_TIMEOUT {
        return Err(anyhow!(
            "timeout too long: {} seconds (maximum: {})",
            timeout_seconds,
            MAX_TIMEOUT
        ));
    }

    Ok(())
}

/// At least one attempt must be configured
pub fn validate_retries(retries: u32) -> Result<()> {
    if retries == 0 {
        return Err(anyhow!("retries must be at least 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_http_targets() {
        assert!(validate_http_target("https://example.com").is_ok());
        assert!(validate_http_target("http://example.com:8080/health").is_ok());
    }

    #[test]
    fn rejects_bad_http_targets() {
        assert!(validate_http_target("ftp://example.com").is_err());
        assert!(validate_http_target("not a url").is_err());
    }

    #[test]
    fn interval_bounds() {
        assert!(validate_check_interval(10).is_ok());
        assert!(validate_check_interval(86400).is_ok());
        assert!(validate_check_interval(5).is_err());
        assert!(validate_check_interval(100_000).is_err());
    }

    #[test]
    fn timeout_bounds() {
        assert!(validate_timeout(1).is_ok());
        assert!(validate_timeout(300).is_ok());
        assert!(validate_timeout(0).is_err());
        assert!(validate_timeout(301).is_err());
    }

    #[test]
    fn zero_retries_rejected() {
        assert!(validate_retries(0).is_err());
        assert!(validate_retries(1).is_ok());
    }

    #[test]
    fn whole_monitor_validation() {
        let mut monitor = Monitor::new("api", "https://example.com", "https");
        assert!(validate_monitor(&monitor).is_ok());

        monitor.retries = 0;
        assert!(validate_monitor(&monitor).is_err());

        monitor.retries = 3;
        monitor.monitor_type = "dns".to_string();
        assert!(validate_monitor(&monitor).is_err());
    }
}
