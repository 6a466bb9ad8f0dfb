//! Executes one external probe for a monitor and normalizes the outcome.
//!
//! Every network fault (timeout, DNS, connection refused, TLS) is folded
//! into a `CheckResult` with `is_online = false` and an error descriptor;
//! the rest of the pipeline never sees these as errors.

use std::time::{Duration, Instant};

use chrono::Utc;
use pulsegate_common::check::{CheckKind, CheckResult, MonitorSpec};
use rand::random;
use thiserror::Error;
use tracing::debug;

/// Maximum number of characters of a response body carried into the result.
const BODY_EXCERPT_CHARS: usize = 2048;

#[derive(Debug, Error)]
pub enum ProbeExecutionError {
    #[error("request timed out")]
    Timeout,
    #[error("DNS resolution failed: {0}")]
    Dns(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    #[error("{0}")]
    Request(String),
}

pub struct CheckExecutor {
    client: reqwest::Client,
}

impl CheckExecutor {
    pub fn new() -> Result<Self, reqwest::Error> {
        // Timeouts are applied per request from each monitor's spec.
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }

    /// Runs one check and always returns a valid `CheckResult`.
    pub async fn execute(&self, probe_id: &str, spec: &MonitorSpec) -> CheckResult {
        let timeout = Duration::from_secs(spec.timeout_seconds.max(1));
        let outcome = match spec.check_kind {
            CheckKind::Http => self.check_http(probe_id, spec, timeout).await,
            CheckKind::Tcp => self.check_tcp(probe_id, spec, timeout).await,
            CheckKind::Ping => self.check_ping(probe_id, spec, timeout).await,
        };

        match outcome {
            Ok(result) => result,
            Err(e) => {
                debug!(monitor_id = spec.id, error = %e, "Check produced no response; reporting offline.");
                CheckResult::offline(spec.id, probe_id, e.to_string())
            }
        }
    }

    async fn check_http(
        &self,
        probe_id: &str,
        spec: &MonitorSpec,
        timeout: Duration,
    ) -> Result<CheckResult, ProbeExecutionError> {
        let start = Instant::now();
        let response = self
            .client
            .get(&spec.target)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        let response_time_ms = start.elapsed().as_millis() as i64;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let body_excerpt: String = body.chars().take(BODY_EXCERPT_CHARS).collect();

        Ok(CheckResult {
            monitor_id: spec.id,
            probe_id: probe_id.to_string(),
            checked_at: Utc::now(),
            is_online: status.is_success(),
            response_time_ms: Some(response_time_ms),
            status_code: Some(status.as_u16()),
            body_excerpt: Some(body_excerpt),
            measurements: Default::default(),
            error: None,
        })
    }

    async fn check_tcp(
        &self,
        probe_id: &str,
        spec: &MonitorSpec,
        timeout: Duration,
    ) -> Result<CheckResult, ProbeExecutionError> {
        let start = Instant::now();
        let connect = tokio::net::TcpStream::connect(&spec.target);
        let stream = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| ProbeExecutionError::Timeout)?
            .map_err(|e| ProbeExecutionError::Connect(e.to_string()))?;
        drop(stream);
        let response_time_ms = start.elapsed().as_millis() as i64;

        Ok(CheckResult {
            monitor_id: spec.id,
            probe_id: probe_id.to_string(),
            checked_at: Utc::now(),
            is_online: true,
            response_time_ms: Some(response_time_ms),
            status_code: None,
            body_excerpt: None,
            measurements: Default::default(),
            error: None,
        })
    }

    async fn check_ping(
        &self,
        probe_id: &str,
        spec: &MonitorSpec,
        timeout: Duration,
    ) -> Result<CheckResult, ProbeExecutionError> {
        // The target may be a domain name or an IP address.
        let target = spec.target.clone();
        let resolved = tokio::task::spawn_blocking(move || {
            use std::net::ToSocketAddrs;
            format!("{target}:0").to_socket_addrs()
        })
        .await
        .map_err(|e| ProbeExecutionError::Request(e.to_string()))?
        .map_err(|e| ProbeExecutionError::Dns(e.to_string()))?;

        let target_addr = resolved
            .into_iter()
            .next()
            .ok_or_else(|| ProbeExecutionError::Dns("no addresses returned".to_string()))?
            .ip();

        let client = surge_ping::Client::new(&surge_ping::Config::default())
            .map_err(|e| ProbeExecutionError::Request(e.to_string()))?;
        let mut pinger = client
            .pinger(target_addr, surge_ping::PingIdentifier(random()))
            .await;

        let ping = pinger.ping(surge_ping::PingSequence(0), &[]);
        let (_reply, duration) = tokio::time::timeout(timeout, ping)
            .await
            .map_err(|_| ProbeExecutionError::Timeout)?
            .map_err(|e| ProbeExecutionError::Connect(e.to_string()))?;

        Ok(CheckResult {
            monitor_id: spec.id,
            probe_id: probe_id.to_string(),
            checked_at: Utc::now(),
            is_online: true,
            response_time_ms: Some(duration.as_millis() as i64),
            status_code: None,
            body_excerpt: None,
            measurements: Default::default(),
            error: None,
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> ProbeExecutionError {
    if e.is_timeout() {
        ProbeExecutionError::Timeout
    } else if e.is_connect() {
        let detail = e.to_string();
        if detail.contains("dns") {
            ProbeExecutionError::Dns(detail)
        } else {
            ProbeExecutionError::Connect(detail)
        }
    } else {
        let detail = e.to_string();
        if detail.contains("certificate") || detail.contains("tls") {
            ProbeExecutionError::Tls(detail)
        } else {
            ProbeExecutionError::Request(detail)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulsegate_common::criteria::CriteriaSet;

    fn tcp_spec(target: String, timeout_seconds: u64) -> MonitorSpec {
        MonitorSpec {
            id: 7,
            name: "local tcp".to_string(),
            check_kind: CheckKind::Tcp,
            target,
            timeout_seconds,
            criteria: CriteriaSet::default(),
        }
    }

    #[tokio::test]
    async fn tcp_check_reports_online_for_listening_socket() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let executor = CheckExecutor::new().unwrap();
        let result = executor.execute("probe-1", &tcp_spec(addr.to_string(), 2)).await;

        assert!(result.is_online);
        assert_eq!(result.monitor_id, 7);
        assert_eq!(result.probe_id, "probe-1");
        assert!(result.response_time_ms.is_some());
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn tcp_check_folds_refused_connection_into_offline_result() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let executor = CheckExecutor::new().unwrap();
        let result = executor.execute("probe-1", &tcp_spec(addr.to_string(), 2)).await;

        assert!(!result.is_online);
        assert!(result.response_time_ms.is_none());
        assert!(result.error.is_some());
    }

    #[test]
    fn offline_result_carries_error_descriptor() {
        let result = CheckResult::offline(3, "probe-2", ProbeExecutionError::Timeout.to_string());
        assert!(!result.is_online);
        assert_eq!(result.error.as_deref(), Some("request timed out"));
    }
}
