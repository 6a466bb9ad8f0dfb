//! The normalized outcome of one probe execution, shared between the probe
//! workers and the ingestion service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One normalized check outcome. Produced by the probe's executor, consumed
/// exactly once by the server's criteria evaluator. Network faults during the
/// check are data here (`is_online = false` plus an error descriptor), never
/// errors.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    pub monitor_id: i64,
    pub probe_id: String,
    pub checked_at: DateTime<Utc>,
    pub is_online: bool,
    pub response_time_ms: Option<i64>,
    pub status_code: Option<u16>,
    pub body_excerpt: Option<String>,
    /// Custom key/value measurements reported by the check (e.g. script
    /// checks exporting their own gauges).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub measurements: HashMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    /// A synthetic offline result for a check that never produced a response.
    pub fn offline(monitor_id: i64, probe_id: &str, error: String) -> Self {
        Self {
            monitor_id,
            probe_id: probe_id.to_string(),
            checked_at: Utc::now(),
            is_online: false,
            response_time_ms: None,
            status_code: None,
            body_excerpt: None,
            measurements: HashMap::new(),
            error: Some(error),
        }
    }
}

/// The kind of external probe a monitor performs.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Http,
    Tcp,
    Ping,
}

/// A monitor definition as handed to probe workers by the list endpoint.
/// Read-only to the probing pipeline; authored by tenant configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSpec {
    pub id: i64,
    pub name: String,
    pub check_kind: CheckKind,
    pub target: String,
    pub timeout_seconds: u64,
    pub criteria: crate::criteria::CriteriaSet,
}
