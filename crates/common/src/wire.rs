//! Request/response payloads exchanged between probe workers and the server.

use serde::{Deserialize, Serialize};

use crate::check::MonitorSpec;

/// Acknowledgement returned by `POST /probe/response/ingest`.
///
/// `accepted` means "accepted for processing", not "fully resolved", so the
/// probe's round-trip stays short. When automatic incident handling is
/// disabled server-side, `message` carries `"disabled"` and the probe must
/// not retry.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IngestAck {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl IngestAck {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            message: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            accepted: true,
            message: Some("disabled".to_string()),
        }
    }
}

/// Body of `POST /monitor/list`: worker identity plus a batch limit.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MonitorListRequest {
    pub probe_id: String,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    100
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MonitorListResponse {
    pub monitors: Vec<MonitorSpec>,
}
