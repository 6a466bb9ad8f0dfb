//! The probe-facing ingestion boundary.
//!
//! Both endpoints authenticate the submitting probe from its header-borne
//! service credential before touching the payload. The ingest ack means
//! "accepted for processing"; the probe's round-trip must stay short.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use pulsegate_common::check::CheckResult;
use pulsegate_common::wire::{IngestAck, MonitorListRequest, MonitorListResponse};
use tracing::{debug, warn};

use crate::criteria;
use crate::db::ProbeIdentity;
use crate::web::{AppError, AppState};
use pulsegate_common::version::VERSION;

pub fn create_probe_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/probe/response/ingest", post(ingest_check_result))
        .route("/monitor/list", post(list_monitors))
        .route("/health", get(health_check_handler))
}

/// Resolves the request's bearer credential to a probe identity.
async fn authenticate_probe(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<ProbeIdentity, AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("missing service credential".to_string()))?;

    state
        .probes
        .authenticate(token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("unknown service credential".to_string()))
}

async fn ingest_check_result(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestAck>, AppError> {
    let probe = authenticate_probe(&state, &headers).await?;

    // With automation off we still ack success so probes do not retry, but
    // nothing reaches the evaluator.
    if !state.incident_automation_enabled.load(Ordering::Relaxed) {
        debug!(probe_id = %probe.probe_id, "Incident automation disabled; skipping evaluation.");
        return Ok(Json(IngestAck::disabled()));
    }

    let result: CheckResult = serde_json::from_slice(&body)
        .map_err(|e| AppError::MalformedPayload(e.to_string()))?;

    if result.probe_id != probe.probe_id {
        // The credential is authoritative for who submitted this.
        warn!(
            claimed = %result.probe_id,
            authenticated = %probe.probe_id,
            "Report names a different probe than its credential."
        );
    }

    let monitor = state
        .monitors
        .monitor_by_id(result.monitor_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("monitor {} does not exist", result.monitor_id))
        })?;

    let outcome = criteria::evaluate(&result, &monitor.criteria);
    let decision = state.coordinator.process(monitor.id, &outcome).await;
    debug!(
        monitor_id = monitor.id,
        matched = outcome.is_match(),
        decision = ?decision,
        "Processed check result."
    );

    Ok(Json(IngestAck::accepted()))
}

async fn list_monitors(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<MonitorListRequest>,
) -> Result<Json<MonitorListResponse>, AppError> {
    let probe = authenticate_probe(&state, &headers).await?;

    if payload.probe_id != probe.probe_id {
        warn!(
            claimed = %payload.probe_id,
            authenticated = %probe.probe_id,
            "List request names a different probe than its credential."
        );
    }

    let monitors = state
        .monitors
        .monitors_for_probe(&probe, payload.limit)
        .await?;
    Ok(Json(MonitorListResponse { monitors }))
}

async fn health_check_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "service": "pulsegate-server", "version": VERSION }))
}
