//! Persistence collaborators.
//!
//! Monitor definitions and probe credentials are authored elsewhere
//! (administrative surfaces out of scope here); the core pipeline only reads
//! them, through the two directory traits below. The SeaORM-backed
//! implementations live in `services`.

pub mod entities;
pub mod services;

use async_trait::async_trait;
use pulsegate_common::check::MonitorSpec;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Monitor {id} has an invalid definition: {reason}")]
    InvalidMonitor { id: i64, reason: String },
}

/// An authenticated probe worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeIdentity {
    pub id: i64,
    pub probe_id: String,
    pub pool: String,
}

/// Resolves a header-borne service credential to a probe identity.
#[async_trait]
pub trait ProbeDirectory: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Option<ProbeIdentity>, DirectoryError>;
}

/// Read-only source of monitor definitions for the probing pipeline.
#[async_trait]
pub trait MonitorDirectory: Send + Sync {
    /// Active monitors assigned to the probe's pool, in declaration order,
    /// capped at `limit`.
    async fn monitors_for_probe(
        &self,
        probe: &ProbeIdentity,
        limit: u64,
    ) -> Result<Vec<MonitorSpec>, DirectoryError>;

    async fn monitor_by_id(&self, id: i64) -> Result<Option<MonitorSpec>, DirectoryError>;
}
