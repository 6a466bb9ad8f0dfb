//! Read-side service turning stored monitor rows into the wire-shape
//! `MonitorSpec` handed to probe workers and the evaluation pipeline.

use async_trait::async_trait;
use pulsegate_common::check::{CheckKind, MonitorSpec};
use pulsegate_common::criteria::CriteriaSet;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use tracing::warn;

use crate::db::entities::monitor;
use crate::db::{DirectoryError, MonitorDirectory, ProbeIdentity};

pub async fn monitors_for_pool(
    db: &DatabaseConnection,
    pool: &str,
    limit: u64,
) -> Result<Vec<MonitorSpec>, DirectoryError> {
    let models = monitor::Entity::find()
        .filter(monitor::Column::ProbePool.eq(pool))
        .filter(monitor::Column::IsActive.eq(true))
        .order_by_asc(monitor::Column::Id)
        .limit(limit)
        .all(db)
        .await?;

    let mut specs = Vec::with_capacity(models.len());
    for model in models {
        match monitor_spec_from_model(model) {
            Ok(spec) => specs.push(spec),
            Err(e) => {
                // A misconfigured monitor must not take the batch down.
                warn!(error = %e, "Skipping monitor with invalid definition.");
            }
        }
    }
    Ok(specs)
}

pub async fn monitor_by_id(
    db: &DatabaseConnection,
    id: i64,
) -> Result<Option<MonitorSpec>, DirectoryError> {
    let model = monitor::Entity::find_by_id(id).one(db).await?;
    model.map(monitor_spec_from_model).transpose()
}

fn monitor_spec_from_model(model: monitor::Model) -> Result<MonitorSpec, DirectoryError> {
    let check_kind = match model.check_kind.as_str() {
        "http" | "https" => CheckKind::Http,
        "tcp" => CheckKind::Tcp,
        "ping" => CheckKind::Ping,
        other => {
            return Err(DirectoryError::InvalidMonitor {
                id: model.id,
                reason: format!("unknown check kind '{other}'"),
            })
        }
    };

    let criteria: CriteriaSet =
        serde_json::from_value(model.criteria).map_err(|e| DirectoryError::InvalidMonitor {
            id: model.id,
            reason: format!("criteria did not deserialize: {e}"),
        })?;

    Ok(MonitorSpec {
        id: model.id,
        name: model.name,
        check_kind,
        target: model.target,
        timeout_seconds: model.timeout_seconds.max(1) as u64,
        criteria,
    })
}

#[derive(Clone)]
pub struct SeaOrmMonitorDirectory {
    db: DatabaseConnection,
}

impl SeaOrmMonitorDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MonitorDirectory for SeaOrmMonitorDirectory {
    async fn monitors_for_probe(
        &self,
        probe: &ProbeIdentity,
        limit: u64,
    ) -> Result<Vec<MonitorSpec>, DirectoryError> {
        monitors_for_pool(&self.db, &probe.pool, limit).await
    }

    async fn monitor_by_id(&self, id: i64) -> Result<Option<MonitorSpec>, DirectoryError> {
        monitor_by_id(&self.db, id).await
    }
}
