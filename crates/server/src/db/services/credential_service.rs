use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};

use crate::db::entities::probe_credential;
use crate::db::{DirectoryError, ProbeDirectory, ProbeIdentity};

/// Looks up an active probe credential by its service token.
pub async fn authenticate_token(
    db: &DatabaseConnection,
    token: &str,
) -> Result<Option<ProbeIdentity>, DirectoryError> {
    let credential = probe_credential::Entity::find()
        .filter(probe_credential::Column::Token.eq(token))
        .filter(probe_credential::Column::IsActive.eq(true))
        .one(db)
        .await?;

    Ok(credential.map(|model| ProbeIdentity {
        id: model.id,
        probe_id: model.probe_id,
        pool: model.pool,
    }))
}

#[derive(Clone)]
pub struct SeaOrmProbeDirectory {
    db: DatabaseConnection,
}

impl SeaOrmProbeDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProbeDirectory for SeaOrmProbeDirectory {
    async fn authenticate(&self, token: &str) -> Result<Option<ProbeIdentity>, DirectoryError> {
        authenticate_token(&self.db, token).await
    }
}
