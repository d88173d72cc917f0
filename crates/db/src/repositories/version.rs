use chrono::{SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use tracing::info;
use uuid::Uuid;

use loadout_core::domain::agent::{
    AccountId, AgentId, LegacyVersionFields, NewVersion, VersionId, VersionRecord,
};

use super::rows::{encode_json, json_column, parse_timestamp};
use super::{version_config_for, RepositoryError, VersionRepository};
use crate::DbPool;

const VERSION_COLUMNS: &str = "id,
    agent_id,
    version_number,
    version_name,
    config,
    system_prompt,
    model,
    configured_mcps,
    custom_mcps,
    tool_flags,
    change_description,
    created_by,
    created_at";

pub struct SqlVersionRepository {
    pool: DbPool,
}

impl SqlVersionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl VersionRepository for SqlVersionRepository {
    async fn find_by_id(&self, id: &VersionId) -> Result<Option<VersionRecord>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {VERSION_COLUMNS} FROM agent_versions WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(version_from_row).transpose()
    }

    async fn list_for_agent(
        &self,
        agent_id: &AgentId,
    ) -> Result<Vec<VersionRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {VERSION_COLUMNS} FROM agent_versions
             WHERE agent_id = ?
             ORDER BY version_number ASC"
        ))
        .bind(&agent_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(version_from_row).collect()
    }

    async fn create_version(&self, version: NewVersion) -> Result<VersionId, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let metadata_raw = sqlx::query("SELECT metadata FROM agents WHERE id = ?")
            .bind(&version.agent_id.0)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("agent `{}`", version.agent_id)))?
            .try_get::<Option<String>, _>("metadata")?;
        let metadata = json_column("metadata", metadata_raw);

        let version_number: i64 = sqlx::query(
            "SELECT COALESCE(MAX(version_number), 0) + 1 AS next FROM agent_versions
             WHERE agent_id = ?",
        )
        .bind(&version.agent_id.0)
        .fetch_one(&mut *tx)
        .await?
        .try_get("next")?;

        let id = VersionId(Uuid::new_v4().to_string());
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let config = version_config_for(&version, &metadata);

        sqlx::query(
            "INSERT INTO agent_versions (
                id,
                agent_id,
                version_number,
                version_name,
                config,
                change_description,
                created_by,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id.0)
        .bind(&version.agent_id.0)
        .bind(version_number)
        .bind(&version.version_name)
        .bind(encode_json("config", &config)?)
        .bind(&version.change_description)
        .bind(&version.user_id.0)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE agents
             SET current_version_id = ?, version_count = version_count + 1, updated_at = ?
             WHERE id = ?",
        )
        .bind(&id.0)
        .bind(&now)
        .bind(&version.agent_id.0)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            event_name = "db.versions.created",
            agent_id = %version.agent_id,
            version_id = %id,
            version_number,
            version_name = %version.version_name,
            "agent version created"
        );

        Ok(id)
    }
}

fn version_from_row(row: SqliteRow) -> Result<VersionRecord, RepositoryError> {
    let config_raw: Option<String> = row.try_get("config")?;

    Ok(VersionRecord {
        id: VersionId(row.try_get("id")?),
        agent_id: AgentId(row.try_get("agent_id")?),
        version_number: row.try_get("version_number")?,
        version_name: row.try_get("version_name")?,
        config: config_raw.map(|raw| json_column("config", Some(raw))),
        legacy: LegacyVersionFields {
            system_prompt: row.try_get("system_prompt")?,
            model: row.try_get("model")?,
            configured_mcps: json_column("configured_mcps", row.try_get("configured_mcps")?),
            custom_mcps: json_column("custom_mcps", row.try_get("custom_mcps")?),
            tool_flags: json_column("tool_flags", row.try_get("tool_flags")?),
        },
        change_description: row.try_get("change_description")?,
        created_by: AccountId(row.try_get("created_by")?),
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
