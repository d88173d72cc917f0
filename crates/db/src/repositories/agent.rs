use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::debug;
use uuid::Uuid;

use loadout_core::domain::agent::{
    AccountId, AgentIcon, AgentId, AgentRecord, NewAgent, VersionId,
};

use super::rows::{encode_json, json_column, parse_timestamp};
use super::{carries_flag, AgentRepository, RepositoryError};
use crate::DbPool;

const AGENT_COLUMNS: &str = "id,
    account_id,
    name,
    description,
    icon_name,
    icon_color,
    icon_background,
    system_prompt,
    configured_mcps,
    custom_mcps,
    tool_flags,
    metadata,
    is_default,
    current_version_id,
    version_count,
    created_at,
    updated_at";

/// Rows whose metadata holds `flag` at all. Truthiness is decided in Rust so that SQL and
/// in-memory stores agree on loosely typed flags.
const FLAG_FILTER: &str =
    "CASE WHEN json_valid(metadata) THEN json_extract(metadata, ?) END IS NOT NULL";

pub struct SqlAgentRepository {
    pool: DbPool,
}

impl SqlAgentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn flagged_rows(
        &self,
        account_id: Option<&AccountId>,
        flag: &str,
    ) -> Result<Vec<AgentRecord>, RepositoryError> {
        let path = flag_path(flag);
        let rows = match account_id {
            Some(account_id) => {
                sqlx::query(&format!(
                    "SELECT {AGENT_COLUMNS} FROM agents
                     WHERE account_id = ? AND {FLAG_FILTER}
                     ORDER BY created_at ASC, id ASC"
                ))
                .bind(&account_id.0)
                .bind(path)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {AGENT_COLUMNS} FROM agents
                     WHERE {FLAG_FILTER}
                     ORDER BY created_at ASC, id ASC"
                ))
                .bind(path)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut agents = Vec::with_capacity(rows.len());
        for row in rows {
            let agent = agent_from_row(row)?;
            if carries_flag(&agent.metadata, flag) {
                agents.push(agent);
            }
        }
        Ok(agents)
    }
}

#[async_trait::async_trait]
impl AgentRepository for SqlAgentRepository {
    async fn find_by_id(&self, id: &AgentId) -> Result<Option<AgentRecord>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(agent_from_row).transpose()
    }

    async fn find_with_flag(
        &self,
        account_id: &AccountId,
        flag: &str,
    ) -> Result<Option<AgentRecord>, RepositoryError> {
        Ok(self.flagged_rows(Some(account_id), flag).await?.into_iter().next())
    }

    async fn account_ids_with_flag(&self, flag: &str) -> Result<Vec<AccountId>, RepositoryError> {
        let mut account_ids: Vec<AccountId> =
            self.flagged_rows(None, flag).await?.into_iter().map(|agent| agent.account_id).collect();
        account_ids.sort();
        account_ids.dedup();
        Ok(account_ids)
    }

    async fn count_with_flag(&self, flag: &str) -> Result<u64, RepositoryError> {
        Ok(self.flagged_rows(None, flag).await?.len() as u64)
    }

    async fn create(&self, agent: NewAgent) -> Result<AgentRecord, RepositoryError> {
        let id = AgentId(Uuid::new_v4().to_string());
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        sqlx::query(
            "INSERT INTO agents (
                id,
                account_id,
                name,
                description,
                icon_name,
                icon_color,
                icon_background,
                system_prompt,
                configured_mcps,
                custom_mcps,
                tool_flags,
                metadata,
                is_default,
                current_version_id,
                version_count,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, 0, ?, ?)",
        )
        .bind(&id.0)
        .bind(&agent.account_id.0)
        .bind(&agent.name)
        .bind(&agent.description)
        .bind(&agent.icon.name)
        .bind(&agent.icon.color)
        .bind(&agent.icon.background)
        .bind(&agent.system_prompt)
        .bind(encode_json("configured_mcps", &agent.configured_mcps)?)
        .bind(encode_json("custom_mcps", &agent.custom_mcps)?)
        .bind(encode_json("tool_flags", &agent.tool_flags)?)
        .bind(encode_json("metadata", &agent.metadata)?)
        .bind(agent.is_default)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(
            event_name = "db.agents.created",
            agent_id = %id,
            account_id = %agent.account_id,
            "agent row inserted"
        );

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("agent `{id}` vanished after insert")))
    }

    async fn delete(&self, id: &AgentId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn flag_path(flag: &str) -> String {
    format!("$.\"{}\"", flag.replace('"', "\\\""))
}

fn agent_from_row(row: SqliteRow) -> Result<AgentRecord, RepositoryError> {
    Ok(AgentRecord {
        id: AgentId(row.try_get("id")?),
        account_id: AccountId(row.try_get("account_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        icon: AgentIcon {
            name: row.try_get("icon_name")?,
            color: row.try_get("icon_color")?,
            background: row.try_get("icon_background")?,
        },
        system_prompt: row.try_get("system_prompt")?,
        configured_mcps: json_column("configured_mcps", row.try_get("configured_mcps")?),
        custom_mcps: json_column("custom_mcps", row.try_get("custom_mcps")?),
        tool_flags: json_column("tool_flags", row.try_get("tool_flags")?),
        metadata: match json_column("metadata", row.try_get("metadata")?) {
            Value::Null => Value::Object(Default::default()),
            metadata => metadata,
        },
        is_default: row.try_get("is_default")?,
        current_version_id: row.try_get::<Option<String>, _>("current_version_id")?.map(VersionId),
        version_count: row.try_get("version_count")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
