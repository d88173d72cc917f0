use chrono::SecondsFormat;
use sqlx::{sqlite::SqliteRow, Row};

use loadout_core::domain::agent::{AgentId, TriggerId, TriggerRecord};

use super::rows::{encode_json, json_column, parse_timestamp};
use super::{RepositoryError, TriggerRepository};
use crate::DbPool;

pub struct SqlTriggerRepository {
    pool: DbPool,
}

impl SqlTriggerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TriggerRepository for SqlTriggerRepository {
    async fn list_for_agent(
        &self,
        agent_id: &AgentId,
    ) -> Result<Vec<TriggerRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, agent_id, name, trigger_type, config, is_active, created_at
             FROM agent_triggers
             WHERE agent_id = ?
             ORDER BY created_at ASC, id ASC",
        )
        .bind(&agent_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(trigger_from_row).collect()
    }

    async fn save(&self, trigger: TriggerRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO agent_triggers (id, agent_id, name, trigger_type, config, is_active, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                trigger_type = excluded.trigger_type,
                config = excluded.config,
                is_active = excluded.is_active",
        )
        .bind(&trigger.id.0)
        .bind(&trigger.agent_id.0)
        .bind(&trigger.name)
        .bind(&trigger.trigger_type)
        .bind(encode_json("config", &trigger.config)?)
        .bind(trigger.is_active)
        .bind(trigger.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: &TriggerId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM agent_triggers WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn trigger_from_row(row: SqliteRow) -> Result<TriggerRecord, RepositoryError> {
    Ok(TriggerRecord {
        id: TriggerId(row.try_get("id")?),
        agent_id: AgentId(row.try_get("agent_id")?),
        name: row.try_get("name")?,
        trigger_type: row.try_get("trigger_type")?,
        config: json_column("config", row.try_get("config")?),
        is_active: row.try_get("is_active")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use loadout_core::domain::agent::{
        AccountId, AccountRecord, AgentIcon, AgentId, NewAgent, TriggerId, TriggerRecord,
    };

    use super::SqlTriggerRepository;
    use crate::migrations;
    use crate::repositories::{
        AccountRepository, AgentRepository, SqlAccountRepository, SqlAgentRepository,
        TriggerRepository,
    };
    use crate::connect_with_settings;

    fn trigger(id: &str, agent_id: &AgentId, minute: u32) -> TriggerRecord {
        TriggerRecord {
            id: TriggerId(id.to_string()),
            agent_id: agent_id.clone(),
            name: format!("Trigger {id}"),
            trigger_type: "schedule".to_string(),
            config: json!({"cron": "0 9 * * 1"}),
            is_active: true,
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 8, minute, 0).single().expect("timestamp"),
        }
    }

    #[tokio::test]
    async fn triggers_are_listed_deleted_and_cascade_with_their_agent() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlAccountRepository::new(pool.clone())
            .save(AccountRecord {
                id: AccountId("acct-1".to_string()),
                name: "Account One".to_string(),
                personal_account: true,
                created_at: Utc::now(),
            })
            .await
            .expect("save account");
        let agents = SqlAgentRepository::new(pool.clone());
        let agent = agents
            .create(NewAgent {
                account_id: AccountId("acct-1".to_string()),
                name: "Scheduler".to_string(),
                description: None,
                icon: AgentIcon::default(),
                system_prompt: "Run on schedule.".to_string(),
                configured_mcps: Vec::new(),
                custom_mcps: Vec::new(),
                tool_flags: BTreeMap::new(),
                metadata: Default::default(),
                is_default: false,
            })
            .await
            .expect("create agent");
        let repo = SqlTriggerRepository::new(pool);

        repo.save(trigger("t-2", &agent.id, 2)).await.expect("save t-2");
        repo.save(trigger("t-1", &agent.id, 1)).await.expect("save t-1");

        let listed = repo.list_for_agent(&agent.id).await.expect("list");
        assert_eq!(listed, vec![trigger("t-1", &agent.id, 1), trigger("t-2", &agent.id, 2)]);

        assert!(repo.delete(&TriggerId("t-1".to_string())).await.expect("delete"));
        assert!(!repo.delete(&TriggerId("t-1".to_string())).await.expect("delete again"));

        agents.delete(&agent.id).await.expect("delete agent");
        assert!(repo.list_for_agent(&agent.id).await.expect("list after delete").is_empty());
    }
}
