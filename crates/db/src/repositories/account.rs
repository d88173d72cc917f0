use chrono::SecondsFormat;
use sqlx::{sqlite::SqliteRow, Row};

use loadout_core::domain::agent::{AccountId, AccountRecord};

use super::rows::parse_timestamp;
use super::{AccountRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAccountRepository {
    pool: DbPool,
}

impl SqlAccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AccountRepository for SqlAccountRepository {
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<AccountRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, personal_account, created_at FROM accounts WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(account_from_row).transpose()
    }

    async fn save(&self, account: AccountRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO accounts (id, name, personal_account, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                personal_account = excluded.personal_account",
        )
        .bind(&account.id.0)
        .bind(&account.name)
        .bind(account.personal_account)
        .bind(account.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_personal_account_ids(&self) -> Result<Vec<AccountId>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id FROM accounts WHERE personal_account = 1 ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Ok(AccountId(row.try_get("id")?)))
            .collect()
    }
}

fn account_from_row(row: SqliteRow) -> Result<AccountRecord, RepositoryError> {
    Ok(AccountRecord {
        id: AccountId(row.try_get("id")?),
        name: row.try_get("name")?,
        personal_account: row.try_get("personal_account")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
