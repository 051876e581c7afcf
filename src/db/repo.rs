//! Postgres-backed guild state store. Documents are JSONB payloads keyed by
//! guild (and role/message where applicable); memory stays authoritative
//! while the process lives, so every statement here is a plain upsert,
//! conditional update, or load.

use crate::config::GuildConfig;
use crate::ports::GuildStateRepo;
use crate::quota::QuotaLedger;
use crate::raid::RaidSnapshot;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

pub struct PgRepo {
    pool: PgPool,
}

impl PgRepo {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new().max_connections(8).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS guild_configs (
                guild_id   BIGINT PRIMARY KEY,
                payload    JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS raids (
                guild_id   BIGINT NOT NULL,
                message_id BIGINT NOT NULL,
                payload    JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (guild_id, message_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS raid_claims (
                id         BIGSERIAL PRIMARY KEY,
                guild_id   BIGINT NOT NULL,
                message_id BIGINT NOT NULL,
                react_key  TEXT   NOT NULL,
                member_id  BIGINT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS raid_claims_raid_idx ON raid_claims (guild_id, message_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quota_ledgers (
                guild_id   BIGINT NOT NULL,
                role_id    BIGINT NOT NULL,
                payload    JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (guild_id, role_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl GuildStateRepo for PgRepo {
    async fn get_or_create_config(&self, guild_id: u64) -> anyhow::Result<GuildConfig> {
        let row = sqlx::query("SELECT payload FROM guild_configs WHERE guild_id = $1")
            .bind(guild_id as i64)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = row {
            let payload: serde_json::Value = row.get("payload");
            return Ok(serde_json::from_value(payload)?);
        }
        let cfg = GuildConfig::default();
        sqlx::query(
            "INSERT INTO guild_configs (guild_id, payload) VALUES ($1, $2)
             ON CONFLICT (guild_id) DO NOTHING",
        )
        .bind(guild_id as i64)
        .bind(serde_json::to_value(&cfg)?)
        .execute(&self.pool)
        .await?;
        Ok(cfg)
    }

    async fn save_config(&self, guild_id: u64, cfg: &GuildConfig) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO guild_configs (guild_id, payload) VALUES ($1, $2)
             ON CONFLICT (guild_id) DO UPDATE SET payload = EXCLUDED.payload, updated_at = now()",
        )
        .bind(guild_id as i64)
        .bind(serde_json::to_value(cfg)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_raid(&self, guild_id: u64, snap: &RaidSnapshot) -> anyhow::Result<()> {
        // The snapshot already folds in every claim, so the journal rows it
        // supersedes are dropped in the same transaction.
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO raids (guild_id, message_id, payload) VALUES ($1, $2, $3)
             ON CONFLICT (guild_id, message_id)
             DO UPDATE SET payload = EXCLUDED.payload, updated_at = now()",
        )
        .bind(guild_id as i64)
        .bind(snap.message_id as i64)
        .bind(serde_json::to_value(snap)?)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM raid_claims WHERE guild_id = $1 AND message_id = $2")
            .bind(guild_id as i64)
            .bind(snap.message_id as i64)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn remove_raid(&self, guild_id: u64, message_id: u64) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM raid_claims WHERE guild_id = $1 AND message_id = $2")
            .bind(guild_id as i64)
            .bind(message_id as i64)
            .execute(&mut *tx)
            .await?;
        let res = sqlx::query("DELETE FROM raids WHERE guild_id = $1 AND message_id = $2")
            .bind(guild_id as i64)
            .bind(message_id as i64)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }

    async fn append_claim(
        &self,
        guild_id: u64,
        message_id: u64,
        key: &str,
        member_id: u64,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            "INSERT INTO raid_claims (guild_id, message_id, react_key, member_id)
             SELECT $1, $2, $3, $4
             WHERE EXISTS (SELECT 1 FROM raids WHERE guild_id = $1 AND message_id = $2)",
        )
        .bind(guild_id as i64)
        .bind(message_id as i64)
        .bind(key)
        .bind(member_id as i64)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn load_raids(&self, guild_id: u64) -> anyhow::Result<Vec<RaidSnapshot>> {
        let rows = sqlx::query("SELECT payload FROM raids WHERE guild_id = $1")
            .bind(guild_id as i64)
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: serde_json::Value = row.get("payload");
            match serde_json::from_value(payload) {
                Ok(snap) => out.push(snap),
                Err(e) => tracing::warn!(guild = guild_id, "skipping undecodable raid row: {e}"),
            }
        }
        Ok(out)
    }

    async fn load_claims(
        &self,
        guild_id: u64,
        message_id: u64,
    ) -> anyhow::Result<Vec<(String, u64)>> {
        let rows = sqlx::query(
            "SELECT react_key, member_id FROM raid_claims
             WHERE guild_id = $1 AND message_id = $2 ORDER BY id",
        )
        .bind(guild_id as i64)
        .bind(message_id as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let key: String = row.get("react_key");
                let member: i64 = row.get("member_id");
                (key, member as u64)
            })
            .collect())
    }

    async fn load_quotas(&self, guild_id: u64) -> anyhow::Result<Vec<QuotaLedger>> {
        let rows = sqlx::query("SELECT payload FROM quota_ledgers WHERE guild_id = $1")
            .bind(guild_id as i64)
            .fetch_all(&self.pool)
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: serde_json::Value = row.get("payload");
            match serde_json::from_value(payload) {
                Ok(ledger) => out.push(ledger),
                Err(e) => tracing::warn!(guild = guild_id, "skipping undecodable quota row: {e}"),
            }
        }
        Ok(out)
    }

    async fn save_quota(&self, guild_id: u64, ledger: &QuotaLedger) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO quota_ledgers (guild_id, role_id, payload) VALUES ($1, $2, $3)
             ON CONFLICT (guild_id, role_id)
             DO UPDATE SET payload = EXCLUDED.payload, updated_at = now()",
        )
        .bind(guild_id as i64)
        .bind(ledger.role_id as i64)
        .bind(serde_json::to_value(ledger)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_quota(&self, guild_id: u64, role_id: u64) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM quota_ledgers WHERE guild_id = $1 AND role_id = $2")
            .bind(guild_id as i64)
            .bind(role_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
