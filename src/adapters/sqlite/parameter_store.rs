//! SQLite implementation of the ParameterStore.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::errors::DecisionResult;
use crate::domain::ports::{OutcomeRecord, ParameterSet, ParameterStore};

use super::parse_datetime;

#[derive(Clone)]
pub struct SqliteParameterStore {
    pool: SqlitePool,
}

impl SqliteParameterStore {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OutcomeRow {
    arm_id: String,
    context_hash: String,
    context_features: String,
    reward: f64,
    execution_time: f64,
    cost: f64,
    timestamp: String,
}

impl TryFrom<OutcomeRow> for OutcomeRecord {
    type Error = crate::domain::errors::DecisionError;

    fn try_from(row: OutcomeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            arm_id: row.arm_id,
            context_hash: row.context_hash,
            context_features: row.context_features,
            reward: row.reward,
            execution_time: row.execution_time,
            cost: row.cost,
            timestamp: parse_datetime(&row.timestamp)?,
        })
    }
}

#[async_trait]
impl ParameterStore for SqliteParameterStore {
    async fn save(&self, algorithm: &str, arm_id: &str, params: &ParameterSet) -> DecisionResult<()> {
        let updated_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for (name, value) in params {
            sqlx::query(
                r#"INSERT INTO bandit_parameters (algorithm, arm_id, parameter_name, value, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(algorithm, arm_id, parameter_name) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at"#,
            )
            .bind(algorithm)
            .bind(arm_id)
            .bind(name)
            .bind(value.as_slice())
            .bind(&updated_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load(&self, algorithm: &str, arm_id: &str) -> DecisionResult<ParameterSet> {
        let rows: Vec<(String, Vec<u8>)> = sqlx::query_as(
            "SELECT parameter_name, value FROM bandit_parameters WHERE algorithm = ? AND arm_id = ?",
        )
        .bind(algorithm)
        .bind(arm_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    async fn delete(&self, algorithm: &str, arm_id: &str) -> DecisionResult<()> {
        sqlx::query("DELETE FROM bandit_parameters WHERE algorithm = ? AND arm_id = ?")
            .bind(algorithm)
            .bind(arm_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_outcome(&self, record: &OutcomeRecord) -> DecisionResult<()> {
        sqlx::query(
            r#"INSERT INTO action_history
                (arm_id, context_hash, context_features, reward, execution_time, cost, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&record.arm_id)
        .bind(&record.context_hash)
        .bind(&record.context_features)
        .bind(record.reward)
        .bind(record.execution_time)
        .bind(record.cost)
        .bind(record.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_outcomes(&self, arm_id: &str, limit: usize) -> DecisionResult<Vec<OutcomeRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<OutcomeRow> = sqlx::query_as(
            r#"SELECT arm_id, context_hash, context_features, reward, execution_time, cost, timestamp
            FROM action_history WHERE arm_id = ? ORDER BY id DESC LIMIT ?"#,
        )
        .bind(arm_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(OutcomeRecord::try_from).collect()
    }
}
