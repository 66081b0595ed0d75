use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use signal_core::{ApprovalDecision, DecisionStore, StoreError, TradeSignal};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS signal_decisions (
    signal_id TEXT PRIMARY KEY,
    symbol TEXT NOT NULL,
    timeframe TEXT NOT NULL,
    position_type TEXT NOT NULL,
    outcome TEXT NOT NULL,
    reason TEXT,
    successor_id TEXT,
    parent_id TEXT,
    signal_json TEXT NOT NULL,
    decided_at TEXT NOT NULL,
    recorded_at TEXT NOT NULL
)";

/// Review decisions in SQLite, one row per decided signal.
#[derive(Clone)]
pub struct SqliteDecisionStore {
    pool: SqlitePool,
}

impl SqliteDecisionStore {
    /// Opens (creating if needed) the database at `url` and ensures the table.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("invalid DATABASE_URL '{}'", url))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to open decision database")?;

        let store = Self::new(pool);
        store.migrate().await.context("failed to create signal_decisions table")?;
        Ok(store)
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl DecisionStore for SqliteDecisionStore {
    /// Upserts on `signal_id` so a retried save never duplicates a decision.
    async fn record(
        &self,
        signal: &TradeSignal,
        decision: &ApprovalDecision,
    ) -> Result<(), StoreError> {
        let signal_json = serde_json::to_string(signal)
            .map_err(|e| StoreError::Database(format!("failed to encode signal: {}", e)))?;

        sqlx::query(
            "INSERT INTO signal_decisions
                (signal_id, symbol, timeframe, position_type, outcome, reason, successor_id, parent_id, signal_json, decided_at, recorded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(signal_id) DO UPDATE SET
                outcome = excluded.outcome,
                reason = excluded.reason,
                successor_id = excluded.successor_id,
                signal_json = excluded.signal_json,
                decided_at = excluded.decided_at,
                recorded_at = excluded.recorded_at",
        )
        .bind(decision.signal_id.to_string())
        .bind(&signal.symbol)
        .bind(signal.timeframe.as_str())
        .bind(signal.position_type.as_str())
        .bind(decision.outcome.as_str())
        .bind(decision.reason.as_deref())
        .bind(decision.successor_id.map(|id| id.to_string()))
        .bind(signal.lineage.map(|l| l.parent_id.to_string()))
        .bind(&signal_json)
        .bind(decision.timestamp.to_rfc3339())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        tracing::debug!(
            "Stored {} decision for signal {}",
            decision.outcome.as_str(),
            decision.signal_id
        );
        Ok(())
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(e.to_string())
        }
        other => StoreError::Database(other.to_string()),
    }
}
