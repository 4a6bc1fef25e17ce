use async_trait::async_trait;
use chrono::{DateTime, Utc};
use holdscore_core::Result;
use sqlx::types::Json;
use sqlx::{Executor, PgPool, Postgres};

use crate::models::*;
use crate::store::{BalanceStore, PointsStore, SyncStateStore};

/// PostgreSQL-backed implementation of all store capabilities.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ─── Sync State ─────────────────────────────────────────────────────────────

#[async_trait]
impl SyncStateStore for PgStore {
    async fn init(&self, chain: &str, start_block: u64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (chain_name, last_synced_block, last_confirmed_block, last_sync_at, status)
            VALUES ($1, $2, $2, NOW(), $3)
            ON CONFLICT (chain_name) DO NOTHING
            "#,
        )
        .bind(chain)
        .bind(start_block as i64 - 1)
        .bind(SyncStatus::Running.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, chain: &str) -> Result<Option<SyncState>> {
        let state = sqlx::query_as::<_, SyncState>("SELECT * FROM sync_state WHERE chain_name = $1")
            .bind(chain)
            .fetch_optional(&self.pool)
            .await?;
        Ok(state)
    }

    async fn update(&self, state: &SyncState) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_state
            SET last_synced_block = $1,
                last_confirmed_block = $2,
                last_sync_at = $3,
                status = $4,
                error_message = $5,
                updated_at = NOW()
            WHERE chain_name = $6
            "#,
        )
        .bind(state.last_synced_block)
        .bind(state.last_confirmed_block)
        .bind(state.last_sync_at)
        .bind(&state.status)
        .bind(&state.error_message)
        .bind(&state.chain_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ─── Balances ───────────────────────────────────────────────────────────────

/// Insert one change, skipping duplicates on the idempotence key.
/// Returns the number of rows actually inserted (0 or 1).
async fn insert_change<'e, E>(executor: E, change: &NewBalanceChange) -> Result<u64>
where
    E: Executor<'e, Database = Postgres>,
{
    let res = sqlx::query(
        r#"
        INSERT INTO balance_changes (
            chain_name, user_address, tx_hash, block_number, block_time,
            event_type, amount_delta, balance_before, balance_after, confirmed
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (chain_name, tx_hash, user_address, event_type) DO NOTHING
        "#,
    )
    .bind(&change.chain_name)
    .bind(&change.user_address)
    .bind(&change.tx_hash)
    .bind(change.block_number)
    .bind(change.block_time)
    .bind(change.event_type.as_str())
    .bind(&change.amount_delta)
    .bind(&change.balance_before)
    .bind(&change.balance_after)
    .bind(change.confirmed)
    .execute(executor)
    .await?;
    Ok(res.rows_affected())
}

async fn upsert_balance_on<'e, E>(executor: E, balance: &NewUserBalance) -> Result<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO user_balances (chain_name, user_address, balance, last_update_block, last_update_time)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (chain_name, user_address) DO UPDATE SET
            balance = EXCLUDED.balance,
            last_update_block = EXCLUDED.last_update_block,
            last_update_time = EXCLUDED.last_update_time,
            updated_at = NOW()
        "#,
    )
    .bind(&balance.chain_name)
    .bind(&balance.user_address)
    .bind(&balance.balance)
    .bind(balance.last_update_block)
    .bind(balance.last_update_time)
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl BalanceStore for PgStore {
    async fn get_balance(&self, chain: &str, address: &str) -> Result<Option<UserBalance>> {
        let balance = sqlx::query_as::<_, UserBalance>(
            "SELECT * FROM user_balances WHERE chain_name = $1 AND user_address = $2",
        )
        .bind(chain)
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(balance)
    }

    async fn list_balances(
        &self,
        chain: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<UserBalance>> {
        let balances = sqlx::query_as::<_, UserBalance>(
            r#"
            SELECT * FROM user_balances
            WHERE chain_name = $1
            ORDER BY CAST(balance AS NUMERIC) DESC, user_address ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(chain)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(balances)
    }

    async fn upsert_balance(&self, balance: &NewUserBalance) -> Result<()> {
        upsert_balance_on(&self.pool, balance).await
    }

    async fn record_change(&self, change: &NewBalanceChange) -> Result<bool> {
        Ok(insert_change(&self.pool, change).await? > 0)
    }

    async fn apply_change(
        &self,
        change: &NewBalanceChange,
        balance: &NewUserBalance,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        if insert_change(&mut *tx, change).await? == 0 {
            // Duplicate event: already applied by an earlier scan of the range.
            tx.rollback().await?;
            return Ok(false);
        }
        upsert_balance_on(&mut *tx, balance).await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn get_changes(
        &self,
        chain: &str,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BalanceChange>> {
        let changes = sqlx::query_as::<_, BalanceChange>(
            r#"
            SELECT * FROM balance_changes
            WHERE chain_name = $1 AND user_address = $2
              AND block_time >= $3 AND block_time < $4
              AND confirmed = TRUE
            ORDER BY block_number ASC, id ASC
            "#,
        )
        .bind(chain)
        .bind(address)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(changes)
    }

    async fn get_changes_from_block(
        &self,
        chain: &str,
        from_block: i64,
    ) -> Result<Vec<BalanceChange>> {
        let changes = sqlx::query_as::<_, BalanceChange>(
            r#"
            SELECT * FROM balance_changes
            WHERE chain_name = $1 AND block_number >= $2
            ORDER BY block_number ASC, id ASC
            "#,
        )
        .bind(chain)
        .bind(from_block)
        .fetch_all(&self.pool)
        .await?;
        Ok(changes)
    }
}

// ─── Points ─────────────────────────────────────────────────────────────────

#[async_trait]
impl PointsStore for PgStore {
    async fn get_points(&self, chain: &str, address: &str) -> Result<Option<UserPoints>> {
        let points = sqlx::query_as::<_, UserPoints>(
            "SELECT * FROM user_points WHERE chain_name = $1 AND user_address = $2",
        )
        .bind(chain)
        .bind(address)
        .fetch_optional(&self.pool)
        .await?;
        Ok(points)
    }

    async fn list_points(&self, chain: &str, offset: i64, limit: i64) -> Result<Vec<UserPoints>> {
        let points = sqlx::query_as::<_, UserPoints>(
            r#"
            SELECT * FROM user_points
            WHERE chain_name = $1
            ORDER BY total_points DESC, user_address ASC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(chain)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(points)
    }

    async fn record_calculation(&self, history: &NewPointsHistory) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO points_history (
                chain_name, user_address, calc_period_start, calc_period_end,
                balance_snapshot, points_earned, calculation_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (chain_name, user_address, calc_period_start) DO NOTHING
            "#,
        )
        .bind(&history.chain_name)
        .bind(&history.user_address)
        .bind(history.calc_period_start)
        .bind(history.calc_period_end)
        .bind(Json(&history.balance_snapshot))
        .bind(history.points_earned)
        .bind(history.calculation_type.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            // Period already accounted for this user; adding again would
            // break total_points == sum(points_earned).
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO user_points (chain_name, user_address, total_points, last_calc_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (chain_name, user_address) DO UPDATE SET
                total_points = user_points.total_points + EXCLUDED.total_points,
                last_calc_at = EXCLUDED.last_calc_at,
                updated_at = NOW()
            "#,
        )
        .bind(&history.chain_name)
        .bind(&history.user_address)
        .bind(history.points_earned)
        .bind(history.calc_period_end)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn get_history(
        &self,
        chain: &str,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PointsHistory>> {
        let history = sqlx::query_as::<_, PointsHistory>(
            r#"
            SELECT * FROM points_history
            WHERE chain_name = $1 AND user_address = $2
              AND calc_period_start >= $3 AND calc_period_start < $4
            ORDER BY calc_period_start ASC
            "#,
        )
        .bind(chain)
        .bind(address)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(history)
    }

    async fn calculated_period_starts(
        &self,
        chain: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let rows: Vec<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT calc_period_start
            FROM points_history
            WHERE chain_name = $1
              AND calc_period_start >= $2
              AND calc_period_start < $3
            ORDER BY calc_period_start
            "#,
        )
        .bind(chain)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}
