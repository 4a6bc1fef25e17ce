use async_trait::async_trait;
use chrono::{DateTime, Utc};
use holdscore_core::Result;

use crate::models::*;

/// Durable scan cursor per chain.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Insert the cursor for a chain if absent, starting one block before
    /// `start_block` with status `running`.
    async fn init(&self, chain: &str, start_block: u64) -> Result<()>;

    async fn get(&self, chain: &str) -> Result<Option<SyncState>>;

    /// Persist the cursor. Durable before the next scan uses the new value.
    async fn update(&self, state: &SyncState) -> Result<()>;
}

/// Current balances plus the append-only change log.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn get_balance(&self, chain: &str, address: &str) -> Result<Option<UserBalance>>;

    /// Balances for a chain ordered by numeric balance descending.
    async fn list_balances(&self, chain: &str, offset: i64, limit: i64)
        -> Result<Vec<UserBalance>>;

    async fn upsert_balance(&self, balance: &NewUserBalance) -> Result<()>;

    /// Append one change. Returns `false` when the idempotence key
    /// `(chain, tx_hash, address, event_type)` already exists.
    async fn record_change(&self, change: &NewBalanceChange) -> Result<bool>;

    /// Append one change and upsert the matching balance in a single
    /// transaction, so readers never observe the balance diverging from the
    /// tail of the change log. Returns `false` (and changes nothing) when the
    /// change is a duplicate.
    async fn apply_change(
        &self,
        change: &NewBalanceChange,
        balance: &NewUserBalance,
    ) -> Result<bool>;

    /// Confirmed changes for one address with `block_time` in `[from, to)`,
    /// ordered by `(block_number, id)`.
    async fn get_changes(
        &self,
        chain: &str,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BalanceChange>>;

    /// All changes on a chain from `from_block` onwards, ordered by
    /// `(block_number, id)`. Used by balance rebuild.
    async fn get_changes_from_block(
        &self,
        chain: &str,
        from_block: i64,
    ) -> Result<Vec<BalanceChange>>;
}

/// Accumulated points plus the append-only calculation history.
#[async_trait]
pub trait PointsStore: Send + Sync {
    async fn get_points(&self, chain: &str, address: &str) -> Result<Option<UserPoints>>;

    /// Points for a chain ordered by `total_points` descending (leaderboard).
    async fn list_points(&self, chain: &str, offset: i64, limit: i64) -> Result<Vec<UserPoints>>;

    /// Insert one history row and add its points to the user's running total
    /// in a single transaction. Returns `false` (and changes nothing) when
    /// the period `(chain, address, calc_period_start)` was already recorded,
    /// which keeps accounting at-most-once per hour.
    async fn record_calculation(&self, history: &NewPointsHistory) -> Result<bool>;

    /// History rows for one address with `calc_period_start` in `[from, to)`,
    /// oldest first.
    async fn get_history(
        &self,
        chain: &str,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PointsHistory>>;

    /// Distinct period starts already calculated for a chain in `[from, to)`.
    async fn calculated_period_starts(
        &self,
        chain: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>>;
}
