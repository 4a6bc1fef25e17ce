use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

// ─── Sync State ─────────────────────────────────────────────────────────────

/// Durable scan cursor, one row per chain.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SyncState {
    pub id: i32,
    pub chain_name: String,
    pub last_synced_block: i64,
    pub last_confirmed_block: i64,
    pub last_sync_at: DateTime<Utc>,
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Scanner lifecycle states persisted in `SyncState.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Running,
    Stopped,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Running => "running",
            SyncStatus::Stopped => "stopped",
            SyncStatus::Error => "error",
        }
    }
}

// ─── Balances ───────────────────────────────────────────────────────────────

/// Current balance for a `(chain, address)` pair.
///
/// `balance` is a non-negative base-10 string; token amounts exceed 64 bits.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserBalance {
    pub id: i64,
    pub chain_name: String,
    pub user_address: String,
    pub balance: String,
    pub last_update_block: i64,
    pub last_update_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Upsert-ready balance (no `id` or audit columns).
#[derive(Debug, Clone)]
pub struct NewUserBalance {
    pub chain_name: String,
    pub user_address: String,
    pub balance: String,
    pub last_update_block: i64,
    pub last_update_time: DateTime<Utc>,
}

/// One signed delta applied to one address's balance by one on-chain event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BalanceChange {
    pub id: i64,
    pub chain_name: String,
    pub user_address: String,
    pub tx_hash: String,
    pub block_number: i64,
    pub block_time: DateTime<Utc>,
    pub event_type: String,
    pub amount_delta: String,
    pub balance_before: String,
    pub balance_after: String,
    pub confirmed: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert-ready balance change.
#[derive(Debug, Clone)]
pub struct NewBalanceChange {
    pub chain_name: String,
    pub user_address: String,
    pub tx_hash: String,
    pub block_number: i64,
    pub block_time: DateTime<Utc>,
    pub event_type: EventType,
    pub amount_delta: String,
    pub balance_before: String,
    pub balance_after: String,
    pub confirmed: bool,
}

/// The four recognised balance-affecting event kinds.
///
/// A plain transfer produces two changes: `TransferOut` on the sender and
/// `TransferIn` on the receiver, sharing the transaction hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Mint,
    Burn,
    TransferIn,
    TransferOut,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Mint => "mint",
            EventType::Burn => "burn",
            EventType::TransferIn => "transfer_in",
            EventType::TransferOut => "transfer_out",
        }
    }
}

// ─── Points ─────────────────────────────────────────────────────────────────

/// Accumulated points for a `(chain, address)` pair.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserPoints {
    pub id: i64,
    pub chain_name: String,
    pub user_address: String,
    pub total_points: f64,
    pub last_calc_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A sub-interval of constant balance inside a calculation period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub balance: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// One completed points calculation for one user and one period.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PointsHistory {
    pub id: i64,
    pub chain_name: String,
    pub user_address: String,
    pub calc_period_start: DateTime<Utc>,
    pub calc_period_end: DateTime<Utc>,
    pub balance_snapshot: Json<Vec<BalanceSnapshot>>,
    pub points_earned: f64,
    pub calculation_type: String,
    pub created_at: DateTime<Utc>,
}

/// Insert-ready points history record.
#[derive(Debug, Clone)]
pub struct NewPointsHistory {
    pub chain_name: String,
    pub user_address: String,
    pub calc_period_start: DateTime<Utc>,
    pub calc_period_end: DateTime<Utc>,
    pub balance_snapshot: Vec<BalanceSnapshot>,
    pub points_earned: f64,
    pub calculation_type: CalculationKind,
}

/// Whether a calculation ran on schedule or as a retrospective backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationKind {
    Normal,
    Backfill,
}

impl CalculationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationKind::Normal => "normal",
            CalculationKind::Backfill => "backfill",
        }
    }
}
