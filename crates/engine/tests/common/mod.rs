//! In-memory store fakes and a scripted chain client for engine tests.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy::primitives::{Address, B256, I256, LogData, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use holdscore_chain::{ChainClient, LoyaltyToken};
use holdscore_core::Result;
use holdscore_storage::models::*;
use holdscore_storage::{BalanceStore, PointsStore, SyncStateStore};

// ─── Memory Store ───────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    sync: HashMap<String, SyncState>,
    balances: HashMap<(String, String), UserBalance>,
    changes: Vec<BalanceChange>,
    points: HashMap<(String, String), UserPoints>,
    history: Vec<PointsHistory>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn has_change(&self, change: &NewBalanceChange) -> bool {
        self.changes.iter().any(|c| {
            c.chain_name == change.chain_name
                && c.tx_hash == change.tx_hash
                && c.user_address == change.user_address
                && c.event_type == change.event_type.as_str()
        })
    }

    fn push_change(&mut self, change: &NewBalanceChange) {
        let id = self.next_id();
        self.changes.push(BalanceChange {
            id,
            chain_name: change.chain_name.clone(),
            user_address: change.user_address.clone(),
            tx_hash: change.tx_hash.clone(),
            block_number: change.block_number,
            block_time: change.block_time,
            event_type: change.event_type.as_str().to_string(),
            amount_delta: change.amount_delta.clone(),
            balance_before: change.balance_before.clone(),
            balance_after: change.balance_after.clone(),
            confirmed: change.confirmed,
            created_at: Utc::now(),
        });
    }

    fn store_balance(&mut self, balance: &NewUserBalance) {
        let key = (balance.chain_name.clone(), balance.user_address.clone());
        let id = self.next_id();
        let entry = self.balances.entry(key).or_insert_with(|| UserBalance {
            id,
            chain_name: balance.chain_name.clone(),
            user_address: balance.user_address.clone(),
            balance: "0".into(),
            last_update_block: 0,
            last_update_time: balance.last_update_time,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        entry.balance = balance.balance.clone();
        entry.last_update_block = balance.last_update_block;
        entry.last_update_time = balance.last_update_time;
        entry.updated_at = Utc::now();
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn change_count(&self) -> usize {
        self.inner.lock().unwrap().changes.len()
    }

    pub fn history_count(&self) -> usize {
        self.inner.lock().unwrap().history.len()
    }

    /// Check `UserBalance == clamp₀(Σ amount_delta)` for one address.
    pub fn balance_matches_change_log(&self, chain: &str, address: &str) -> bool {
        let state = self.inner.lock().unwrap();
        let sum = state
            .changes
            .iter()
            .filter(|c| c.chain_name == chain && c.user_address == address && c.confirmed)
            .fold(I256::ZERO, |acc, c| {
                acc + I256::from_dec_str(&c.amount_delta).unwrap()
            });
        let expected = if sum.is_negative() { I256::ZERO } else { sum };
        let stored = state
            .balances
            .get(&(chain.to_string(), address.to_string()))
            .map(|b| b.balance.clone())
            .unwrap_or_else(|| "0".into());
        I256::from_dec_str(&stored).unwrap() == expected
    }

    /// Check `UserPoints.total_points == Σ points_earned` for one address.
    pub fn points_match_history(&self, chain: &str, address: &str) -> bool {
        let state = self.inner.lock().unwrap();
        let sum: f64 = state
            .history
            .iter()
            .filter(|h| h.chain_name == chain && h.user_address == address)
            .map(|h| h.points_earned)
            .sum();
        let total = state
            .points
            .get(&(chain.to_string(), address.to_string()))
            .map(|p| p.total_points)
            .unwrap_or(0.0);
        (total - sum).abs() <= 1e-9 * (state.history.len().max(1) as f64)
    }
}

#[async_trait]
impl SyncStateStore for MemoryStore {
    async fn init(&self, chain: &str, start_block: u64) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        if !state.sync.contains_key(chain) {
            let id = state.next_id() as i32;
            state.sync.insert(
                chain.to_string(),
                SyncState {
                    id,
                    chain_name: chain.to_string(),
                    last_synced_block: start_block as i64 - 1,
                    last_confirmed_block: start_block as i64 - 1,
                    last_sync_at: Utc::now(),
                    status: SyncStatus::Running.as_str().to_string(),
                    error_message: None,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
            );
        }
        Ok(())
    }

    async fn get(&self, chain: &str) -> Result<Option<SyncState>> {
        Ok(self.inner.lock().unwrap().sync.get(chain).cloned())
    }

    async fn update(&self, update: &SyncState) -> Result<()> {
        let mut state = self.inner.lock().unwrap();
        if let Some(existing) = state.sync.get_mut(&update.chain_name) {
            existing.last_synced_block = update.last_synced_block;
            existing.last_confirmed_block = update.last_confirmed_block;
            existing.last_sync_at = update.last_sync_at;
            existing.status = update.status.clone();
            existing.error_message = update.error_message.clone();
            existing.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl BalanceStore for MemoryStore {
    async fn get_balance(&self, chain: &str, address: &str) -> Result<Option<UserBalance>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .balances
            .get(&(chain.to_string(), address.to_string()))
            .cloned())
    }

    async fn list_balances(
        &self,
        chain: &str,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<UserBalance>> {
        let state = self.inner.lock().unwrap();
        let mut balances: Vec<UserBalance> = state
            .balances
            .values()
            .filter(|b| b.chain_name == chain)
            .cloned()
            .collect();
        balances.sort_by(|a, b| {
            let left = I256::from_dec_str(&b.balance).unwrap();
            let right = I256::from_dec_str(&a.balance).unwrap();
            left.cmp(&right)
                .then_with(|| a.user_address.cmp(&b.user_address))
        });
        Ok(balances
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn upsert_balance(&self, balance: &NewUserBalance) -> Result<()> {
        self.inner.lock().unwrap().store_balance(balance);
        Ok(())
    }

    async fn record_change(&self, change: &NewBalanceChange) -> Result<bool> {
        let mut state = self.inner.lock().unwrap();
        if state.has_change(change) {
            return Ok(false);
        }
        state.push_change(change);
        Ok(true)
    }

    async fn apply_change(
        &self,
        change: &NewBalanceChange,
        balance: &NewUserBalance,
    ) -> Result<bool> {
        let mut state = self.inner.lock().unwrap();
        if state.has_change(change) {
            return Ok(false);
        }
        state.push_change(change);
        state.store_balance(balance);
        Ok(true)
    }

    async fn get_changes(
        &self,
        chain: &str,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BalanceChange>> {
        let state = self.inner.lock().unwrap();
        let mut changes: Vec<BalanceChange> = state
            .changes
            .iter()
            .filter(|c| {
                c.chain_name == chain
                    && c.user_address == address
                    && c.confirmed
                    && c.block_time >= from
                    && c.block_time < to
            })
            .cloned()
            .collect();
        changes.sort_by_key(|c| (c.block_number, c.id));
        Ok(changes)
    }

    async fn get_changes_from_block(
        &self,
        chain: &str,
        from_block: i64,
    ) -> Result<Vec<BalanceChange>> {
        let state = self.inner.lock().unwrap();
        let mut changes: Vec<BalanceChange> = state
            .changes
            .iter()
            .filter(|c| c.chain_name == chain && c.block_number >= from_block)
            .cloned()
            .collect();
        changes.sort_by_key(|c| (c.block_number, c.id));
        Ok(changes)
    }
}

#[async_trait]
impl PointsStore for MemoryStore {
    async fn get_points(&self, chain: &str, address: &str) -> Result<Option<UserPoints>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .points
            .get(&(chain.to_string(), address.to_string()))
            .cloned())
    }

    async fn list_points(&self, chain: &str, offset: i64, limit: i64) -> Result<Vec<UserPoints>> {
        let state = self.inner.lock().unwrap();
        let mut points: Vec<UserPoints> = state
            .points
            .values()
            .filter(|p| p.chain_name == chain)
            .cloned()
            .collect();
        points.sort_by(|a, b| {
            b.total_points
                .partial_cmp(&a.total_points)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.user_address.cmp(&b.user_address))
        });
        Ok(points
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn record_calculation(&self, history: &NewPointsHistory) -> Result<bool> {
        let mut state = self.inner.lock().unwrap();
        let duplicate = state.history.iter().any(|h| {
            h.chain_name == history.chain_name
                && h.user_address == history.user_address
                && h.calc_period_start == history.calc_period_start
        });
        if duplicate {
            return Ok(false);
        }

        let id = state.next_id();
        state.history.push(PointsHistory {
            id,
            chain_name: history.chain_name.clone(),
            user_address: history.user_address.clone(),
            calc_period_start: history.calc_period_start,
            calc_period_end: history.calc_period_end,
            balance_snapshot: holdscore_storage::Json(history.balance_snapshot.clone()),
            points_earned: history.points_earned,
            calculation_type: history.calculation_type.as_str().to_string(),
            created_at: Utc::now(),
        });

        let id = state.next_id();
        let entry = state
            .points
            .entry((history.chain_name.clone(), history.user_address.clone()))
            .or_insert_with(|| UserPoints {
                id,
                chain_name: history.chain_name.clone(),
                user_address: history.user_address.clone(),
                total_points: 0.0,
                last_calc_at: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            });
        entry.total_points += history.points_earned;
        entry.last_calc_at = Some(history.calc_period_end);
        entry.updated_at = Utc::now();
        Ok(true)
    }

    async fn get_history(
        &self,
        chain: &str,
        address: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PointsHistory>> {
        let state = self.inner.lock().unwrap();
        let mut history: Vec<PointsHistory> = state
            .history
            .iter()
            .filter(|h| {
                h.chain_name == chain
                    && h.user_address == address
                    && h.calc_period_start >= from
                    && h.calc_period_start < to
            })
            .cloned()
            .collect();
        history.sort_by_key(|h| h.calc_period_start);
        Ok(history)
    }

    async fn calculated_period_starts(
        &self,
        chain: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        let state = self.inner.lock().unwrap();
        let mut starts: Vec<DateTime<Utc>> = state
            .history
            .iter()
            .filter(|h| {
                h.chain_name == chain && h.calc_period_start >= from && h.calc_period_start < to
            })
            .map(|h| h.calc_period_start)
            .collect();
        starts.sort();
        starts.dedup();
        Ok(starts)
    }
}

// ─── Fake Chain ─────────────────────────────────────────────────────────────

/// Scripted `ChainClient`: tests append logs and set block timestamps.
#[derive(Default)]
pub struct FakeChain {
    inner: Mutex<FakeChainState>,
}

#[derive(Default)]
struct FakeChainState {
    latest: u64,
    logs: Vec<Log>,
    block_times: HashMap<u64, DateTime<Utc>>,
}

impl FakeChain {
    pub fn new(latest: u64) -> Self {
        Self {
            inner: Mutex::new(FakeChainState {
                latest,
                ..Default::default()
            }),
        }
    }

    pub fn set_latest(&self, latest: u64) {
        self.inner.lock().unwrap().latest = latest;
    }

    pub fn set_block_time(&self, block: u64, time: DateTime<Utc>) {
        self.inner.lock().unwrap().block_times.insert(block, time);
    }

    pub fn push_log(&self, log: Log) {
        self.inner.lock().unwrap().logs.push(log);
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn latest_block_number(&self) -> Result<u64> {
        Ok(self.inner.lock().unwrap().latest)
    }

    async fn logs_in_range(
        &self,
        contract: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .logs
            .iter()
            .filter(|l| {
                l.inner.address == contract
                    && l.block_number
                        .map(|b| b >= from_block && b <= to_block)
                        .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<DateTime<Utc>> {
        self.inner
            .lock()
            .unwrap()
            .block_times
            .get(&block_number)
            .copied()
            .ok_or_else(|| {
                holdscore_core::AppError::Rpc(format!("block {block_number} not found"))
            })
    }
}

// ─── Log builders ───────────────────────────────────────────────────────────

fn build_log(
    contract: Address,
    block: u64,
    log_index: u64,
    topics: Vec<B256>,
    data: Vec<u8>,
) -> Log {
    let mut tx_bytes = [0u8; 32];
    tx_bytes[..8].copy_from_slice(&block.to_be_bytes());
    tx_bytes[8..16].copy_from_slice(&log_index.to_be_bytes());

    Log {
        inner: alloy::primitives::Log {
            address: contract,
            data: LogData::new_unchecked(topics, data.into()),
        },
        block_hash: None,
        block_number: Some(block),
        block_timestamp: None,
        transaction_hash: Some(B256::from(tx_bytes)),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

fn word(value: U256) -> Vec<u8> {
    value.to_be_bytes::<32>().to_vec()
}

pub fn mint_log(contract: Address, block: u64, log_index: u64, to: Address, amount: U256) -> Log {
    let mut data = word(amount);
    data.extend(word(U256::ZERO));
    build_log(
        contract,
        block,
        log_index,
        vec![LoyaltyToken::TokenMinted::SIGNATURE_HASH, to.into_word()],
        data,
    )
}

pub fn burn_log(contract: Address, block: u64, log_index: u64, from: Address, amount: U256) -> Log {
    let mut data = word(amount);
    data.extend(word(U256::ZERO));
    build_log(
        contract,
        block,
        log_index,
        vec![LoyaltyToken::TokenBurned::SIGNATURE_HASH, from.into_word()],
        data,
    )
}

pub fn transfer_log(
    contract: Address,
    block: u64,
    log_index: u64,
    from: Address,
    to: Address,
    value: U256,
) -> Log {
    build_log(
        contract,
        block,
        log_index,
        vec![
            LoyaltyToken::Transfer::SIGNATURE_HASH,
            from.into_word(),
            to.into_word(),
        ],
        word(value),
    )
}
