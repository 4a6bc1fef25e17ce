use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, I256};
use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use holdscore_chain::{decode_token_log, ChainClient, DecodedLog, TokenEvent};
use holdscore_core::config::ChainSettings;
use holdscore_core::{AppError, Result};
use holdscore_storage::models::{EventType, SyncStatus};
use holdscore_storage::SyncStateStore;

use crate::balance::{BalanceUpdate, BalanceUpdater};

/// Per-chain scan loop: advances the durable cursor in bounded batches,
/// honouring the confirmation depth, and fans decoded events into the
/// balance updater.
pub struct ChainScanner {
    chain: ChainSettings,
    contract: Address,
    confirm_blocks: u64,
    client: Arc<dyn ChainClient>,
    sync_store: Arc<dyn SyncStateStore>,
    updater: BalanceUpdater,
}

impl ChainScanner {
    pub fn new(
        chain: ChainSettings,
        confirm_blocks: u64,
        client: Arc<dyn ChainClient>,
        sync_store: Arc<dyn SyncStateStore>,
        updater: BalanceUpdater,
    ) -> Result<Self> {
        let contract = chain.contract_address.parse::<Address>().map_err(|e| {
            AppError::Config(format!(
                "invalid contract address {} for chain {}: {e}",
                chain.contract_address, chain.name
            ))
        })?;

        Ok(Self {
            chain,
            contract,
            confirm_blocks,
            client,
            sync_store,
            updater,
        })
    }

    /// Run the scan loop until the cancellation token fires. One tick per
    /// `scan_interval`; a failed tick records the error state and is retried
    /// on the next tick.
    pub async fn run(self, cancel: CancellationToken) {
        if let Err(e) = self
            .sync_store
            .init(&self.chain.name, self.chain.start_block)
            .await
        {
            error!(chain = %self.chain.name, error = %e, "failed to initialise sync state");
            return;
        }

        info!(
            chain = %self.chain.name,
            contract = %self.contract,
            start_block = self.chain.start_block,
            "starting chain scanner"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(self.chain.scan_interval.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(chain = %self.chain.name, "chain scanner cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.scan_once().await {
                        error!(chain = %self.chain.name, error = %e, "scan tick failed");
                        if let Err(e) = self.mark_error(&e.to_string()).await {
                            error!(chain = %self.chain.name, error = %e, "failed to persist error state");
                        }
                    }
                }
            }
        }
    }

    /// Scan one bounded batch of confirmed blocks and advance the cursor.
    ///
    /// The cursor only moves after the whole batch is processed; a batch-level
    /// failure leaves it unchanged so the batch is retried, which is safe
    /// because event application is idempotent.
    pub async fn scan_once(&self) -> Result<()> {
        let latest = self.client.latest_block_number().await?;

        let mut state = self
            .sync_store
            .get(&self.chain.name)
            .await?
            .ok_or_else(|| {
                AppError::Config(format!("sync state not initialised for {}", self.chain.name))
            })?;

        let Some((from, to)) = scan_window(
            state.last_synced_block,
            latest,
            self.confirm_blocks,
            self.chain.batch_size,
        ) else {
            return Ok(());
        };

        debug!(
            chain = %self.chain.name,
            from,
            to,
            latest,
            confirm_blocks = self.confirm_blocks,
            "scanning blocks"
        );

        let mut logs = self.client.logs_in_range(self.contract, from, to).await?;
        logs.sort_by_key(|l| (l.block_number.unwrap_or(0), l.log_index.unwrap_or(0)));

        if !logs.is_empty() {
            info!(chain = %self.chain.name, count = logs.len(), from, to, "found events");
        }

        // Block timestamps are cached per batch; each block is looked up once.
        let mut block_times: HashMap<u64, DateTime<Utc>> = HashMap::new();

        for log in &logs {
            let Some(decoded) = decode_token_log(log) else {
                continue;
            };

            let block_time = match block_times.get(&decoded.block_number) {
                Some(t) => *t,
                None => {
                    let t = self.client.block_timestamp(decoded.block_number).await?;
                    block_times.insert(decoded.block_number, t);
                    t
                }
            };

            if let Err(e) = self.apply_decoded(&decoded, block_time).await {
                // Per-log failures do not abort the batch.
                error!(
                    chain = %self.chain.name,
                    tx = %decoded.transaction_hash,
                    error = %e,
                    "failed to process log"
                );
            }
        }

        state.last_synced_block = to as i64;
        state.last_confirmed_block = to as i64;
        state.last_sync_at = Utc::now();
        state.status = SyncStatus::Running.as_str().to_string();
        state.error_message = None;
        self.sync_store.update(&state).await?;

        Ok(())
    }

    /// Turn one decoded log into one or two signed balance updates.
    async fn apply_decoded(&self, decoded: &DecodedLog, block_time: DateTime<Utc>) -> Result<()> {
        let update = |address: Address, event_type: EventType, delta: I256| BalanceUpdate {
            chain_name: self.chain.name.clone(),
            user_address: format!("{address:#x}"),
            tx_hash: decoded.transaction_hash.clone(),
            block_number: decoded.block_number as i64,
            block_time,
            event_type,
            amount_delta: delta,
        };

        match decoded.event {
            TokenEvent::Minted { to, amount } => {
                let delta = signed(amount)?;
                self.updater.apply(&update(to, EventType::Mint, delta)).await?;
            }
            TokenEvent::Burned { from, amount } => {
                let delta = signed(amount)?;
                self.updater.apply(&update(from, EventType::Burn, -delta)).await?;
            }
            TokenEvent::Transferred { from, to, value } => {
                let delta = signed(value)?;
                self.updater
                    .apply(&update(from, EventType::TransferOut, -delta))
                    .await?;
                self.updater
                    .apply(&update(to, EventType::TransferIn, delta))
                    .await?;
            }
        }
        Ok(())
    }

    async fn mark_error(&self, message: &str) -> Result<()> {
        if let Some(mut state) = self.sync_store.get(&self.chain.name).await? {
            state.status = SyncStatus::Error.as_str().to_string();
            state.error_message = Some(message.to_string());
            self.sync_store.update(&state).await?;
        }
        Ok(())
    }
}

fn signed(amount: alloy::primitives::U256) -> Result<I256> {
    I256::try_from(amount).map_err(|e| AppError::Decode(format!("amount out of range: {e}")))
}

/// Compute the inclusive block range for the next batch, or `None` when
/// there is nothing confirmed left to scan.
pub fn scan_window(
    last_synced: i64,
    latest: u64,
    confirm_blocks: u64,
    batch_size: u64,
) -> Option<(u64, u64)> {
    let from = last_synced.saturating_add(1).max(0) as u64;
    let to = latest.checked_sub(confirm_blocks)?;
    if from > to {
        return None;
    }
    let to = to.min(from.saturating_add(batch_size.saturating_sub(1)));
    Some((from, to))
}
