use std::sync::Arc;

use alloy::primitives::I256;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use holdscore_core::Result;
use holdscore_storage::models::{EventType, NewBalanceChange, NewUserBalance};
use holdscore_storage::BalanceStore;

use crate::units::parse_amount;

/// One signed delta to apply to one address, attributable to one event.
#[derive(Debug, Clone)]
pub struct BalanceUpdate {
    pub chain_name: String,
    pub user_address: String,
    pub tx_hash: String,
    pub block_number: i64,
    pub block_time: DateTime<Utc>,
    pub event_type: EventType,
    pub amount_delta: I256,
}

/// Applies decoded token events to the balance store.
#[derive(Clone)]
pub struct BalanceUpdater {
    store: Arc<dyn BalanceStore>,
}

impl BalanceUpdater {
    pub fn new(store: Arc<dyn BalanceStore>) -> Self {
        Self { store }
    }

    /// Apply one delta: record the change and upsert the new balance in a
    /// single store transaction. Returns `false` when the event was already
    /// applied (same chain, tx hash, address and event type), making range
    /// re-scans no-ops.
    pub async fn apply(&self, update: &BalanceUpdate) -> Result<bool> {
        let address = update.user_address.to_lowercase();

        let before = match self.store.get_balance(&update.chain_name, &address).await? {
            Some(current) => parse_amount(&current.balance)?,
            None => I256::ZERO,
        };

        let (after, clamped) = settle(before, update.amount_delta);
        if clamped {
            // Indicates an out-of-order or missing upstream event; the delta
            // is still recorded with its original value.
            warn!(
                chain = %update.chain_name,
                user = %address,
                before = %before,
                delta = %update.amount_delta,
                "delta would take balance negative; clamping to zero"
            );
        }

        let change = NewBalanceChange {
            chain_name: update.chain_name.clone(),
            user_address: address.clone(),
            tx_hash: update.tx_hash.clone(),
            block_number: update.block_number,
            block_time: update.block_time,
            event_type: update.event_type,
            amount_delta: update.amount_delta.to_string(),
            balance_before: before.to_string(),
            balance_after: after.to_string(),
            // The scanner already waited out the confirmation depth.
            confirmed: true,
        };
        let balance = NewUserBalance {
            chain_name: update.chain_name.clone(),
            user_address: address.clone(),
            balance: after.to_string(),
            last_update_block: update.block_number,
            last_update_time: update.block_time,
        };

        let applied = self.store.apply_change(&change, &balance).await?;
        if applied {
            debug!(
                chain = %update.chain_name,
                user = %address,
                before = %before,
                after = %after,
                delta = %update.amount_delta,
                "balance updated"
            );
        } else {
            debug!(
                chain = %update.chain_name,
                tx = %update.tx_hash,
                user = %address,
                event = update.event_type.as_str(),
                "duplicate event ignored"
            );
        }
        Ok(applied)
    }

    /// Re-derive an address's current balance by summing all of its signed
    /// deltas from `from_block` onwards and upserting the result. Reads the
    /// change log only; history is never modified.
    pub async fn rebuild(&self, chain: &str, address: &str, from_block: i64) -> Result<()> {
        let address = address.to_lowercase();
        let changes = self.store.get_changes_from_block(chain, from_block).await?;

        let mut balance = I256::ZERO;
        let mut last_block = 0i64;
        let mut last_time: Option<DateTime<Utc>> = None;
        let mut processed = 0usize;

        for change in changes
            .iter()
            .filter(|c| c.user_address.eq_ignore_ascii_case(&address))
        {
            let delta = parse_amount(&change.amount_delta)?;
            balance = balance.saturating_add(delta);
            last_block = change.block_number;
            last_time = Some(change.block_time);
            processed += 1;
        }

        let Some(last_time) = last_time else {
            info!(chain, user = %address, from_block, "no changes found; nothing to rebuild");
            return Ok(());
        };

        if balance.is_negative() {
            warn!(chain, user = %address, balance = %balance, "rebuilt balance is negative; clamping to zero");
            balance = I256::ZERO;
        }

        self.store
            .upsert_balance(&NewUserBalance {
                chain_name: chain.to_string(),
                user_address: address.clone(),
                balance: balance.to_string(),
                last_update_block: last_block,
                last_update_time: last_time,
            })
            .await?;

        info!(
            chain,
            user = %address,
            balance = %balance,
            processed,
            "balance rebuilt from change log"
        );
        Ok(())
    }
}

/// Add a signed delta to a balance, clamping the result at zero.
/// Returns the new balance and whether clamping occurred.
pub(crate) fn settle(before: I256, delta: I256) -> (I256, bool) {
    let after = before.saturating_add(delta);
    if after.is_negative() {
        (I256::ZERO, true)
    } else {
        (after, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(v: i64) -> I256 {
        I256::try_from(v).unwrap()
    }

    #[test]
    fn settle_adds_and_subtracts() {
        assert_eq!(settle(amount(100), amount(40)), (amount(140), false));
        assert_eq!(settle(amount(100), amount(-40)), (amount(60), false));
        assert_eq!(settle(amount(100), amount(-100)), (amount(0), false));
    }

    #[test]
    fn settle_clamps_negative_results() {
        let (after, clamped) = settle(amount(10), amount(-25));
        assert_eq!(after, I256::ZERO);
        assert!(clamped);

        let (after, clamped) = settle(I256::ZERO, amount(-1));
        assert_eq!(after, I256::ZERO);
        assert!(clamped);
    }
}
