use std::sync::Arc;

use alloy::primitives::I256;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use holdscore_core::{AppError, Result};
use holdscore_storage::models::{
    BalanceChange, BalanceSnapshot, CalculationKind, NewPointsHistory,
};
use holdscore_storage::{BalanceStore, PointsStore};

use crate::periods::missing_period_starts;
use crate::units::{parse_amount, whole_tokens};

/// How far before a period to look for the opening balance when the period
/// itself contains no changes.
const LOOKBACK_HOURS: i64 = 24;

/// Upper bound on holders processed per batch run.
const MAX_HOLDERS_PER_RUN: i64 = 10_000;

/// Outcome of a batch calculation over a chain's holders.
#[derive(Debug, Clone, Copy)]
pub struct CalcOutcome {
    pub succeeded: u32,
    pub failed: u32,
}

/// Time-weighted points calculator.
///
/// Points for a period are the integral of balance × rate over the period's
/// sub-intervals of constant balance. Balances stay exact until the final
/// multiplication by the rate, which is done in double precision.
pub struct PointsCalculator {
    balances: Arc<dyn BalanceStore>,
    points: Arc<dyn PointsStore>,
    hourly_rate: f64,
}

impl PointsCalculator {
    pub fn new(
        balances: Arc<dyn BalanceStore>,
        points: Arc<dyn PointsStore>,
        hourly_rate: f64,
    ) -> Self {
        Self {
            balances,
            points,
            hourly_rate,
        }
    }

    /// Compute and persist the points one user earned in `[period_start,
    /// period_end)`. Recording is at-most-once per period: recomputing an
    /// already-recorded period changes nothing.
    pub async fn calculate(
        &self,
        chain: &str,
        address: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        kind: CalculationKind,
    ) -> Result<f64> {
        let address = address.to_lowercase();

        let changes = self
            .balances
            .get_changes(chain, &address, period_start, period_end)
            .await?;

        if changes.is_empty() {
            // No movement inside the period: the balance held at the start is
            // the most recent change within the look-back window.
            let earlier = self
                .balances
                .get_changes(
                    chain,
                    &address,
                    period_start - Duration::hours(LOOKBACK_HOURS),
                    period_start,
                )
                .await?;

            let Some(last) = earlier.last() else {
                return Ok(0.0);
            };

            let balance = parse_amount(&last.balance_after)?;
            let points = rated(&balance, period_start, period_end, self.hourly_rate);
            let snapshot = if balance > I256::ZERO {
                vec![BalanceSnapshot {
                    balance: last.balance_after.clone(),
                    start_time: period_start,
                    end_time: period_end,
                }]
            } else {
                Vec::new()
            };

            self.record(chain, &address, period_start, period_end, snapshot, points, kind)
                .await?;
            return Ok(points);
        }

        let (points, snapshot) = integrate(&changes, period_start, period_end, self.hourly_rate)?;
        self.record(chain, &address, period_start, period_end, snapshot, points, kind)
            .await?;

        info!(
            chain,
            user = %address,
            period_start = %period_start,
            period_end = %period_end,
            points,
            "points calculated"
        );
        Ok(points)
    }

    /// Run `calculate` for every address holding a balance on the chain.
    /// Per-user failures are counted; the batch fails only if every user
    /// failed.
    pub async fn calculate_all(
        &self,
        chain: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        kind: CalculationKind,
    ) -> Result<CalcOutcome> {
        let holders = self
            .balances
            .list_balances(chain, 0, MAX_HOLDERS_PER_RUN)
            .await?;

        info!(
            chain,
            holders = holders.len(),
            period_start = %period_start,
            period_end = %period_end,
            "calculating points for all holders"
        );

        let mut outcome = CalcOutcome {
            succeeded: 0,
            failed: 0,
        };
        for holder in &holders {
            match self
                .calculate(chain, &holder.user_address, period_start, period_end, kind)
                .await
            {
                Ok(_) => outcome.succeeded += 1,
                Err(e) => {
                    error!(
                        chain,
                        user = %holder.user_address,
                        error = %e,
                        "points calculation failed"
                    );
                    outcome.failed += 1;
                }
            }
        }

        info!(
            chain,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "points calculation batch completed"
        );

        if outcome.failed > 0 && outcome.succeeded == 0 {
            return Err(AppError::Other(eyre::eyre!(
                "all {} holder calculations failed for chain {chain}",
                outcome.failed
            )));
        }
        Ok(outcome)
    }

    /// Calculate every hour-aligned period in `[from, to)` that has no
    /// history row yet. Already-computed hours are skipped, so repeating a
    /// backfill over the same window is a no-op.
    pub async fn backfill(
        &self,
        chain: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<()> {
        info!(chain, from = %from, to = %to, "starting points backfill");

        let calculated = self.points.calculated_period_starts(chain, from, to).await?;
        let missing = missing_period_starts(&calculated, from, to);

        if missing.is_empty() {
            info!(chain, "no uncalculated periods found");
            return Ok(());
        }

        info!(chain, periods = missing.len(), "backfilling uncalculated periods");

        for period_start in missing {
            let period_end = (period_start + Duration::hours(1)).min(to);
            if let Err(e) = self
                .calculate_all(chain, period_start, period_end, CalculationKind::Backfill)
                .await
            {
                error!(chain, period = %period_start, error = %e, "backfill period failed");
            }
        }

        info!(chain, "points backfill completed");
        Ok(())
    }

    async fn record(
        &self,
        chain: &str,
        address: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        snapshot: Vec<BalanceSnapshot>,
        points: f64,
        kind: CalculationKind,
    ) -> Result<()> {
        let recorded = self
            .points
            .record_calculation(&NewPointsHistory {
                chain_name: chain.to_string(),
                user_address: address.to_string(),
                calc_period_start: period_start,
                calc_period_end: period_end,
                balance_snapshot: snapshot,
                points_earned: points,
                calculation_type: kind,
            })
            .await?;

        if !recorded {
            debug!(
                chain,
                user = %address,
                period_start = %period_start,
                "period already recorded; skipping"
            );
        }
        Ok(())
    }
}

/// Walk the period's changes and integrate balance × rate over the resulting
/// sub-intervals of constant balance.
///
/// A change at time `t` closes the interval `[prev, t)` at the pre-change
/// balance; the post-change balance applies from `t` on. Changes exactly at
/// the period start update the opening balance without contributing time.
/// Zero-balance intervals contribute nothing and are left out of the
/// snapshot.
pub(crate) fn integrate(
    changes: &[BalanceChange],
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    rate: f64,
) -> Result<(f64, Vec<BalanceSnapshot>)> {
    let mut current_balance = match changes.first() {
        Some(first) if first.block_time > period_start => parse_amount(&first.balance_before)?,
        _ => I256::ZERO,
    };
    let mut current_time = period_start;
    let mut total = 0.0;
    let mut snapshots = Vec::new();

    for change in changes {
        let change_time = change.block_time;

        if change_time < period_start {
            current_balance = parse_amount(&change.balance_after)?;
            continue;
        }
        if change_time >= period_end {
            break;
        }

        if change_time > current_time {
            total += rated(&current_balance, current_time, change_time, rate);
            if current_balance > I256::ZERO {
                snapshots.push(BalanceSnapshot {
                    balance: current_balance.to_string(),
                    start_time: current_time,
                    end_time: change_time,
                });
            }
        }

        current_balance = parse_amount(&change.balance_after)?;
        current_time = change_time;
    }

    if current_time < period_end && current_balance > I256::ZERO {
        total += rated(&current_balance, current_time, period_end, rate);
        snapshots.push(BalanceSnapshot {
            balance: current_balance.to_string(),
            start_time: current_time,
            end_time: period_end,
        });
    }

    Ok((total, snapshots))
}

/// Points earned holding `balance` from `from` to `to` at `rate` per whole
/// token per hour.
fn rated(balance: &I256, from: DateTime<Utc>, to: DateTime<Utc>, rate: f64) -> f64 {
    if *balance <= I256::ZERO {
        return 0.0;
    }
    whole_tokens(balance) * rate * hours_between(from, to)
}

fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 3600.0
}
