use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use holdscore_core::{AppError, Result};
use holdscore_storage::models::CalculationKind;

use crate::periods::hour_floor;
use crate::points::{CalcOutcome, PointsCalculator};

/// Fires the hourly points calculation for every enabled chain and exposes
/// the manual trigger and backfill entry points.
///
/// Each fire computes the just-elapsed hour: `period_end` is the wall clock
/// truncated to the hour, `period_start` one hour earlier. Firing at the top
/// of the hour therefore always leaves a full hour of ingestion grace.
#[derive(Clone)]
pub struct PointsScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    calculator: Arc<PointsCalculator>,
    chains: Vec<String>,
    schedule: Schedule,
    state: Mutex<SchedulerState>,
}

#[derive(Default)]
struct SchedulerState {
    running: bool,
    cancel: Option<CancellationToken>,
}

impl PointsScheduler {
    pub fn new(
        calculator: Arc<PointsCalculator>,
        chains: Vec<String>,
        cron_expression: &str,
    ) -> Result<Self> {
        let schedule = parse_schedule(cron_expression)?;
        Ok(Self {
            inner: Arc::new(Inner {
                calculator,
                chains,
                schedule,
                state: Mutex::new(SchedulerState::default()),
            }),
        })
    }

    /// Start the fire loop. Starting an already-running scheduler is an
    /// error.
    pub fn start(&self) -> Result<()> {
        let mut state = lock(&self.inner.state);
        if state.running {
            return Err(AppError::Config("scheduler is already running".into()));
        }

        let cancel = CancellationToken::new();
        state.running = true;
        state.cancel = Some(cancel.clone());
        drop(state);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            run_loop(inner, cancel).await;
        });

        info!("points scheduler started");
        Ok(())
    }

    /// Stop future fires. A no-op when already stopped; in-flight
    /// calculations run to completion.
    pub fn stop(&self) {
        let mut state = lock(&self.inner.state);
        if !state.running {
            return;
        }
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        state.running = false;
        info!("points scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.state).running
    }

    /// Synchronously run the last complete hour for one chain.
    pub async fn trigger(&self, chain: &str) -> Result<CalcOutcome> {
        let period_end = hour_floor(Utc::now());
        let period_start = period_end - Duration::hours(1);

        info!(chain, period_start = %period_start, period_end = %period_end, "manual calculation triggered");
        self.inner
            .calculator
            .calculate_all(chain, period_start, period_end, CalculationKind::Normal)
            .await
    }

    /// Backfill uncalculated hour-aligned periods in `[from, to)`.
    pub async fn backfill(&self, chain: &str, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<()> {
        self.inner.calculator.backfill(chain, from, to).await
    }
}

async fn run_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    loop {
        let Some(next) = inner.schedule.upcoming(Utc).next() else {
            warn!("cron schedule has no upcoming fire time; scheduler loop exiting");
            break;
        };

        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        run_tick(&inner).await;
    }
}

/// One scheduled fire: the just-elapsed hour, one task per enabled chain.
async fn run_tick(inner: &Arc<Inner>) {
    let period_end = hour_floor(Utc::now());
    let period_start = period_end - Duration::hours(1);

    info!(period_start = %period_start, period_end = %period_end, "starting scheduled points calculation");

    let mut handles = Vec::new();
    for chain in &inner.chains {
        let calculator = inner.calculator.clone();
        let chain = chain.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = calculator
                .calculate_all(&chain, period_start, period_end, CalculationKind::Normal)
                .await
            {
                error!(chain = %chain, error = %e, "scheduled calculation failed");
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }

    info!("scheduled points calculation completed");
}

fn lock(state: &Mutex<SchedulerState>) -> MutexGuard<'_, SchedulerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Parse a cron expression, accepting the classic 5-field form by prepending
/// a seconds field.
pub(crate) fn parse_schedule(expression: &str) -> Result<Schedule> {
    let expr = expression.trim();
    let normalised = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };

    Schedule::from_str(&normalised)
        .map_err(|e| AppError::Config(format!("invalid cron expression {expression:?}: {e}")))
}
