//! Holdscore node — per-chain event scanners, the points scheduler and the
//! read-only HTTP API in one process.

mod api;

use std::sync::Arc;

use eyre::WrapErr;
use tokio_util::sync::CancellationToken;

use holdscore_chain::RpcChainClient;
use holdscore_core::{telemetry, Settings};
use holdscore_engine::{BalanceUpdater, ChainScanner, PointsCalculator, PointsScheduler};
use holdscore_storage::{self as storage, BalanceStore, PgStore, PointsStore, SyncStateStore};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let config_path = std::env::var("HOLDSCORE_CONFIG")
        .unwrap_or_else(|_| "config/holdscore.yaml".into());
    let settings = Settings::load(&config_path)
        .wrap_err_with(|| format!("failed to load settings from {config_path}"))?;

    telemetry::init(&settings.app.log_level);
    tracing::info!(app = %settings.app.name, chains = settings.chains.len(), "starting holdscore node");

    // Database
    let pool = storage::connect(&settings.database.url)
        .await
        .wrap_err("failed to connect to database")?;
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .wrap_err("failed to run migrations")?;
    tracing::info!("database ready");

    let store = Arc::new(PgStore::new(pool));
    let cancel = CancellationToken::new();
    let mut tasks = Vec::new();

    // One scanner task per configured chain.
    for chain in settings.chains.clone() {
        let client = Arc::new(
            RpcChainClient::connect(&chain.rpc_url)
                .wrap_err_with(|| format!("failed to connect to {} RPC", chain.name))?,
        );
        let updater = BalanceUpdater::new(store.clone() as Arc<dyn BalanceStore>);
        let scanner = ChainScanner::new(
            chain,
            settings.confirmation.blocks,
            client,
            store.clone() as Arc<dyn SyncStateStore>,
            updater,
        )?;

        let cancel = cancel.clone();
        tasks.push(tokio::spawn(async move {
            scanner.run(cancel).await;
        }));
    }

    // Points scheduler
    let calculator = Arc::new(PointsCalculator::new(
        store.clone() as Arc<dyn BalanceStore>,
        store.clone() as Arc<dyn PointsStore>,
        settings.points.hourly_rate,
    ));
    let chain_names: Vec<String> = settings.chains.iter().map(|c| c.name.clone()).collect();
    let scheduler = PointsScheduler::new(
        calculator,
        chain_names.clone(),
        &settings.points.cron_expression,
    )?;

    if settings.points.enabled {
        scheduler.start()?;

        if settings.points.backfill_on_startup {
            let to = holdscore_engine::periods::hour_floor(chrono::Utc::now());
            let from = to - chrono::Duration::days(settings.points.backfill_max_days as i64);
            for chain in chain_names {
                let scheduler = scheduler.clone();
                tokio::spawn(async move {
                    if let Err(e) = scheduler.backfill(&chain, from, to).await {
                        tracing::error!(chain = %chain, error = %e, "startup backfill failed");
                    }
                });
            }
        }
    } else {
        tracing::info!("points calculation is disabled");
    }

    // HTTP projection
    let mut server_task = None;
    if settings.api.enabled {
        let state = Arc::new(api::AppState {
            store: store.clone(),
            scheduler: scheduler.clone(),
        });
        let app = api::router(state);

        let addr = format!("{}:{}", settings.api.host, settings.api.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .wrap_err_with(|| format!("failed to bind {addr}"))?;
        tracing::info!("listening on http://{addr}");

        let shutdown = cancel.clone();
        server_task = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
            {
                tracing::error!(error = %e, "http server failed");
            }
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .wrap_err("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    scheduler.stop();
    cancel.cancel();

    // The HTTP server gets a bounded drain; scanners finish their in-flight
    // batch and exit at the cancelled tick.
    if let Some(server) = server_task {
        if tokio::time::timeout(std::time::Duration::from_secs(10), server)
            .await
            .is_err()
        {
            tracing::warn!("http server did not drain within 10s");
        }
    }
    for task in tasks {
        let _ = task.await;
    }

    tracing::info!("all services stopped");
    Ok(())
}
