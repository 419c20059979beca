//! Dialwave - campaign scheduler entry point

use anyhow::Result;
use dialwave_api::{create_router, AppState};
use dialwave_common::config::{Config, LoggingConfig};
use dialwave_core::dialer::{HttpCallExecutor, LoggingCallExecutor};
use dialwave_core::{
    CallExecutor, CampaignManager, CampaignScheduler, Clock, CompletionEvaluator,
    CompletionNotifier, CounterLedger, LogNotifier, OutcomeProcessor, SystemClock,
    WebhookNotifier,
};
use dialwave_storage::repository::{CampaignStore, InMemoryCampaignStore, PgCampaignStore};
use dialwave_storage::DatabasePool;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Dialwave campaign scheduler...");

    // Initialize campaign store
    let (store, db_pool): (Arc<dyn CampaignStore>, Option<DatabasePool>) =
        if config.database.backend == "memory" {
            warn!("Using in-memory campaign store; state is lost on restart");
            (Arc::new(InMemoryCampaignStore::new()), None)
        } else {
            let db_pool = DatabasePool::new(&config.database).await?;
            info!("Database connection established");

            db_pool.migrate().await?;
            info!("Database migrations completed");

            (Arc::new(PgCampaignStore::new(db_pool.clone())), Some(db_pool))
        };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Call Execution Service
    let executor: Arc<dyn CallExecutor> = match HttpCallExecutor::from_config(&config.dialer)? {
        Some(executor) => {
            info!("Dispatching calls to {:?}", config.dialer.endpoint);
            Arc::new(executor)
        }
        None => {
            warn!("No dialer endpoint configured, dispatches are only logged");
            Arc::new(LoggingCallExecutor)
        }
    };

    // Completion notifications
    let notifier: Arc<dyn CompletionNotifier> =
        match WebhookNotifier::from_config(&config.notifications)? {
            Some(notifier) => Arc::new(notifier),
            None => Arc::new(LogNotifier),
        };

    // Scheduling core
    let completion = CompletionEvaluator::new(store.clone(), notifier, clock.clone());
    let ledger = CounterLedger::new(store.clone(), completion.clone());
    let outcomes = OutcomeProcessor::new(store.clone(), ledger);
    let manager = Arc::new(CampaignManager::new(
        store.clone(),
        completion.clone(),
        clock.clone(),
    ));
    let scheduler = Arc::new(
        CampaignScheduler::new(store, executor, completion, clock.clone())
            .with_config(&config.scheduler),
    );

    // Start scheduler (ticks + dispatch workers), or only the workers for
    // manually triggered ticks
    let scheduler_handle = if config.scheduler.enabled {
        let scheduler = scheduler.clone();
        tokio::spawn(async move {
            scheduler.run().await;
        })
    } else {
        info!("Scheduler ticks disabled; use POST /api/v1/scheduler/tick");
        let workers = scheduler.spawn_dispatch_workers();
        tokio::spawn(async move {
            for worker in workers {
                let _ = worker.await;
            }
        })
    };

    // Start API server
    let state = AppState {
        manager,
        outcomes,
        scheduler,
        clock,
        db_pool,
        outcome_secret: config.webhooks.outcome_secret.clone(),
    };
    let app = create_router(state, &config.api.cors_origins);
    let bind = format!("{}:{}", config.server.bind_address, config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Starting API server on {}", bind);

    let api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    info!("Dialwave started successfully");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler_handle.abort();
    api_handle.abort();

    info!("Dialwave shutdown complete");

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},dialwave=debug", config.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
