mod apply;
mod config;
mod db;
mod errors;
mod jobs;
mod matching;
mod models;
mod queue;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::apply::chrome::{ChromeSessions, ChromeSettings};
use crate::apply::fields::SelectorTable;
use crate::apply::filler::FormFiller;
use crate::apply::locator::FieldLocator;
use crate::apply::session::SessionManager;
use crate::config::{Config, QueueBackend};
use crate::db::create_pool;
use crate::jobs::JobSearch;
use crate::queue::memory::MemoryTaskStore;
use crate::queue::postgres::PgTaskStore;
use crate::queue::store::TaskStore;
use crate::queue::worker::{spawn_consumers, ConsumerSettings, QueueConsumer};
use crate::queue::ApplicationQueue;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting autoapply API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the task store
    let store: Arc<dyn TaskStore> = match config.queue_backend {
        QueueBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres queue backend")?;
            let db = create_pool(database_url, config.queue_consumers as u32 + 5).await?;
            Arc::new(PgTaskStore::new(db))
        }
        QueueBackend::Memory => {
            warn!("Using the in-memory queue backend; queued tasks are lost on restart");
            Arc::new(MemoryTaskStore::new())
        }
    };
    let queue = ApplicationQueue::new(store);

    // Initialize job search providers (each optional)
    let jobs = JobSearch::from_config(&config)?;

    // Initialize browser sessions and the form filler
    let sessions = Arc::new(SessionManager::new(Arc::new(ChromeSessions::new(
        ChromeSettings {
            executable: config.chrome_executable.clone(),
            headless: config.browser_headless,
        },
    ))));
    let mut selectors = SelectorTable::default();
    for (field, patterns) in &config.extra_selectors {
        info!("Adding {} extra selector(s) for '{field}'", patterns.len());
        selectors.extend(*field, patterns.iter().cloned());
    }
    let filler = Arc::new(FormFiller::new(
        FieldLocator::new(selectors, config.field_timeout),
        config.navigation_timeout,
    ));

    // Start queue consumers
    let consumer = QueueConsumer::new(
        queue.store(),
        sessions.clone(),
        filler,
        ConsumerSettings {
            lease: config.queue_lease,
            poll_interval: config.queue_poll_interval,
        },
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumers = spawn_consumers(config.queue_consumers, consumer, shutdown_rx);
    info!("Started {} queue consumer(s)", consumers.len());

    // Build router
    let app = build_router(AppState { queue, jobs })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Consumers finish the task in hand before exiting
    info!("Stopping queue consumers...");
    let _ = shutdown_tx.send(true);
    for handle in consumers {
        if let Err(e) = handle.await {
            warn!("Queue consumer ended abnormally: {e}");
        }
    }
    sessions.provider().shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await
        }
    }
}
