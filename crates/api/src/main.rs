use std::net::SocketAddr;
use std::sync::Arc;

use tally_core::ledger::LedgerStore;
use tally_db::PgLedgerStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally_api::background::queue_scanner::QueueScanner;
use tally_api::config::ServerConfig;
use tally_api::engine::dispatch::DispatchTable;
use tally_api::engine::settlement::Settler;
use tally_api::router::build_app_router;
use tally_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = tally_db::create_pool(&database_url, config.db_max_connections)
        .await
        .expect("Failed to connect to database");
    tracing::info!(
        max_connections = config.db_max_connections,
        "Database connection pool created"
    );

    tally_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    tally_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    if config.seed_accounts > 0 {
        let created = tally_db::repositories::AccountRepo::seed(&pool, config.seed_accounts)
            .await
            .expect("Failed to seed accounts");
        tracing::info!(created, target = config.seed_accounts, "Seed accounts ensured");
    }

    // --- Settlement engine ---
    let shutdown = CancellationToken::new();
    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(pool.clone()));
    let dispatch = DispatchTable::new(config.dispatch_shards);
    tracing::info!(shards = dispatch.shard_count(), "Settlement engine ready");
    let settler = Settler::new(Arc::clone(&store), dispatch, shutdown.clone());

    // --- Queue scanner ---
    let scanner = QueueScanner::new(Arc::clone(&store), settler.clone(), config.scan_interval());
    let scanner_cancel = shutdown.clone();
    let scanner_handle = tokio::spawn(async move {
        scanner.run(scanner_cancel).await;
    });

    // --- App state ---
    let state = AppState { pool, settler };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Covers a server that exited without a signal.
    shutdown.cancel();
    if tokio::time::timeout(config.shutdown_timeout(), scanner_handle)
        .await
        .is_err()
    {
        tracing::warn!("Queue scanner did not stop in time");
    } else {
        tracing::info!("Queue scanner stopped");
    }

    if let Err(e) = store.close().await {
        tracing::warn!(error = %e, "Closing ledger store failed");
    }
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix). Cancels `shutdown`
/// as soon as a signal arrives, which stops the scanner and releases every
/// caller still waiting on a drain so in-flight requests can finish.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }

    shutdown.cancel();
}
