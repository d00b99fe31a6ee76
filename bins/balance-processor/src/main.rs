//! Balance processor
//!
//! Keeps the stored balances of registered accounts in line with the chain.
//! Each delivery names an account; its native balance and every ERC20 token
//! it has touched are re-read and the merged account is published.
//!
//! # Usage
//!
//! ```bash
//! balance-processor --providers http://localhost:8545,http://backup:8545
//!
//! # register an account, index its transfers, then notify
//! curl -XPOST localhost:8081/accounts -d '{"address":"0x.."}' -H 'content-type: application/json'
//! curl -XPOST localhost:8081/events/app_eth_user.created -d '{"address":"0x.."}'
//! ```

mod config;
mod http;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use config::Config;
use reconciler::query::QueryCompiler;
use reconciler::{LogStore, SqliteLogStore};
use reconciler_chain::ProviderService;
use reconciler_processor::{
    AccountStore, BalanceAggregator, BalanceProcessor, Consumer, EventBus, RoutingKeys,
    SqliteAccountStore,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any as CorsAny, CorsLayer};

/// In-flight deliveries get this long to finish after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(15);

/// Cancel `token` on SIGINT or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(target: "balance_processor::main", "Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(target: "balance_processor::main", "Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!(target: "balance_processor::main", "Received SIGINT (Ctrl+C), shutting down");
        }
        () = terminate => {
            tracing::info!(target: "balance_processor::main", "Received SIGTERM, shutting down");
        }
    }

    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .init();

    tracing::info!(target: "balance_processor::main", "Starting balance processor");
    tracing::info!(target: "balance_processor::main", "Service name: {}", config.service_name);
    tracing::info!(target: "balance_processor::main", "Providers: {}", config.providers.join(", "));
    tracing::info!(target: "balance_processor::main", "Logs database: {}", config.logs_db);
    tracing::info!(target: "balance_processor::main", "Accounts database: {}", config.accounts_db);

    let logs: Arc<dyn LogStore> = Arc::new(SqliteLogStore::new(&config.logs_db)?);
    let accounts: Arc<dyn AccountStore> = Arc::new(SqliteAccountStore::new(&config.accounts_db)?);

    let providers = Arc::new(ProviderService::from_endpoints(&config.providers)?);
    let health_check = providers.spawn_health_check(config.health_check_interval());

    let compiler = QueryCompiler::transfer().with_negation(config.negation());
    let bus = EventBus::default();
    let processor = Arc::new(BalanceProcessor::new(
        RoutingKeys::new(config.service_name.clone()),
        Arc::clone(&accounts),
        BalanceAggregator::new(providers, Arc::clone(&logs), compiler),
        Arc::new(bus.clone()),
    ));

    let (sender, consumer) = Consumer::spawn(processor, config.queue_size, config.prefetch);
    tracing::info!(
        target: "balance_processor::main",
        prefetch = config.prefetch,
        "Consumer started"
    );

    let cors = CorsLayer::new()
        .allow_origin(CorsAny)
        .allow_methods(CorsAny)
        .allow_headers(CorsAny);
    let shutdown_token = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown_token.clone()));

    let state = http::AppState::new(sender, accounts, logs, bus, shutdown_token.clone());
    let app = http::create_http_router(state).layer(cors);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "balance_processor::main", "HTTP API listening on {}", addr);

    let server_shutdown_token = shutdown_token.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown_token.cancelled().await });

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!(target: "balance_processor::main", "Server error: {}", e);
            }
        }
        () = async {
            shutdown_token.cancelled().await;
            tokio::time::sleep(SERVER_SHUTDOWN_TIMEOUT).await;
        } => {
            tracing::warn!(
                target: "balance_processor::main",
                "Connections did not close within {}s, forcing shutdown",
                SERVER_SHUTDOWN_TIMEOUT.as_secs()
            );
        }
    }

    // the router owned the last delivery sender, so the consumer now drains
    health_check.abort();
    tracing::info!(target: "balance_processor::main", "HTTP API stopped, draining deliveries...");

    match tokio::time::timeout(DRAIN_TIMEOUT, consumer.join()).await {
        Ok(Ok(stats)) => {
            tracing::info!(
                target: "balance_processor::main",
                received = stats.received,
                succeeded = stats.succeeded,
                failed = stats.failed,
                "Consumer drained"
            );
        }
        Ok(Err(e)) => {
            tracing::error!(target: "balance_processor::main", "Consumer failed: {}", e);
        }
        Err(_) => {
            tracing::warn!(
                target: "balance_processor::main",
                "Consumer did not drain within {}s, forcing shutdown",
                DRAIN_TIMEOUT.as_secs()
            );
        }
    }

    tracing::info!(target: "balance_processor::main", "Balance processor shutdown complete");
    Ok(())
}
