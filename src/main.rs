//! Virtuals Sentinel - launch lifecycle monitor
//!
//! This is the main entry point: wires the RPC pool, the catalog client, the
//! state machine and the two HTTP surfaces, then runs until a signal.

mod catalog;
mod config;
mod dashboard;
mod error;
mod handlers;
mod lifecycle;
mod models;
mod monitoring;
mod notifications;
mod rpc;

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::catalog::CatalogClient;
use crate::config::AppConfig;
use crate::dashboard::DashboardState;
use crate::handlers::{api_router, health_router, ApiContext, ConfigView, HealthState};
use crate::lifecycle::LifecycleMachine;
use crate::notifications::{CompositeNotifier, TelegramNotifier};
use crate::rpc::RpcPool;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before anything reads the environment.
    dotenvy::dotenv().ok();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging.level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        api_port = config.api_port,
        health_port = config.health_port,
        "Starting Virtuals Sentinel"
    );

    match run(Arc::new(config)).await {
        Ok(()) => {
            tracing::info!("Clean shutdown");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Arc<AppConfig>) -> error::SentinelResult<()> {
    let cancel = CancellationToken::new();

    // RPC pool; start on the lowest-latency endpoint.
    let rpc = Arc::new(RpcPool::new(
        config.chain.rpc.http.clone(),
        config.chain.rpc.wss.clone(),
    )?);
    rpc.select_fastest().await;

    let catalog = Arc::new(CatalogClient::new(
        &config.virtuals,
        config.thresholds.tax_window(),
    )?);
    let dashboard = Arc::new(DashboardState::new());
    let health = Arc::new(HealthState::new());

    let mut notifier = CompositeNotifier::new();
    match TelegramNotifier::from_env() {
        Some(telegram) => {
            notifier.add_service(Arc::new(telegram));
            tracing::info!("Telegram notifier enabled");
        }
        None => tracing::info!("Telegram notifier disabled (no credentials)"),
    }
    let notifier = Arc::new(notifier);

    // Health probe server.
    let health_addr: SocketAddr = ([0, 0, 0, 0], config.health_port).into();
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| error::SentinelError::Config(format!("bind {}: {}", health_addr, e)))?;
    let health_app = health_router(health.clone());
    let health_cancel = cancel.clone();
    tokio::spawn(async move {
        let shutdown = async move { health_cancel.cancelled().await };
        if let Err(e) = axum::serve(health_listener, health_app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %e, "Health server failed");
        }
    });
    tracing::info!(%health_addr, "Health probe listening");

    // Dashboard API server.
    let api_ctx = Arc::new(ApiContext {
        dashboard: dashboard.clone(),
        rpc: rpc.clone(),
        catalog: catalog.clone(),
        config_view: ConfigView::from_config(&config),
    });
    let api_addr: SocketAddr = ([0, 0, 0, 0], config.api_port).into();
    let api_listener = tokio::net::TcpListener::bind(api_addr)
        .await
        .map_err(|e| error::SentinelError::Config(format!("bind {}: {}", api_addr, e)))?;
    let api_app = api_router(api_ctx);
    let api_cancel = cancel.clone();
    tokio::spawn(async move {
        let shutdown = async move { api_cancel.cancelled().await };
        if let Err(e) = axum::serve(api_listener, api_app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            tracing::error!(error = %e, "API server failed");
        }
    });
    tracing::info!(%api_addr, "Dashboard API listening");

    // Signal handling drives the cancellation token.
    spawn_signal_handler(cancel.clone());

    // The machine runs on the main task; its result decides the exit code.
    let machine = LifecycleMachine::new(
        config.clone(),
        rpc,
        catalog,
        dashboard,
        notifier,
        health,
        cancel.clone(),
    )?;
    let result = machine.run().await;
    cancel.cancel();
    result
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to register SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT"),
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received interrupt");
        }
        cancel.cancel();
    });
}

/// Initialize tracing/logging. The config level seeds the default filter;
/// `RUST_LOG` overrides.
fn init_tracing(level: &str) {
    let default_filter = format!("virtuals_sentinel={},tower_http=info", level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
