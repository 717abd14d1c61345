use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pdp_gateway::api;
use pdp_gateway::config::validate_config;
use pdp_gateway::store::postgres::{CONNECT_POLICY, connect};
use pdp_gateway::utils::cli::Args;
use pdp_gateway::utils::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match validate_config(&args) {
        Ok(config) => config,
        Err(validation_errors) => {
            for e in &validation_errors {
                error!("{}", e);
            }
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let pool = connect(
        &config.db_url,
        config.db_max_connections,
        CONNECT_POLICY,
        &shutdown,
    )
    .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready");

    let addr = format!("{}:{}", config.host, config.port);
    let state = Arc::new(AppState::new(config, Arc::new(pool), shutdown.clone()));
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutting down, cancelling running workflows");
    shutdown.cancel();
}
