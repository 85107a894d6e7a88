use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use greenhouse_telemetry::{
    api,
    config::Config,
    db::{self, journal::{self, Journal}},
    state::AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent, env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    // Journal is optional: without DATABASE_URL everything stays in memory
    let (journal, writer, snapshot) = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            let snapshot = journal::load_snapshot(&pool).await?;
            info!("Database ready");

            let (journal, writer) = Journal::spawn(pool, config.journal_buffer);
            (Some(journal), Some(writer), Some(snapshot))
        }
        None => {
            warn!("DATABASE_URL not set; telemetry will not survive a restart");
            (None, None, None)
        }
    };

    let state = AppState::from_config(&config, journal, snapshot).await?;

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router held the last journal handles; the writer drains and exits
    if let Some(writer) = writer {
        if let Err(e) = writer.await {
            error!(error = %e, "Journal writer task failed");
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
