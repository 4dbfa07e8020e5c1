use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod crypto;
mod db;
mod error;
mod export;
mod mailer;
mod notify;
mod outbox;
mod ratelimit;
mod routes;
mod state;
mod storage;
mod sweeper;
mod validation;

use state::AppState;

const PLACEHOLDER_SECRET: &str = "change-me-in-production";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backoffice_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;
    tracing::info!(
        "Starting back office server on {}:{}",
        config.server.host,
        config.server.port
    );
    if config.auth.jwt_secret == PLACEHOLDER_SECRET {
        tracing::warn!("auth.jwt_secret is the placeholder value; set JWT_SECRET");
    }
    if config.security.encryption_key == PLACEHOLDER_SECRET {
        tracing::warn!("security.encryption_key is the placeholder value; set ENCRYPTION_KEY");
    }

    // Initialize database
    let db = db::Database::new(&config.database.path).await?;
    db.run_migrations().await?;

    // Create app state
    let state = AppState::new(db, config.clone());

    if config.scheduler.enabled {
        tracing::info!(
            "Scheduled delivery every {}s, {} messages per sweep",
            config.scheduler.interval_secs,
            config.scheduler.batch_size
        );
        sweeper::spawn_ticker(state.clone());
    } else {
        tracing::info!("In-process scheduler disabled; relying on /api/cron/send-scheduled");
    }

    // Build router
    let app = routes::create_router(state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
