use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use bookings::config::AppConfig;
use bookings::db;
use bookings::handlers;
use bookings::services::clock::SystemClock;
use bookings::services::messaging::console::ConsoleDispatcher;
use bookings::services::messaging::http::HttpDispatcher;
use bookings::services::messaging::NotificationDispatcher;
use bookings::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let dispatcher: Arc<dyn NotificationDispatcher> = if config.notification_url.is_empty() {
        tracing::info!("NOTIFICATION_URL not set, notifications go to the log");
        Arc::new(ConsoleDispatcher)
    } else {
        tracing::info!("sending notifications to {}", config.notification_url);
        Arc::new(HttpDispatcher::new(
            config.notification_url.clone(),
            Duration::from_secs(config.notification_timeout_secs),
        )?)
    };

    let state = AppState::new(&config, conn, dispatcher, Arc::new(SystemClock));
    let runner = state.jobs.spawn();

    let app = handlers::router(state.clone());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    state.jobs.shutdown();
    runner.await?;

    Ok(())
}
