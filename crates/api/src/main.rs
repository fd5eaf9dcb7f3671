use tracing_subscriber::EnvFilter;

use meetflow_api::{build_router, state::AppState};
use meetflow_config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings =
        Settings::load().map_err(|e| anyhow::anyhow!("Failed to load settings: {}", e))?;
    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    let state = AppState::from_settings(settings)?;
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind {}: {}", addr, e))?;
    tracing::info!(%addr, "Transcription gateway listening");

    axum::serve(listener, router).await?;
    Ok(())
}
