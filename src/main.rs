use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use support_relay::{router, AppConfig, AppState, ChatService, RoomRegistry};

#[derive(Parser, Debug)]
#[command(name = "api-server", about = "Customer-support chat relay")]
struct Cli {
    /// Listen port, overrides PORT
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;
    let port = cli.port.unwrap_or(config.port);

    info!("Starting support relay...");

    let store = config.build_store().await?;
    let responder = Arc::new(config.build_responder()?);
    let ai_available = responder.is_available();

    let rooms = Arc::new(RoomRegistry::new());
    let chat = Arc::new(ChatService::new(store, rooms, responder, config.reply_settings()));
    let state = AppState::new(chat, config.ws_channel_capacity);

    let app = router(state, &config.allowed_origins());

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(%addr, model = %config.groq_model, ai_available, "Server ready");

    axum::serve(listener, app).await?;

    Ok(())
}
