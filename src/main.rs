use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shoptalk::adapters::AppState;
use shoptalk::agents::memory::{ConversationStore, InMemoryStore};
use shoptalk::agents::LlmRuntimeFactory;
use shoptalk::cli::Cli;
use shoptalk::config::Settings;
use shoptalk::services::{ChatService, DiagnosticsService};
use shoptalk::tools::StandardToolFactory;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::new_with_cli(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level)),
        )
        .init();

    info!("Starting shoptalk agent API");

    let store: Arc<dyn ConversationStore> = Arc::new(InMemoryStore::new(200));
    let runtimes = Arc::new(LlmRuntimeFactory::new(settings.llm.clone(), store));

    let chat_tools = Arc::new(StandardToolFactory::new(
        settings.database.clone(),
        settings.search.clone(),
    ));
    let diagnostics_tools = Arc::new(
        StandardToolFactory::new(settings.database.clone(), settings.search.clone())
            .with_webhook(settings.webhook.clone()),
    );

    let chat = Arc::new(ChatService::new(
        ChatService::chat_spec(&settings.llm),
        runtimes.clone(),
        chat_tools,
    ));
    let diagnostics = Arc::new(DiagnosticsService::new(
        DiagnosticsService::diagnostics_spec(&settings.llm),
        runtimes,
        diagnostics_tools,
    ));

    // Warm up eagerly; a failure here is retried on first use
    if let Err(e) = chat.ensure_ready().await {
        warn!("Chat agent initialization deferred: {}", e);
    }
    if let Err(e) = diagnostics.ensure_ready().await {
        warn!("Diagnostics agent initialization deferred: {}", e);
    }

    let app = shoptalk::create_app(AppState { chat, diagnostics });

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
