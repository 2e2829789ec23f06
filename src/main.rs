use std::sync::Arc;

use pm_assist::backend::{Backend, RestBackend};
use pm_assist::config::RelayConfig;
use pm_assist::relay::{RelayState, chat_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Fail fast on missing configuration — a relay without an upstream
    // credential must not start serving.
    let config = RelayConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("📋 pm-assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Backend: {}", config.backend_url);
    eprintln!("   Chat API: http://0.0.0.0:{}/api/chat\n", config.port);

    let backend: Arc<dyn Backend> = Arc::new(RestBackend::new(
        config.backend_url.clone(),
        config.backend_api_key.clone(),
    ));

    let state = RelayState::new(&config, backend)?;
    let app = chat_routes(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "Chat relay started");
    axum::serve(listener, app).await?;

    Ok(())
}
