use colloquy::api::{create_router, AppState};
use colloquy::llm::{GatewayClient, GatewayConfig, InferenceEngine};
use colloquy::session::SessionDefaults;
use colloquy::tools::{ToolConfig, ToolRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "colloquy=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let port: u16 = std::env::var("COLLOQUY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);

    let gateway_config = GatewayConfig::from_env();
    if gateway_config.is_configured() {
        tracing::info!("AI gateway configured");
    } else {
        tracing::warn!("AI_GATEWAY_URL not set; chat requests will fail until it is configured");
    }

    let tool_config = ToolConfig::from_env();
    let tools = Arc::new(ToolRegistry::with_builtins(&tool_config));
    let backend = Arc::new(GatewayClient::new(&gateway_config));
    let engine = Arc::new(InferenceEngine::new(backend, tools));

    let mut defaults = SessionDefaults::default();
    if let Some(model) = gateway_config.default_model.clone() {
        defaults.model = model;
    }
    tracing::info!(model = %defaults.model, "session defaults ready");

    let state = AppState::new(engine, defaults);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("colloquy listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
