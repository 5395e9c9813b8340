mod clock;
mod config;
mod error;
mod llm;
mod rate_limit;
mod routes;
mod services;
mod state;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::AppConfig::from_env();

    let store = store::RedisStore::connect(&config.redis)
        .await
        .expect("store init failed");

    // Initialize LLM client (non-fatal: chat disabled if config missing).
    let llm: Option<Arc<dyn llm::LlmChat>> = match llm::LlmClient::from_env() {
        Ok(client) => {
            tracing::info!(model = client.model(), "LLM client initialized");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "LLM client not configured — chat disabled");
            None
        }
    };

    let port = config.port;
    let state = state::AppState::new(Arc::new(store), llm, config);

    let app = routes::app(state).into_make_service_with_connect_info::<SocketAddr>();
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "foliochat listening");
    axum::serve(listener, app).await.expect("server failed");
}
