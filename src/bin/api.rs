use investor_chatbot::api::start_server;
use investor_chatbot::gemini::GeminiClient;
use investor_chatbot::market::AlphaVantageClient;
use investor_chatbot::orchestrator::ChatOrchestrator;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing; RUST_LOG wins, then LOG_LEVEL, then info.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    let completion = Arc::new(GeminiClient::from_env());

    // A missing market credential is fatal here, before the server binds.
    let market = Arc::new(AlphaVantageClient::from_env()?);

    let orchestrator = Arc::new(ChatOrchestrator::new(completion, market));

    info!(port, "Investor chatbot API server starting");

    start_server(orchestrator, port).await?;

    Ok(())
}
