use portfolio_agent::{
    agent::Orchestrator,
    api::{start_server, ApiState},
    client::{GhostfolioConnector, PortfolioSource, SourceConnector, YahooClient},
    config::Settings,
    memory::MemoryStore,
    runtime::ChatCompletionsRuntime,
    tools::create_default_registry,
    tracking::{CostTracker, FeedbackStore},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();
    let settings = Settings::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Portfolio Agent - API Server");
    info!("Port: {}", settings.port);

    let connector = Arc::new(GhostfolioConnector::new(&settings.ghostfolio_url)?);

    // The agent endpoints share one source authenticated with the server token
    let shared_source: Option<Arc<dyn PortfolioSource>> =
        if settings.ghostfolio_access_token.is_empty() {
            warn!("GHOSTFOLIO_ACCESS_TOKEN not set; /agent/command is disabled");
            None
        } else {
            match connector.connect(&settings.ghostfolio_access_token).await {
                Ok(source) => Some(source),
                Err(e) => {
                    warn!(error = %e, url = %settings.ghostfolio_url, "Ghostfolio unreachable at startup");
                    None
                }
            }
        };

    let registry = create_default_registry(Arc::new(YahooClient::new()?));
    let runtime = ChatCompletionsRuntime::new(settings.clone())?;

    let orchestrator = Orchestrator::new(
        Arc::new(runtime),
        Arc::new(registry),
        Arc::new(MemoryStore::new()),
        Arc::new(CostTracker::new()),
    )
    .with_max_iterations(settings.max_agent_iterations)
    .with_default_model(settings.default_model.clone());

    info!("Orchestrator initialized");

    let port = settings.port;
    let state = ApiState {
        orchestrator: Arc::new(orchestrator),
        settings: Arc::new(settings),
        connector,
        shared_source,
        feedback: Arc::new(FeedbackStore::new()),
    };

    start_server(state, port).await?;

    Ok(())
}
