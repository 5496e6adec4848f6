use portfolio_agent::{
    agent::Orchestrator,
    client::{GhostfolioConnector, SourceConnector, YahooClient},
    config::Settings,
    memory::MemoryStore,
    models::TurnRequest,
    runtime::ChatCompletionsRuntime,
    tools::create_default_registry,
    tracking::CostTracker,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Run a single turn from the command line:
/// `orchestrator "How is my portfolio doing this year?"`
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    let settings = Settings::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let command = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if command.trim().is_empty() {
        eprintln!("usage: orchestrator <question>");
        std::process::exit(2);
    }

    let connector = GhostfolioConnector::new(&settings.ghostfolio_url)?;
    let source = connector.connect(&settings.ghostfolio_access_token).await?;

    let orchestrator = Orchestrator::new(
        Arc::new(ChatCompletionsRuntime::new(settings.clone())?),
        Arc::new(create_default_registry(Arc::new(YahooClient::new()?))),
        Arc::new(MemoryStore::new()),
        Arc::new(CostTracker::new()),
    )
    .with_max_iterations(settings.max_agent_iterations)
    .with_default_model(settings.default_model.clone());

    info!(command = %command, "Running turn");

    let result = orchestrator.handle_turn(TurnRequest::new(command), source).await;

    println!("\n=== ANSWER ===");
    println!("{}", result.response);
    println!("\nTrace ID: {}", result.trace_id);
    println!("Skill: {}", result.skill_used);
    println!("Tools: {}", result.tools_called.join(", "));
    println!("Cost: ${:.6}", result.cost_usd);
    if let Some(code) = result.error {
        eprintln!("Turn failed: {}", code);
        std::process::exit(1);
    }

    Ok(())
}
