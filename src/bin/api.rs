use advisor_swarm::{
    api::{start_server, ApiState},
    config::AppConfig,
    create_default_agents,
    orchestrator::Orchestrator,
    tutor::Tutor,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load environment variables
    let config = AppConfig::from_env()?;

    info!("🚀 Advisor Swarm - API Server");
    info!("📍 Port: {}", config.port);

    // Create components
    let inference = config.inference_service()?;
    let agents = create_default_agents(inference.clone(), config.stage_settings());
    let orchestrator = Arc::new(Orchestrator::new(agents, config.orchestrator_config()));
    let tutor = Arc::new(Tutor::new(inference, config.language));

    info!(agents = ?orchestrator.agent_ids(), "✅ Orchestrator initialized");
    info!("📡 Starting API server...");

    let state = ApiState {
        orchestrator,
        tutor,
        language: config.language,
    };

    // Start API server
    start_server(state, config.port).await?;

    Ok(())
}
