use advisor_swarm::{
    config::AppConfig,
    create_default_agents,
    models::MarketPreference,
    orchestrator::Orchestrator,
    questionnaire::uniform_answers,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;

    info!("Advisor swarm starting");

    // Usage: advisor [tw|us|both] [answer index 0-3]
    let mut args = std::env::args().skip(1);
    let market = match args.next().as_deref() {
        Some("tw") => MarketPreference::Tw,
        Some("us") => MarketPreference::Us,
        _ => MarketPreference::Both,
    };
    let answer_index: usize = args.next().map(|a| a.parse()).transpose()?.unwrap_or(1);

    // Create components
    let inference = config.inference_service()?;
    let agents = create_default_agents(inference, config.stage_settings());
    let orchestrator = Orchestrator::new(agents, config.orchestrator_config());

    let inputs = uniform_answers(answer_index, market);
    info!(market = %market, answers = ?inputs.answers, "Running mission");

    let outcome = orchestrator.start_mission(inputs).await?;

    println!("\n=== MISSION LOG ===");
    for (i, message) in orchestrator.message_log().await.iter().enumerate() {
        println!("  {}: [{}] {:?} {}", i + 1, message.from(), message.kind(), message.summary());
    }

    println!("\nStatus: {:?}", outcome.status);
    println!("Dispatched: {}", outcome.dispatched);
    println!("Log fingerprint: {}", orchestrator.log_fingerprint().await);

    let board = orchestrator.current_blackboard().await;
    if let Some(report) = board.report() {
        println!("\n=== REPORT ===\n{}", report);
    }

    Ok(())
}
