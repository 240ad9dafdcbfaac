//! `verdant chat` — one-shot message mode for local testing.

use std::sync::Arc;
use std::time::Duration;

use verdant_config::AppConfig;
use verdant_core::message::ConversationId;
use verdant_core::MemoryStore;
use verdant_pipeline::{derive_insights, Orchestrator};
use verdant_telemetry::TraceStore;

pub async fn run(message: &str, user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let provider = verdant_providers::build_from_config(&config.provider)
        .map_err(|e| format!("Provider setup failed: {e}"))?;

    let store: Arc<dyn MemoryStore> = match config.memory.backend.as_str() {
        "in_memory" => Arc::new(verdant_memory::InMemoryStore::new()),
        _ => Arc::new(verdant_memory::SqliteStore::new(&config.memory.path).await?),
    };

    let orchestrator = Orchestrator::new(
        store.clone(),
        provider,
        Arc::new(TraceStore::default()),
        Duration::from_secs(config.provider.timeout_secs),
    );

    let conversation = ConversationId::new();
    let reply = orchestrator.handle(user, &conversation, message).await?;

    println!("{reply}");

    // Let the detached evaluation land before the process exits, then show
    // where the user stands.
    orchestrator.shutdown().await;

    let memory = store.read_user_memory(user).await?;
    let insights = derive_insights(&memory);
    eprintln!();
    eprintln!("  momentum: {:?} — {}", insights.momentum.state, insights.momentum.insight);

    Ok(())
}
