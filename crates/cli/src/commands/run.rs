//! `groupclaw run` — Connect to the bridge and answer in the whitelisted group.

use crate::pairing;
use groupclaw_agent::{AssemblerSettings, ContextAssembler, Responder};
use groupclaw_channels::{WhatsAppBridge, WhatsAppConfig};
use groupclaw_config::AppConfig;
use groupclaw_core::{ChatSession, Provider};
use groupclaw_providers::GeminiProvider;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        warn!("Ignoring unreadable .env file: {e}");
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let settings = AssemblerSettings::from_config(&config)?;

    if !config.has_api_key() {
        warn!("GOOGLE_AI_STUDIO_API_KEY is not set; completions will be rejected");
    }

    println!("groupclaw — starting");
    println!("   Bridge:    {}", config.bridge.base_url);
    println!("   Model:     {}", config.provider.model);
    println!("   Whitelist: {}", settings.whitelist);

    let session: Arc<dyn ChatSession> =
        Arc::new(WhatsAppBridge::new(WhatsAppConfig::from(&config.bridge)));
    let provider: Arc<dyn Provider> = Arc::new(GeminiProvider::from_config(&config));

    let assembler = Arc::new(ContextAssembler::new(session.clone(), provider, settings));
    let responder = Responder::from_config(assembler, &config)
        .with_pairing_handler(Arc::new(pairing::print_code));

    let events = session
        .events()
        .await
        .map_err(|e| format!("Failed to connect to bridge: {e}"))?;
    info!(session = session.name(), "Listening for messages");

    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl-C received, stopping"),
            Err(e) => {
                warn!("Cannot listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    let summary = responder.run(events, shutdown).await;
    if let Err(e) = session.stop().await {
        warn!("Failed to stop session: {e}");
    }
    println!(
        "\ngroupclaw stopped: {} replied, {} ignored, {} failed",
        summary.replied, summary.ignored, summary.failed
    );

    Ok(())
}
