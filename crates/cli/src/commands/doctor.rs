//! `groupclaw doctor` — Diagnose configuration and reachability.

use groupclaw_channels::{WhatsAppBridge, WhatsAppConfig};
use groupclaw_config::AppConfig;
use groupclaw_core::{ChatSession, Provider};
use groupclaw_providers::GeminiProvider;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    println!("🩺 groupclaw Doctor — System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_path();
    if config_path.exists() {
        println!("  ✅ Config file found at {}", config_path.display());
    } else {
        println!("  ⚠️  No config file — using defaults (run `groupclaw onboard`)");
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config and re-run doctor.");
            return Ok(());
        }
    };

    match config.whitelist() {
        Ok(id) => println!("  ✅ Whitelisted group: {id}"),
        Err(e) => {
            println!("  ❌ {e}");
            issues += 1;
        }
    }

    if config.has_api_key() {
        let provider = GeminiProvider::from_config(&config);
        match provider.health_check().await {
            Ok(true) => println!("  ✅ Gemini API reachable, key accepted"),
            Ok(false) => {
                println!("  ❌ Gemini API rejected the request");
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Gemini API check failed: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ❌ No API key — set GOOGLE_AI_STUDIO_API_KEY");
        issues += 1;
    }

    let bridge = WhatsAppBridge::new(WhatsAppConfig::from(&config.bridge));
    match bridge.health_check().await {
        Ok(true) => println!("  ✅ Bridge reachable at {}", config.bridge.base_url),
        Ok(false) => {
            println!("  ❌ Bridge at {} is not healthy", config.bridge.base_url);
            issues += 1;
        }
        Err(e) => {
            println!("  ❌ Bridge unreachable: {e}");
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
