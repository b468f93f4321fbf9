//! `groupclaw onboard` — First-time setup.

use groupclaw_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = AppConfig::config_path();

    println!("groupclaw — First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set GROUP_WHITELIST_ID and GOOGLE_AI_STUDIO_API_KEY (or a .env file)");
    println!("   2. Start the WhatsApp bridge at {}", AppConfig::default().bridge.base_url);
    println!("   3. Run: groupclaw, then scan the QR code\n");

    Ok(())
}
