use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use smartmove::agent::Agent;
use smartmove::cli::{Cli, Command};
use smartmove::config::AppConfig;
use smartmove::server::{self, Access, AppState};
use smartmove::telemetry::init_telemetry_with_level;
use smartmove::tools::ToolRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Generate the config on first run so there is something to edit.
    let config_path = AppConfig::config_path(cli.config.as_deref())?;
    if AppConfig::save_default(&config_path)? {
        eprintln!("[Config] Created default config: {}", config_path.display());
    }
    let config = AppConfig::load(Some(&config_path))?;

    let level = cli.log.as_deref().unwrap_or(&config.logging.level);
    init_telemetry_with_level(level);
    tracing::info!(
        config = %config_path.display(),
        provider = %config.llm.provider,
        model = %config.llm.model,
        "smartmove v{}",
        env!("CARGO_PKG_VERSION")
    );

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let agent = Agent::from_config(&config)?;
            let access = Access::from_config(&config.server);
            if config.server.maintenance {
                tracing::warn!("maintenance mode is on, every request gets 503");
            }
            server::serve(AppState::new(Arc::new(agent), access), &bind).await
        }

        Command::Ask { message } => {
            let agent = Agent::from_config(&config)?;
            let reply = agent.process_message(&[], &message).await?;
            println!("{}", reply.text);
            Ok(())
        }

        Command::Tools => {
            let definitions = ToolRegistry::new().definitions();
            let text = serde_json::to_string_pretty(&definitions)
                .context("Failed to serialize tool definitions")?;
            println!("{}", text);
            Ok(())
        }
    }
}
