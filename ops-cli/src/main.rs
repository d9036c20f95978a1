use anyhow::Result;
use clap::Parser;
use colored::*;
use config_engine::load_config;
use dialoguer::Confirm;
use logger_redacted::{correlation_id, init_logging, redacted_error};
use ops_cli::{connect, execute, Cli, Command};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.clone())?;
    if cli.verbose {
        config.logging.log_level = "debug".to_string();
    }
    let _guard = init_logging(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        db = %config.database.db_path,
        offline = cli.offline,
        "Starting eunio"
    );

    if let Command::Reset { user, yes: false } = &cli.command {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete all local data for {}? Remote data is kept.",
                correlation_id(user)
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{}", "Aborted".yellow());
            return Ok(());
        }
    }

    let sync = connect(&config, cli.offline).await?;
    let mut stdout = std::io::stdout();
    if let Err(e) = execute(&sync, cli.command, &mut stdout).await {
        redacted_error!("Command failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}
