use anyhow::Result;
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use armature_cli::{
    cli::{Cli, Commands, LogLevel},
    commands,
    config::CliConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging: explicit flag wins over --verbose, default off.
    let level: LevelFilter = match (cli.log_level, cli.verbose) {
        (Some(level), _) => level.into(),
        (None, true) => LogLevel::Debug.into(),
        (None, false) => LogLevel::Off.into(),
    };
    let env_filter = format!(
        "armature_cli={level},armature_core={level},armature_config={level}"
    );
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .init();

    // Load configuration with CLI overrides.
    let config = CliConfig::load(cli.config, cli.ready_timeout).await?;

    match cli.command {
        Commands::Build { file } => commands::build::execute(config, file, cli.format).await?,
        Commands::Validate { file } => {
            commands::validate::execute(config, file, cli.format).await?
        }
        Commands::Kinds => commands::kinds::execute(cli.format).await?,
    }

    Ok(())
}
