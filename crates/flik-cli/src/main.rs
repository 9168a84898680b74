//! Flik CLI - main entry point

use clap::Parser;
use flik_cli::{Cli, Commands};
use flik_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = if cli.verbose { LogLevel::Debug } else { LogLevel::Warn };
    let log_config = LogConfig::builder()
        .level(level)
        .output(LogOutput::Console)
        .log_file_prefix("flik-cli")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging
    let _guard = init_logging(&log_config).ok().flatten();

    if let Err(e) = execute_command(cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: Cli) -> flik_cli::Result<()> {
    match cli.command {
        Commands::Run { pipeline } => flik_cli::commands::run::run(cli.server_url, &pipeline).await,
        Commands::Status { run_id } => flik_cli::commands::status::run(cli.server_url, run_id).await,
        Commands::Runs { job_name, limit } => {
            flik_cli::commands::runs::run(cli.server_url, job_name, limit).await
        },
        Commands::RateLimit => flik_cli::commands::rate_limit::run(cli.server_url).await,
    }
}
