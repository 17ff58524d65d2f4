//! RTM CLI - Main entry point

use clap::Parser;
use rtm_cli::{commands, proxy, Cli, CliError, Commands};
use rtm_common::logging::{init_logging, LogConfig};
use rtm_core::{Config, Manager};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Handle markdown help generation
    if cli.markdown_help {
        println!("{}", clap_markdown::help_markdown::<Cli>());
        return;
    }

    let Some(command) = cli.command.as_ref() else {
        eprintln!("Error: A subcommand is required");
        eprintln!();
        eprintln!("For more information, try '--help'.");
        process::exit(2);
    };

    let log_config = LogConfig::builder()
        .level(cli.log_level)
        .log_file_prefix("rtm")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().with_env_overrides().unwrap_or(log_config);

    // The CLI still works without logging
    let _guard = init_logging(&log_config).ok();

    if let Err(e) = execute_command(&cli, command).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(cli: &Cli, command: &Commands) -> rtm_cli::Result<()> {
    if let Commands::Delete = command {
        commands::delete::run();
        return Ok(());
    }

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;

    if command.needs_proxy() && !cli.no_proxy_check {
        proxy::ensure_proxy(&config.voms_proxy)?;
    }

    // Parse the dataset list before touching the database
    let definition = match command {
        Commands::Define { datasets, site, file } => {
            Some(commands::define::request(datasets, site.as_deref(), file.as_ref())?)
        },
        _ => None,
    };

    let manager = Manager::connect(&config).await?;

    match command {
        Commands::Define { .. } => match definition {
            Some(request) => commands::define::run(&manager, request).await,
            None => Err(CliError::invalid_arguments("no datasets to define")),
        },

        Commands::Subscribe { pattern } => {
            commands::subscribe::run(&manager, pattern.as_deref().unwrap_or_default()).await
        },

        Commands::Status { pattern, no_update } => {
            commands::status::run(&manager, pattern.as_deref().unwrap_or_default(), !no_update).await
        },

        Commands::Verify { pattern } => {
            commands::verify::run(&manager, pattern.as_deref().unwrap_or_default()).await
        },

        Commands::Summary => commands::summary::run(&manager).await,

        Commands::Whoami => commands::whoami::run(&manager).await,

        Commands::Delete => Ok(()),
    }
}
