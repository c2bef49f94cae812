use std::io;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod format;

use cli::{Cli, Commands, ConfigAction, OutputFormat};
use commands::{HubOptions, Output, OpenHub};
use config::{Config, resolve_db, resolve_remote};
use format::FormatOptions;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "homelink", &mut io::stdout());
        return Ok(());
    }

    // Logs go to stderr so JSON on stdout stays parseable.
    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    if let Commands::Config {
        action: ConfigAction::Path,
    } = cli.command
    {
        println!("{}", Config::path().display());
        return Ok(());
    }

    let config = Config::load();
    let format = if cli.json {
        OutputFormat::Json
    } else {
        config
            .format
            .as_deref()
            .map(OutputFormat::from_config)
            .unwrap_or_default()
    };
    let out = Output {
        format,
        opts: FormatOptions::new(cli.no_color || config.no_color).with_compact(cli.compact),
        quiet: cli.quiet,
    };

    let options = HubOptions {
        db: resolve_db(cli.db, &config),
        remote: resolve_remote(cli.replica_url, cli.uid, cli.auth_token, &config)?,
        command_timeout: config.command_timeout(),
        health_timeout: config.health_timeout(),
    };
    let hub = commands::open_hub(&options).await?;
    let result = run(&hub, &options, cli.command, &out).await;
    hub.close().await;
    result
}

async fn run(hub: &OpenHub, options: &HubOptions, command: Commands, out: &Output) -> Result<()> {
    match command {
        Commands::Health => commands::cmd_health(hub, out).await,
        Commands::Toggle { device } => commands::cmd_toggle(hub, &device, out).await,
        Commands::Devices { room } => commands::cmd_devices(hub, room.as_deref(), out).await,
        Commands::Device { action } => commands::cmd_device(hub, action, out).await,
        Commands::Rooms { action } => commands::cmd_rooms(hub, action, out).await,
        Commands::Schedules { device, action } => {
            commands::cmd_schedules(hub, device.as_deref(), action, out).await
        }
        Commands::History { limit } => commands::cmd_history(hub, limit, out).await,
        Commands::Config { action } => commands::cmd_config(hub, options, action, out).await,
        Commands::Watch { interval } => commands::cmd_watch(hub, interval, out).await,
        Commands::Completions { .. } => {
            // Already handled above
            unreachable!()
        }
    }
}
