//! Exposes the command line application.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use auth_cache::config::Config;
use auth_cache::logging;
use auth_cache::metrics;
use auth_cache::services::{self, InMemoryCypress, UserManager};
use clap::{Args, Parser, Subcommand};
use futures::future::join_all;

/// Authentication cache commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve user names to the ids of their user objects.
    Resolve(ResolveArgs),

    /// Load the configuration and print the effective cache settings.
    CheckConfig,
}

#[derive(Args, Debug)]
struct ResolveArgs {
    /// The user names to resolve. Repeated names are resolved concurrently.
    #[arg(required = true)]
    names: Vec<String>,

    /// How many times to resolve all names.
    #[arg(long, default_value_t = 1)]
    rounds: usize,

    /// Simulated latency of the metadata authority, for example `20ms`.
    #[arg(long, value_parser = humantime::parse_duration)]
    latency: Option<Duration>,
}

/// Command line interface parser.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    // SAFETY: We are still single-threaded, the runtime is only started below.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd,
            config.metrics.custom_tags.clone(),
        )
        .context("failed to configure statsd")?;
    }

    match cli.command {
        Command::Resolve(args) => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start the runtime")?;
            runtime.block_on(resolve(&config, args))
        }
        Command::CheckConfig => {
            let cache = &config.caching_cypress_user_manager.cache;
            println!("ignore_existing: {}", config.cypress_user_manager.ignore_existing);
            println!("{cache:#?}");
            Ok(())
        }
    }
}

async fn resolve(config: &Config, args: ResolveArgs) -> Result<()> {
    let mut client = InMemoryCypress::new();
    if let Some(latency) = args.latency {
        client = client.with_latency(latency);
    }
    let client = Arc::new(client);
    let manager = services::create_user_manager(config, client.clone());

    for round in 1..=args.rounds {
        tracing::info!(round, "Resolving {} names", args.names.len());
        let requests = args.names.iter().map(|name| manager.create_user(name));
        let results = join_all(requests).await;

        for (name, result) in args.names.iter().zip(results) {
            match result {
                Ok(id) => println!("{name}\t{id}"),
                Err(err) => println!("{name}\terror: {err}"),
            }
        }
    }

    println!("upstream requests: {}", client.calls());
    Ok(())
}
