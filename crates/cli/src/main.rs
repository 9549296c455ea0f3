// FILE: crates/cli/src/main.rs

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use tradecost_config::ConfigManager;
use tradecost_network::DataLayer;

mod commands;

fn build_cli() -> Command {
    Command::new("tradecost")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TradeCost Team")
        .about("Resilient access to trading cost data, with offline cache and sync queue")
        .arg(
            Arg::new("config-dir")
                .short('c')
                .long("config-dir")
                .value_name("DIR")
                .help("Directory holding config.toml")
                .global(true),
        )
        .subcommand(
            Command::new("get")
                .about("Read a resource through the cache and circuit breaker")
                .arg(Arg::new("endpoint").required(true).value_name("ENDPOINT").help("Endpoint name from [network.endpoints]"))
                .arg(Arg::new("path").required(true).value_name("PATH").help("Resource path"))
                .arg(
                    Arg::new("param")
                        .short('p')
                        .long("param")
                        .value_name("KEY=VALUE")
                        .help("Query parameter (repeatable)")
                        .action(ArgAction::Append),
                )
                .arg(Arg::new("ttl").long("ttl").value_name("SECS").help("Cache TTL for the response").value_parser(clap::value_parser!(u64)))
                .arg(Arg::new("retries").short('r').long("retries").value_name("N").help("Override the retry count").value_parser(clap::value_parser!(u32)))
                .arg(Arg::new("no-cache").long("no-cache").help("Skip cache lookup and write-through").action(ArgAction::SetTrue))
                .arg(Arg::new("no-fallback").long("no-fallback").help("Report failures instead of serving cached data").action(ArgAction::SetTrue))
                .arg(Arg::new("bypass-circuit").long("bypass-circuit").help("Ignore the circuit breaker").action(ArgAction::SetTrue)),
        )
        .subcommand(
            Command::new("send")
                .about("Send a mutation; queued for replay if it cannot be applied now")
                .arg(Arg::new("method").required(true).value_name("METHOD").help("POST, PUT, PATCH or DELETE"))
                .arg(Arg::new("endpoint").required(true).value_name("ENDPOINT").help("Endpoint name from [network.endpoints]"))
                .arg(Arg::new("path").required(true).value_name("PATH").help("Resource path"))
                .arg(Arg::new("body").short('b').long("body").value_name("JSON").help("JSON request body"))
                .arg(Arg::new("retries").short('r').long("retries").value_name("N").help("Override the retry count").value_parser(clap::value_parser!(u32))),
        )
        .subcommand(
            Command::new("cache")
                .about("Inspect or clear the tiered cache")
                .subcommand_required(true)
                .subcommand(
                    Command::new("get")
                        .about("Show the cached value for a key")
                        .arg(Arg::new("key").required(true).value_name("KEY").help("Cache key, e.g. fees:/brokers")),
                )
                .subcommand(
                    Command::new("clear")
                        .about("Remove cached entries")
                        .arg(Arg::new("prefix").value_name("PREFIX").help("Only keys starting with this prefix")),
                ),
        )
        .subcommand(
            Command::new("queue")
                .about("Inspect or flush the offline sync queue")
                .subcommand_required(true)
                .subcommand(Command::new("list").about("List queued mutations"))
                .subcommand(
                    Command::new("flush")
                        .about("Replay queued mutations now")
                        .arg(Arg::new("batch").long("batch").value_name("N").help("Items to replay").value_parser(clap::value_parser!(usize))),
                )
                .subcommand(Command::new("clear").about("Drop every queued mutation")),
        )
        .subcommand(
            Command::new("circuit")
                .about("Inspect or reset circuit breakers")
                .subcommand_required(true)
                .subcommand(Command::new("status").about("Show every known circuit"))
                .subcommand(
                    Command::new("reset")
                        .about("Force a circuit closed")
                        .arg(Arg::new("endpoint").required(true).value_name("ENDPOINT").help("Endpoint name")),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the configuration file")
                .subcommand_required(true)
                .subcommand(Command::new("init").about("Write a commented default config"))
                .subcommand(Command::new("show").about("Print the effective configuration"))
                .subcommand(Command::new("validate").about("Check the config file for problems")),
        )
}

fn config_manager(matches: &ArgMatches) -> Result<ConfigManager> {
    match matches.get_one::<String>("config-dir") {
        Some(dir) => ConfigManager::with_directory(PathBuf::from(dir))
            .with_context(|| format!("Failed to use config directory {}", dir)),
        None => ConfigManager::new().context("Failed to locate config directory"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let matches = build_cli().get_matches();
    let manager = config_manager(&matches)?;
    log::debug!("Using config file {}", manager.config_path().display());

    if let Some(("config", sub_matches)) = matches.subcommand() {
        return commands::config(&manager, sub_matches);
    }

    let config = manager
        .load_with_env_overrides()
        .context("Failed to load configuration")?;
    let layer = DataLayer::init(&config)
        .await
        .context("Failed to initialize data layer")?;

    let result = match matches.subcommand() {
        Some(("get", sub_matches)) => commands::get(&layer, sub_matches).await,
        Some(("send", sub_matches)) => commands::send(&layer, sub_matches).await,
        Some(("cache", sub_matches)) => commands::cache(&layer, sub_matches).await,
        Some(("queue", sub_matches)) => commands::queue(&layer, sub_matches).await,
        Some(("circuit", sub_matches)) => commands::circuit(&layer, sub_matches),
        _ => build_cli().print_help().map_err(Into::into),
    };

    layer.dispose().await;
    result
}
