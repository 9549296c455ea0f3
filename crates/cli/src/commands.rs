// FILE: crates/cli/src/commands.rs

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, TimeZone};
use clap::ArgMatches;
use console::style;
use serde_json::Value;
use std::time::Duration;
use tradecost_cache::Lookup;
use tradecost_config::ConfigManager;
use tradecost_core::{EndpointId, Method, Origin, ResponseEnvelope, Timestamp};
use tradecost_network::{DataLayer, RequestOptions};
use tradecost_resilience::CircuitState;

/// Read a resource through the facade
pub async fn get(layer: &DataLayer, matches: &ArgMatches) -> Result<()> {
    let endpoint = required(matches, "endpoint")?;
    let path = required(matches, "path")?;

    let mut options = RequestOptions::get();
    if let Some(params) = matches.get_many::<String>("param") {
        for raw in params {
            let (key, value) = parse_param(raw)?;
            options = options.with_param(key, value);
        }
    }
    if let Some(secs) = matches.get_one::<u64>("ttl") {
        options = options.with_ttl(Duration::from_secs(*secs));
    }
    if let Some(retries) = matches.get_one::<u32>("retries") {
        options = options.with_retries(*retries);
    }
    if matches.get_flag("no-cache") {
        options = options.no_cache();
    }
    if matches.get_flag("no-fallback") {
        options = options.no_fallback();
    }
    if matches.get_flag("bypass-circuit") {
        options = options.bypass_circuit_breaker();
    }

    let envelope: ResponseEnvelope<Value> = layer.resilient_request(endpoint, path, options).await;
    print_envelope(&envelope)
}

/// Send a mutation through the facade
pub async fn send(layer: &DataLayer, matches: &ArgMatches) -> Result<()> {
    let method: Method = required(matches, "method")?
        .parse()
        .map_err(|e: String| anyhow!(e))?;
    if !method.is_mutating() {
        bail!("Use 'get' for {} requests", method);
    }

    let endpoint = required(matches, "endpoint")?;
    let path = required(matches, "path")?;

    let mut options = RequestOptions::mutation(method);
    if let Some(body) = matches.get_one::<String>("body") {
        let body: Value = serde_json::from_str(body).context("Body is not valid JSON")?;
        options = options.with_body(body);
    }
    if let Some(retries) = matches.get_one::<u32>("retries") {
        options = options.with_retries(*retries);
    }

    let envelope: ResponseEnvelope<Value> = layer.resilient_request(endpoint, path, options).await;
    print_envelope(&envelope)
}

/// `cache get` and `cache clear`
pub async fn cache(layer: &DataLayer, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("get", sub)) => {
            let key = required(sub, "key")?;
            match layer.cache().lookup(key).await {
                Lookup::Fresh(entry) => {
                    println!("{} {} (stored {})", style("fresh").green().bold(), key, format_timestamp(entry.stored_at));
                    println!("{}", serde_json::to_string_pretty(&entry.value)?);
                }
                Lookup::Stale(entry) => {
                    println!("{} {} (expired, now purged)", style("stale").yellow().bold(), key);
                    println!("{}", serde_json::to_string_pretty(&entry.value)?);
                }
                Lookup::Miss => println!("No cached value for '{}'", key),
            }
            Ok(())
        }
        Some(("clear", sub)) => {
            let prefix = sub.get_one::<String>("prefix").map(String::as_str);
            let removed = layer.cache_clear(prefix).await;
            println!("{} Removed {} cached entries", style("✓").green().bold(), removed);
            Ok(())
        }
        _ => bail!("Unknown cache command"),
    }
}

/// `queue list`, `queue flush` and `queue clear`
pub async fn queue(layer: &DataLayer, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("list", _)) => {
            let pending = layer.queue().pending();
            if pending.is_empty() {
                println!("Sync queue is empty.");
                return Ok(());
            }

            println!("\n{} Queued Mutations", style(pending.len()).bold().cyan());
            println!("{}", "=".repeat(80));
            for item in pending {
                println!(
                    "{}  {:<6} {}:{}  queued {}  attempts {}",
                    style(truncate(&item.id, 8)).dim(),
                    item.method,
                    item.endpoint,
                    item.path,
                    format_timestamp(item.enqueued_at),
                    item.attempts
                );
            }
            Ok(())
        }
        Some(("flush", sub)) => {
            if !layer.connectivity().is_online() {
                println!("{} Offline, nothing replayed", style("!").yellow().bold());
            }
            let stats = layer.flush_queue(sub.get_one::<usize>("batch").copied()).await;
            println!(
                "Processed {}, succeeded {}, failed {} ({} dropped), remaining {}",
                stats.processed,
                style(stats.successful).green(),
                style(stats.failed).red(),
                stats.exhausted.len(),
                stats.remaining
            );
            for item in &stats.exhausted {
                println!(
                    "  {} dropped {} {}:{} after {} attempts",
                    style("✗").red().bold(),
                    item.method,
                    item.endpoint,
                    item.path,
                    item.attempts
                );
            }
            Ok(())
        }
        Some(("clear", _)) => {
            let removed = layer.queue().clear().await;
            println!("{} Dropped {} queued mutations", style("✓").green().bold(), removed);
            Ok(())
        }
        _ => bail!("Unknown queue command"),
    }
}

/// `circuit status` and `circuit reset`
pub fn circuit(layer: &DataLayer, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("status", _)) => {
            let statuses = layer.circuit_status();
            if statuses.is_empty() {
                println!("No endpoint has been called yet.");
                return Ok(());
            }

            for (endpoint, state) in statuses {
                let record = layer.breakers().record(&endpoint);
                let failures = record.as_ref().map_or(0, |r| r.failure_count);
                let retry_at = record
                    .and_then(|r| r.next_attempt_at)
                    .map(|at| format!("  retry at {}", format_timestamp(at)))
                    .unwrap_or_default();
                println!("{:<20} {}  failures {}{}", endpoint, styled_state(state), failures, retry_at);
            }
            Ok(())
        }
        Some(("reset", sub)) => {
            let endpoint = EndpointId::new(required(sub, "endpoint")?);
            layer.circuit_reset(&endpoint);
            println!("{} Circuit for '{}' closed", style("✓").green().bold(), endpoint);
            Ok(())
        }
        _ => bail!("Unknown circuit command"),
    }
}

/// `config init`, `config show` and `config validate`
pub fn config(manager: &ConfigManager, matches: &ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("init", _)) => {
            if manager.initialize().context("Failed to write default config")? {
                println!("{} Wrote {}", style("✓").green().bold(), manager.config_path().display());
            } else {
                println!("Config already exists at {}", manager.config_path().display());
            }
            Ok(())
        }
        Some(("show", _)) => {
            let config = manager
                .load_with_env_overrides()
                .context("Failed to load configuration")?;
            println!("# {}", manager.config_path().display());
            println!("{}", render_config(&config)?);
            Ok(())
        }
        Some(("validate", _)) => {
            let problems = manager.validate().context("Failed to load configuration")?;
            if problems.is_empty() {
                println!("{} Configuration is valid", style("✓").green().bold());
                return Ok(());
            }
            for problem in &problems {
                println!("  {} {}", style("✗").red().bold(), problem);
            }
            bail!("{} configuration problem(s)", problems.len())
        }
        _ => bail!("Unknown config command"),
    }
}

fn render_config(config: &tradecost_config::Config) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to render configuration")
}

fn print_envelope(envelope: &ResponseEnvelope<Value>) -> Result<()> {
    let source = match envelope.source {
        Origin::Live => style("live").green().bold(),
        Origin::Cache => style("cache").cyan().bold(),
        Origin::Fallback => style("fallback").yellow().bold(),
    };
    println!("source: {}", source);

    if let Some(id) = &envelope.queued_id {
        println!("queued: {}", id);
    }
    if let Some(error) = &envelope.error {
        println!("error:  {}", style(error).red());
    }
    if let Some(value) = &envelope.value {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

fn styled_state(state: CircuitState) -> console::StyledObject<CircuitState> {
    match state {
        CircuitState::Closed => style(state).green(),
        CircuitState::HalfOpen => style(state).yellow(),
        CircuitState::Open => style(state).red().bold(),
    }
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} is required", name))
}

fn parse_param(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => bail!("Invalid parameter '{}', expected KEY=VALUE", raw),
    }
}

fn format_timestamp(at: Timestamp) -> String {
    match Local.timestamp_millis_opt(at.as_millis()).single() {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => at.to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}...", &s[..max_len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("broker=ib").unwrap(), ("broker", "ib"));
        assert_eq!(parse_param("q=a=b").unwrap(), ("q", "a=b"));
        assert_eq!(parse_param("empty=").unwrap(), ("empty", ""));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_format_timestamp() {
        let formatted = format_timestamp(Timestamp::from_millis(1_700_000_000_000));
        assert_eq!(formatted.len(), "2023-11-14 22:13:20".len());
        assert!(formatted.starts_with("2023-11-1"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("12345678", 8), "12345678");
        assert_eq!(truncate("123456789", 8), "12345678...");
    }

    #[test]
    fn test_config_show_renders_sections() {
        let rendered = render_config(&tradecost_config::Config::default()).unwrap();
        assert!(rendered.contains("[circuit]"));
        assert!(rendered.contains("failure_threshold = 5"));
    }
}
