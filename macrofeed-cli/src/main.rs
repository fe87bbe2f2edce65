//! Macrofeed CLI: fetch, probe and cache commands.
//!
//! Commands:
//! - `fetch`        acquire series (live, else snapshot) and print headline figures
//! - `probe`        hit every configured endpoint without touching the cache
//! - `cache status` report what the snapshot cache holds
//! - `catalog`      list the configured series, optionally writing them as TOML

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use macrofeed_core::data::{
    AcquireProgress, Acquirer, AcquisitionResult, NoProgress, SnapshotCache, StderrProgress,
};
use macrofeed_core::stats::{summarize, SeriesSummary};
use macrofeed_core::{Config, SeriesDescriptor};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "macrofeed", about = "Macrofeed: economic indicator series with offline fallback")]
struct Cli {
    /// Path to a TOML config file. Defaults to the built-in catalog.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Snapshot cache directory. Overrides the config file.
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire series and print the latest figures.
    Fetch {
        /// Series names (e.g. TPM BADLAR). Defaults to every configured series.
        names: Vec<String>,

        /// Number of trailing observations to print.
        #[arg(long, default_value_t = 5)]
        tail: usize,

        /// Print machine-readable JSON to stdout.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Check connectivity to every endpoint. Does not read or write the cache.
    Probe {
        /// Series names. Defaults to every configured series.
        names: Vec<String>,
    },
    /// Snapshot cache commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// List configured series.
    Catalog {
        /// Write the effective configuration to this TOML file.
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report date range and row count per configured series.
    Status,
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.cache_dir)?;

    match cli.command {
        Commands::Fetch { names, tail, json } => run_fetch(&config, &names, tail, json),
        Commands::Probe { names } => run_probe(&config, &names),
        Commands::Cache {
            action: CacheAction::Status,
        } => run_cache_status(&config),
        Commands::Catalog { write } => run_catalog(&config, write.as_deref()),
    }
}

/// Logs go to stderr so stdout stays parseable. `RUST_LOG` overrides the
/// default `macrofeed=info`.
fn init_tracing() -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::default().add_directive("macrofeed=info".parse()?),
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
    Ok(())
}

fn load_config(path: Option<&Path>, cache_dir: Option<PathBuf>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default_argentina(),
    };
    if let Some(dir) = cache_dir {
        config.cache.dir = dir;
    }
    Ok(config)
}

fn run_fetch(config: &Config, names: &[String], tail: usize, as_json: bool) -> Result<()> {
    let descriptors = config.select(names)?;
    let acquirer = Acquirer::from_config(config);
    let progress: &dyn AcquireProgress = if as_json { &NoProgress } else { &StderrProgress };

    let summary = acquirer.acquire_all(&descriptors, progress);
    if let Some((name, err)) = summary.rejected.first() {
        anyhow::bail!("series '{name}' is misconfigured: {err}");
    }

    if as_json {
        let items: Vec<_> = summary
            .results
            .iter()
            .zip(&descriptors)
            .map(|(result, descriptor)| result_json(result, descriptor, tail))
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    for (result, descriptor) in summary.results.iter().zip(&descriptors) {
        print_result(result, descriptor, tail);
    }
    Ok(())
}

fn result_json(result: &AcquisitionResult, descriptor: &SeriesDescriptor, tail: usize) -> serde_json::Value {
    json!({
        "name": result.name,
        "label": descriptor.display_name(),
        "unit": descriptor.unit,
        "provenance": result.provenance,
        "source": result.source,
        "rows": result.series.len(),
        "summary": summarize(&result.series),
        "tail": result.series.tail(tail),
        "failures": result.failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
    })
}

fn print_result(result: &AcquisitionResult, descriptor: &SeriesDescriptor, tail: usize) {
    println!();
    println!(
        "{} ({}) [{}] {} rows{}",
        descriptor.name,
        descriptor.display_name(),
        result.provenance,
        result.series.len(),
        result
            .source
            .as_deref()
            .map(|s| format!(" from {s}"))
            .unwrap_or_default()
    );

    for failure in &result.failures {
        println!("  ! {failure}");
    }

    let Some(summary) = summarize(&result.series) else {
        println!("  no data available");
        return;
    };
    println!("  {}", headline(&summary, &descriptor.unit));

    for obs in result.series.tail(tail) {
        println!("  {}  {:>12.4}", obs.date, obs.value);
    }
}

fn headline(summary: &SeriesSummary, unit: &str) -> String {
    let unit = if unit.is_empty() {
        String::new()
    } else {
        format!(" {unit}")
    };
    format!(
        "latest {} = {:.4}{unit}   chg {}   yoy {}",
        summary.latest.date,
        summary.latest.value,
        format_pct(summary.change_pct),
        format_pct(summary.yoy_pct),
    )
}

fn format_pct(pct: Option<f64>) -> String {
    match pct {
        Some(p) => format!("{p:+.2}%"),
        None => "n/a".into(),
    }
}

fn run_probe(config: &Config, names: &[String]) -> Result<()> {
    let descriptors = config.select(names)?;
    let acquirer = Acquirer::from_config(config);

    let mut ok = 0;
    let mut failed = 0;
    for descriptor in descriptors {
        println!("{}", descriptor.name);
        for probe in acquirer.probe(descriptor)? {
            let ms = probe.elapsed.as_millis();
            match &probe.outcome {
                Ok(series) => {
                    ok += 1;
                    let last = series
                        .last()
                        .map(|o| format!("{} = {}", o.date, o.value))
                        .unwrap_or_default();
                    println!("  OK    {:<40} {:>5} rows  last {last}  ({ms} ms)", probe.endpoint, series.len());
                }
                Err(e) => {
                    failed += 1;
                    println!("  FAIL  {e}  ({ms} ms)");
                }
            }
        }
    }

    println!("\n{ok} endpoint(s) OK, {failed} failed");
    Ok(())
}

fn run_cache_status(config: &Config) -> Result<()> {
    let cache = SnapshotCache::new(&config.cache.dir);
    if !cache.cache_dir().exists() {
        println!("Cache directory does not exist: {}", cache.cache_dir().display());
        return Ok(());
    }

    let names = config.series_names();
    let statuses = cache.status(&names);
    let cached = statuses.iter().filter(|s| s.cached).count();

    println!("Cache: {}", cache.cache_dir().display());
    println!("Series cached: {cached}/{}", statuses.len());
    println!();
    println!("{:<12} {:<25} {:>8}  {:<20}", "Series", "Date Range", "Rows", "Cached At");
    println!("{}", "-".repeat(70));
    for status in &statuses {
        match (status.start_date, status.end_date) {
            (Some(start), Some(end)) if status.cached => println!(
                "{:<12} {:<25} {:>8}  {:<20}",
                status.key,
                format!("{start} to {end}"),
                status.row_count.unwrap_or(0),
                status
                    .cached_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
            ),
            _ if status.cached => println!("{:<12} {:<25}", status.key, "(no metadata)"),
            _ => println!("{:<12} {:<25}", status.key, "(not cached)"),
        }
    }
    Ok(())
}

fn run_catalog(config: &Config, write: Option<&Path>) -> Result<()> {
    println!("{:<10} {:<8} {:<30} {}", "Series", "Freq", "Label", "Endpoints");
    println!("{}", "-".repeat(80));
    for descriptor in &config.series {
        let endpoints: Vec<String> = descriptor.endpoints().map(|e| e.label()).collect();
        println!(
            "{:<10} {:<8} {:<30} {}",
            descriptor.name,
            descriptor.frequency.to_string(),
            descriptor.display_name(),
            endpoints.join(" -> ")
        );
    }

    if let Some(path) = write {
        std::fs::write(path, config.to_toml()?)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("\nConfig written to: {}", path.display());
    }
    Ok(())
}
