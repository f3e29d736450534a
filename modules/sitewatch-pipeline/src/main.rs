use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use sitewatch_archive::ArticleFetcher;
use sitewatch_common::{Config, FileConfig};
use sitewatch_pipeline::budget::RunContext;
use sitewatch_pipeline::llm::ClaudeLocator;
use sitewatch_pipeline::pipeline::{Pipeline, RunOptions, Services};
use sitewatch_pipeline::resolver::geocoder::NominatimGeocoder;
use sitewatch_pipeline::stats::RunStats;
use sitewatch_pipeline::store::JsonStore;
use sitewatch_pipeline::traits::Locator;

#[derive(Parser)]
#[command(name = "sitewatch", about = "Data center project extraction, dedup and geocoding")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Items processed per stage
    #[arg(long, global = true)]
    limit: Option<usize>,

    /// Compute and report without saving anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Write resolver results back to projects (default)
    #[arg(long, global = true, overrides_with = "no_update")]
    update: bool,

    /// Report resolver results without applying them
    #[arg(long, global = true, overrides_with = "update")]
    no_update: bool,

    /// Paid external calls for this run (0 = unlimited). Overrides the config file.
    #[arg(long, global = true)]
    max_api_calls: Option<u64>,

    /// Wall-clock budget for this run. Overrides the config file.
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    /// Enable the language-model strategy (needs ANTHROPIC_API_KEY)
    #[arg(long, global = true)]
    llm: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Path to config TOML file (overrides SITEWATCH_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store directory (overrides SITEWATCH_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Clone, Copy, Debug)]
enum Command {
    /// Extract project cards from announcement mentions
    Extract,
    /// Merge cards into canonical projects
    Canonicalize,
    /// Resolve project coordinates
    Resolve,
    /// Check coordinates against the reference table
    Validate,
    /// Re-work unknown, unresolved and incorrect projects
    Triage,
    /// All stages in order
    Run,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log_json) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }
    match run(cli).await {
        Ok(stats) => {
            println!("{stats}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("sitewatch_pipeline=info".parse()?);
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<RunStats> {
    dotenvy::dotenv().ok();

    let mut config = Config::from_env();
    if let Some(path) = cli.config.clone() {
        config.config_path = path;
    }
    if let Some(dir) = cli.data_dir.clone() {
        config.data_dir = dir;
    }
    config.log_redacted();

    let file = FileConfig::load(&config.config_path)?;
    let mut store = JsonStore::open(&config.data_dir)?;
    info!(
        command = ?cli.command,
        region = file.region.name.as_str(),
        mentions = store.mentions().len(),
        projects = store.projects.len(),
        "Sitewatch starting"
    );

    let opts = RunOptions {
        limit: cli.limit,
        dry_run: cli.dry_run,
        write_back: cli.update || !cli.no_update,
        allow_llm: cli.llm,
        max_api_calls: cli.max_api_calls,
        deadline: cli.deadline_secs.map(Duration::from_secs),
    };
    let services = build_services(&config, &file, cli.llm)?;
    let today = chrono::Utc::now().date_naive();
    let pipeline = Pipeline::new(file, services, opts, today)?;

    let mut ctx = pipeline.context();
    let mut stats = RunStats {
        dry_run: cli.dry_run,
        ..Default::default()
    };
    run_command(&pipeline, cli.command, &mut store, &mut ctx, &mut stats).await?;
    Ok(stats)
}

fn build_services(config: &Config, file: &FileConfig, llm: bool) -> Result<Services> {
    let timeout = Duration::from_secs(file.retry.timeout_secs);
    let fetcher = ArticleFetcher::new(&file.geocoder.user_agent, timeout)
        .context("failed to build article fetcher")?;
    let geocoder = NominatimGeocoder::new(
        &file.geocoder,
        &file.region.bbox,
        config.geocoder_api_key.clone(),
        timeout,
    )
    .context("failed to build geocoder client")?;
    let locator: Option<Arc<dyn Locator>> = if llm {
        let key = config.require_anthropic_key()?;
        Some(Arc::new(ClaudeLocator::new(key, &file.llm, timeout)))
    } else {
        None
    };
    Ok(Services {
        articles: Some(Arc::new(fetcher)),
        geocoder: Some(Arc::new(geocoder)),
        locator,
    })
}

async fn run_command(
    pipeline: &Pipeline,
    command: Command,
    store: &mut JsonStore,
    ctx: &mut RunContext,
    stats: &mut RunStats,
) -> Result<()> {
    match command {
        Command::Extract => {
            pipeline.extract(store, ctx, stats).await?;
        }
        Command::Canonicalize => {
            pipeline.canonicalize(store, ctx, stats)?;
        }
        Command::Resolve => {
            pipeline.resolve(store, ctx, stats).await?;
        }
        Command::Validate => {
            pipeline.validate(store, stats)?;
        }
        Command::Triage => {
            pipeline.triage(store, ctx, stats).await?;
        }
        Command::Run => {
            pipeline.run_all(store, ctx, stats).await?;
        }
    }
    Ok(())
}
