use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ghidrainsight_core::logging::init_logging;
use ghidrainsight_core::orchestrator::AnalysisReport;
use ghidrainsight_core::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ghidrainsight")]
#[command(about = "Resilient, multi-region orchestration for binary analysis")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the per-user config location)
    #[arg(short, long, global = true, env = "GHIDRAINSIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum DispatchMode {
    /// Run every feature over the whole binary
    Features,
    /// Split the binary into chunks and run the first feature on each
    Chunks,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a binary file
    Analyze {
        /// Path to the binary
        file: PathBuf,

        /// Comma-separated feature list
        #[arg(short, long, value_delimiter = ',', default_value = "basic_info,strings")]
        features: Vec<String>,

        /// Dispatch mode
        #[arg(short, long, value_enum, default_value_t = DispatchMode::Features)]
        mode: DispatchMode,

        /// Chunk size in bytes for chunk mode (defaults to dispatch.chunk_size)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Probe every configured region and show the routing decision
    Regions,

    /// Replicate a JSON document to all replication regions
    Replicate {
        /// JSON file to send
        file: PathBuf,
    },

    /// Show worker health and host statistics
    Worker,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        InsightConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if cli.debug {
        config.logging.level = "debug".to_string();
    }
    if cli.json_logs {
        config.logging.json = true;
    }

    // Keep the file writer alive until exit
    let _log_guard = init_logging(&config.logging).context("Failed to initialize logging")?;

    match cli.command {
        Commands::Analyze {
            file,
            features,
            mode,
            chunk_size,
        } => analyze(&config, &file, features, mode, chunk_size).await?,
        Commands::Regions => show_regions(&config).await?,
        Commands::Replicate { file } => replicate(&config, &file).await?,
        Commands::Worker => show_worker(&config).await?,
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn analyze(
    config: &InsightConfig,
    file: &Path,
    features: Vec<String>,
    mode: DispatchMode,
    chunk_size: Option<usize>,
) -> Result<()> {
    let data = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let data: Arc<[u8]> = data.into();

    let orchestrator = AnalysisOrchestrator::from_config(config, Arc::new(BasicEngine::new()))?;
    if config.region.enabled {
        orchestrator.regions().check_all_regions().await;
    }

    let report = match mode {
        DispatchMode::Features => orchestrator.analyze(data, features).await,
        DispatchMode::Chunks => {
            let chunk_size = chunk_size.unwrap_or(config.dispatch.chunk_size);
            orchestrator.analyze_chunks(data, chunk_size, features).await
        }
    };

    let stats = orchestrator.recovery().error_statistics();
    if stats.total_errors > 0 {
        eprintln!(
            "Recovered {} of {} failures",
            stats.recovery_stats.successful, stats.total_errors
        );
    }

    let report: AnalysisReport =
        report.with_context(|| format!("Analysis of {} failed", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn show_regions(config: &InsightConfig) -> Result<()> {
    if !config.region.enabled {
        println!("Multi-region support is disabled");
        println!("Current region: {}", config.region.current_region);
        return Ok(());
    }

    let manager = RegionManager::new(config.region.clone())?;
    manager.check_all_regions().await;

    println!("{:<20} {:<10} {:>12}  ERROR", "REGION", "STATE", "LATENCY");
    for status in manager.region_status() {
        println!(
            "{:<20} {:<10} {:>10.1}ms  {}",
            status.region,
            format!("{:?}", status.state).to_lowercase(),
            status.latency_ms,
            status.last_error.as_deref().unwrap_or("-")
        );
    }

    println!();
    println!("Best region: {}", manager.get_best_region());
    println!("Current region primary: {}", manager.is_current_region_primary());
    Ok(())
}

async fn replicate(config: &InsightConfig, file: &Path) -> Result<()> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let data: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;

    let manager = RegionManager::new(config.region.clone())?;
    if !config.region.replication_enabled {
        anyhow::bail!("Replication is disabled in the configuration");
    }

    let results = manager.replicate_to_all(&data).await;
    for (region, replicated) in &results {
        println!("{:<20} {}", region, if *replicated { "ok" } else { "failed" });
    }

    let failed = results.values().filter(|ok| !**ok).count();
    if failed > 0 {
        anyhow::bail!("Replication failed for {} of {} regions", failed, results.len());
    }
    Ok(())
}

async fn show_worker(config: &InsightConfig) -> Result<()> {
    let dispatcher = TaskDispatcher::new(Arc::new(BasicEngine::new()), &config.dispatch);

    let report = serde_json::json!({
        "health": dispatcher.health_check(),
        "stats": dispatcher.worker_stats().await,
        "max_workers": dispatcher.max_workers(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
