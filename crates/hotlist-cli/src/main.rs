use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use hotlist_pipeline::{
    maybe_build_scheduler, AnalysisPipeline, CategoryRegistry, HttpScoreGateway,
    PgRankingGateway, PipelineConfig, ProviderListingSource, RetentionJob,
};
use hotlist_provider::{FallbackCoordinator, ScrapeClient, ScrapeConfig};
use hotlist_store::{
    GovernorConfig, JobLock, KvStore, LogNotifier, MemoryKvStore, TieredCache, VolumeGovernor,
};

#[derive(Debug, Parser)]
#[command(name = "hotlist-cli")]
#[command(about = "Hotlist trending-product aggregation command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the daily analysis once and print the committed summary.
    Analyze {
        /// Recommendation date (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Purge ranking rows past the retention window.
    Purge,
    /// Print provider usage counters and availability.
    Status,
    /// Run the cron scheduler until interrupted.
    Schedule,
}

struct App {
    pipeline: Arc<AnalysisPipeline>,
    retention: Arc<RetentionJob>,
    governor: VolumeGovernor,
    client: Arc<ScrapeClient>,
    config: PipelineConfig,
}

async fn build_app() -> Result<App> {
    let config = PipelineConfig::from_env();

    // Counters, caches and locks share one store. The in-process store is
    // the single-node default; multi-instance deployments plug a networked
    // KvStore in here.
    let store: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    let governor = VolumeGovernor::new(
        store.clone(),
        Arc::new(LogNotifier),
        GovernorConfig::from_env(),
    );
    let coordinator =
        FallbackCoordinator::new(TieredCache::new(store.clone()), governor.clone());
    let lock = JobLock::new(store);

    let client = Arc::new(ScrapeClient::new(ScrapeConfig::from_env())?);
    let source = ProviderListingSource::new(
        ScrapeClient::new(ScrapeConfig::from_env())?,
        config.marketplace_domain.clone(),
    );

    let scorer = HttpScoreGateway::new(
        std::env::var("HOTLIST_SCORER_URL").unwrap_or_default(),
        std::env::var("HOTLIST_SCORER_API_KEY").unwrap_or_default(),
    )?;

    let rankings = PgRankingGateway::connect(&config.database_url)
        .await
        .context("connecting to the ranking database")?;
    rankings.ensure_schema().await?;
    let rankings = Arc::new(rankings);

    let registry = CategoryRegistry::load(&config.categories_path)?;

    let pipeline = Arc::new(AnalysisPipeline::new(
        registry,
        Arc::new(source),
        coordinator,
        Arc::new(scorer),
        rankings.clone(),
        lock.clone(),
        Arc::new(LogNotifier),
    ));
    let retention = Arc::new(RetentionJob::new(rankings, lock));

    Ok(App {
        pipeline,
        retention,
        governor,
        client,
        config,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Analyze { date: None }) {
        Commands::Analyze { date } => {
            let app = build_app().await?;
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            match app.pipeline.run_once(date).await? {
                Some(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
                None => println!("analysis skipped: another instance holds the job"),
            }
        }
        Commands::Purge => {
            let app = build_app().await?;
            match app.retention.run_once(Utc::now().date_naive()).await? {
                Some(purged) => println!("purged {purged} ranking rows"),
                None => println!("purge skipped: another instance holds the job"),
            }
        }
        Commands::Status => {
            let app = build_app().await?;
            println!("{}", app.governor.usage_summary().await);
            println!(
                "provider available: {}",
                if app.client.is_available().await { "yes" } else { "no" }
            );
            for alert in app.governor.recent_alerts(Utc::now().date_naive()).await {
                println!(
                    "alert today: {} ({}/{})",
                    alert.alert_type, alert.current_count, alert.threshold
                );
            }
        }
        Commands::Schedule => {
            let app = build_app().await?;
            let Some(sched) = maybe_build_scheduler(
                &app.config,
                app.pipeline.clone(),
                app.retention.clone(),
            )
            .await?
            else {
                println!("scheduler disabled; set HOTLIST_SCHEDULER_ENABLED=true");
                return Ok(());
            };
            sched.start().await.context("starting scheduler")?;
            info!(
                analysis = %app.config.analysis_cron,
                cleanup = %app.config.cleanup_cron,
                "scheduler running, ctrl-c to stop"
            );
            tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
        }
    }

    Ok(())
}
