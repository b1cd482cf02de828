use analysis_engine::AnalysisEngine;
use anyhow::Context;
use background_service::{BackgroundService, FeedLimits, MentionProcessor};
use bluesky_client::{BlueskyClient, QueueConfig, RequestQueue};
use clap::Parser;
use database::{Database, DedupGuard, MentionStore};
use reputebot_core::BotConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str =
    "reputebot=info,background_service=info,bluesky_client=info,database=info,analysis_engine=info";

/// Replies to Bluesky mentions with a short "should you follow" report.
#[derive(Debug, Parser)]
#[command(name = "reputebot", version, about)]
struct Args {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, env = "REPUTEBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Forget every recorded mention before starting.
    #[arg(long)]
    reset_ledger: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();
    info!("Starting ReputeBot {}", env!("CARGO_PKG_VERSION"));

    let config = BotConfig::load_or_default(args.config.as_deref())
        .context("failed to load configuration")?;
    let (identifier, password) = config
        .bluesky
        .credentials()
        .context("missing Bluesky credentials")?;

    let client = BlueskyClient::new(
        &config.bluesky.service_url,
        identifier,
        password,
        Duration::from_secs(config.rate_limit.request_timeout_secs),
    )?;
    client.login().await.context("Bluesky login failed")?;

    let queue = RequestQueue::start(Arc::new(client), QueueConfig::from(&config));

    let db = Arc::new(
        Database::connect(&config.database.url)
            .await
            .with_context(|| format!("failed to open ledger at {}", config.database.url))?,
    );
    if args.reset_ledger {
        let removed = db.reset().await?;
        warn!("Ledger reset, {} recorded mentions forgotten", removed);
    }

    let guard = Arc::new(DedupGuard::new(db.clone()));
    let answered = guard.warm_up().await?;
    info!("Ledger holds {} answered mentions", answered);

    let engine = AnalysisEngine::from_settings(&config.analysis)?;
    let processor = MentionProcessor::new(
        queue.clone(),
        guard,
        Arc::new(engine),
        FeedLimits::from(&config.analysis),
    );
    let service = BackgroundService::new(queue.clone(), db.clone(), processor, config.polling);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // Dropping the sender would stop the service.
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });

    let result = service.run(shutdown_rx).await;

    queue.shutdown().await;
    log_request_summary(&queue).await;
    db.close().await;

    match result {
        Ok(()) => {
            info!("ReputeBot stopped");
            Ok(())
        }
        Err(e) => {
            error!("ReputeBot halted: {}", e);
            Err(e.into())
        }
    }
}

async fn log_request_summary(queue: &RequestQueue) {
    let metrics = queue.metrics().get_metrics().await;
    info!(
        "Dispatched {} requests: {} succeeded, {} throttled, {} transient and {} permanent failures",
        metrics.total_dispatches,
        metrics.successful_requests,
        metrics.throttled_requests,
        metrics.transient_failures,
        metrics.permanent_failures
    );

    let mut kinds: Vec<_> = metrics.requests_by_kind.iter().collect();
    kinds.sort_by_key(|(kind, _)| kind.as_str());
    for (kind, stats) in kinds {
        info!(
            "  {}: {} dispatches, {:.0}% ok, avg {:?}",
            kind,
            stats.dispatched,
            stats.success_rate() * 100.0,
            stats.average_response_time()
        );
    }
}
