use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use shelfwatch::application::backoff::DelayPolicy;
use shelfwatch::application::orchestrator::{
    BatchSelection, OrchestratorSettings, ScrapeOrchestrator,
};
use shelfwatch::domain::outcome::RunSummary;
use shelfwatch::infrastructure::browser::ChromiumSurfaceFactory;
use shelfwatch::infrastructure::config::AppConfig;
use shelfwatch::infrastructure::extract::{SiteDetailExtractor, SiteListingExtractor};
use shelfwatch::infrastructure::logging::init_logging;
use shelfwatch::infrastructure::repository::SqliteCatalog;
use shelfwatch::infrastructure::scroller::ScrollConfig;

#[derive(Parser)]
#[command(name = "shelfwatch", about = "Best-seller catalog scraper", version)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also log to a daily-rolling file under logs/.
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape product detail pages for catalog products.
    Details(DetailsArgs),
    /// Walk a best-seller listing and record the snapshot.
    Listing(ListingArgs),
}

#[derive(Args)]
struct DetailsArgs {
    /// Scrape a single product as a smoke test.
    #[arg(long, conflicts_with_all = ["latest", "all", "limit"])]
    test: bool,

    /// Restrict the batch to products from the most recent listing run.
    #[arg(long, conflicts_with = "test")]
    latest: bool,

    /// Process the whole queue instead of the configured batch size.
    #[arg(long, conflicts_with = "limit")]
    all: bool,

    /// Maximum number of products in the batch.
    #[arg(long)]
    limit: Option<u32>,

    /// Re-scrape threshold in days, overriding the configured value.
    #[arg(long)]
    days: Option<u32>,

    /// Run the browser with a visible window.
    #[arg(long)]
    visible: bool,

    /// Ignore the updated-today gate and the staleness threshold.
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct ListingArgs {
    /// Category label stored with the snapshot.
    #[arg(long)]
    category: String,

    /// Listing start URL.
    #[arg(long)]
    url: String,

    /// Run the browser with a visible window.
    #[arg(long)]
    visible: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_file)?;

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load_or_create(&config_path).await?;

    // Only the catalog connection is fatal; everything downstream degrades
    // into per-item outcomes.
    let catalog = SqliteCatalog::connect(&config.database.url).await?;
    catalog.migrate().await?;
    let catalog = Arc::new(catalog);

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current item");
            ctrl_c_token.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt, aborting");
            std::process::exit(130);
        }
    });

    match cli.command {
        Command::Details(args) => {
            if args.visible {
                config.browser.headless = false;
            }
            let orchestrator = build_orchestrator(
                &config,
                catalog,
                args.days,
                args.force,
                "https://www.amazon.com",
            )?;
            let selection = batch_selection(&args, &config);
            run_details(&orchestrator, selection, &config, &cancel).await?;
        }
        Command::Listing(args) => {
            if args.visible {
                config.browser.headless = false;
            }
            let orchestrator = build_orchestrator(&config, catalog, None, false, &args.url)?;
            let report = orchestrator
                .run_listing(&args.category, &args.url, &cancel)
                .await?;
            println!(
                "Listing run for {}: {} products over {} pages, {} rows recorded",
                report.category,
                report.products_scraped,
                report.pages_processed,
                report.rows_recorded
            );
        }
    }
    Ok(())
}

fn build_orchestrator(
    config: &AppConfig,
    catalog: Arc<SqliteCatalog>,
    days_override: Option<u32>,
    force: bool,
    base_url: &str,
) -> Result<ScrapeOrchestrator> {
    let base = Url::parse(base_url).context("invalid listing URL")?;
    let settings = OrchestratorSettings {
        stale_after_days: days_override.unwrap_or(config.batch.stale_after_days),
        force,
        page_load_wait: Duration::from_millis(config.browser.page_load_wait_ms),
    };
    Ok(ScrapeOrchestrator::new(
        catalog,
        Arc::new(ChromiumSurfaceFactory::new(config.browser.clone())),
        Arc::new(SiteDetailExtractor::new()),
        Arc::new(SiteListingExtractor::new(base)),
        ScrollConfig::from(&config.scrolling),
        DelayPolicy::new(config.delays.clone()),
        settings,
    ))
}

fn batch_selection(args: &DetailsArgs, config: &AppConfig) -> BatchSelection {
    if args.test {
        return BatchSelection::Single;
    }
    let limit = if args.all {
        None
    } else {
        Some(args.limit.unwrap_or(config.batch.default_limit))
    };
    if args.latest {
        BatchSelection::LatestBatch { limit }
    } else {
        BatchSelection::Pending { limit }
    }
}

/// Run the batch, re-running it while retryable failures remain, up to the
/// configured attempt ceiling. Gating keeps already-successful items out of
/// the re-runs.
async fn run_details(
    orchestrator: &ScrapeOrchestrator,
    selection: BatchSelection,
    config: &AppConfig,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut attempt = 1;
    loop {
        let summary = orchestrator.run_batch(selection, cancel).await?;
        print_summary(&summary, attempt);

        if summary.retryable_failures() == 0 || summary.interrupted || cancel.is_cancelled() {
            break;
        }
        if attempt >= config.batch.max_batch_attempts {
            warn!(
                "Giving up after {} attempts with {} retryable failures",
                attempt,
                summary.retryable_failures()
            );
            break;
        }
        attempt += 1;
        info!(
            "{} retryable failures, re-running batch (attempt {}/{})",
            summary.retryable_failures(),
            attempt,
            config.batch.max_batch_attempts
        );
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, attempt: u32) {
    println!("Batch attempt {attempt}: {} products", summary.total);
    println!("  success:        {}", summary.success);
    println!("  skipped:        {}", summary.skipped);
    println!("  no data:        {}", summary.no_data);
    println!("  server blocked: {}", summary.server_blocked);
    println!("  network errors: {}", summary.network_errors);
    println!("  parse errors:   {}", summary.parse_errors);
    println!("  unknown errors: {}", summary.unknown_errors);
    if summary.interrupted {
        println!("  run interrupted by cancellation");
    }
}
