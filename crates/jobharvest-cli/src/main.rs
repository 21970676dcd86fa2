mod export;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use jobharvest_client::{HttpLauncher, default_registry};
use jobharvest_core::models::{JobFilters, JobRecord, ReconcileOutcome, ScrapeMode, TagCategory};
use jobharvest_core::orchestrator::{DEFAULT_LIMIT, Orchestrator, ScrapeRequest};
use jobharvest_core::rate_limiter::RateLimiters;
use jobharvest_core::service::{JobScraper, ScrapeResults};
use jobharvest_core::traits::{BrowserLauncher, JobStore};
use jobharvest_core::ScraperConfig;
use jobharvest_db::{Database, DatabaseConfig, PgJobStore};

use crate::export::{ExportFormat, export_to_file};

#[derive(Parser)]
#[command(name = "jobharvest", version, about = "Job listing scraper with deduplicating storage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query stored job records
    ScrapeStatic {
        #[command(flatten)]
        filters: FilterArgs,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Scrape a job board live and store the results
    ScrapeDynamic {
        #[command(flatten)]
        filters: FilterArgs,

        /// Maximum number of records to fetch
        #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        #[arg(long, value_enum, env = "JOBHARVEST_TRANSPORT", default_value_t = Transport::Http)]
        transport: Transport,
    },

    /// Scrape or query, then write the records to a file
    Export {
        #[arg(long, value_enum, default_value_t = ModeArg::Static)]
        mode: ModeArg,

        /// Destination file
        #[arg(short, long)]
        output: PathBuf,

        /// Output format (defaults to the file extension, then json)
        #[arg(long, value_enum)]
        format: Option<ExportFormat>,

        #[command(flatten)]
        filters: FilterArgs,

        #[command(flatten)]
        window: WindowArgs,

        #[arg(long, value_enum, env = "JOBHARVEST_TRANSPORT", default_value_t = Transport::Http)]
        transport: Transport,
    },

    /// Show the most used tags
    Tags {
        /// Number of tags to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Only show tags in this category (e.g. technology, location)
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Show store-wide counters
    Stats,
}

#[derive(Args, Debug, Clone, Default)]
struct FilterArgs {
    /// Search text (matched against titles for stored records)
    #[arg(short, long, default_value = "")]
    query: String,

    /// Job board to use (linkedin, naukri)
    #[arg(short, long, env = "JOBHARVEST_SOURCE")]
    source: Option<String>,

    #[arg(long)]
    company: Option<String>,

    #[arg(long)]
    location: Option<String>,

    #[arg(long)]
    is_remote: Option<bool>,

    /// Only records carrying any of these tags
    #[arg(long = "tag")]
    tags: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct WindowArgs {
    /// Maximum number of records (1-1000)
    #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
    limit: usize,

    /// Records to skip (static mode only)
    #[arg(long, default_value_t = 0)]
    offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Static,
    Dynamic,
}

impl From<ModeArg> for ScrapeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Static => ScrapeMode::Static,
            ModeArg::Dynamic => ScrapeMode::Dynamic,
        }
    }
}

/// How pages are fetched during live scrapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Plain HTTP; no script execution
    Http,
    /// Headless Chromium
    #[cfg(feature = "browser")]
    Chromium,
}

impl FilterArgs {
    fn into_request(self, mode: ScrapeMode, limit: usize, offset: usize) -> ScrapeRequest {
        let filters = JobFilters {
            query: None,
            source: None,
            company: self.company,
            location: self.location,
            is_remote: self.is_remote,
            tags: self.tags,
        };
        ScrapeRequest {
            mode,
            source: self.source,
            query: self.query,
            filters,
            limit,
            offset,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("jobharvest=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = connect_db().await?;

    match cli.command {
        Commands::ScrapeStatic { filters, window } => {
            let request = filters.into_request(ScrapeMode::Static, window.limit, window.offset);
            let results = run(&request, Transport::Http, store).await?;
            print_records(&results.into_records())?;
        }
        Commands::ScrapeDynamic {
            filters,
            limit,
            transport,
        } => {
            let request = filters.into_request(ScrapeMode::Dynamic, limit, 0);
            let results = run(&request, transport, store).await?;
            print_records(&results.into_records())?;
        }
        Commands::Export {
            mode,
            output,
            format,
            filters,
            window,
            transport,
        } => {
            let request = filters.into_request(mode.into(), window.limit, window.offset);
            let format = ExportFormat::resolve(format, &output);
            let records = run(&request, transport, store).await?.into_records();
            export_to_file(&records, &output, format)?;
            println!("Exported {} records to {}", records.len(), output.display());
        }
        Commands::Tags { limit, category } => {
            let category = category
                .map(|c| c.parse::<TagCategory>())
                .transpose()
                .map_err(|e| anyhow::anyhow!(e))?;
            cmd_tags(&store, limit, category).await?;
        }
        Commands::Stats => cmd_stats(&store).await?,
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<PgJobStore> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(db.job_store())
}

fn build_scraper<L: BrowserLauncher>(
    launcher: L,
    store: PgJobStore,
    config: &ScraperConfig,
) -> JobScraper<L, PgJobStore> {
    let orchestrator = Orchestrator::new(
        default_registry(),
        RateLimiters::new(config.rate_limit),
        config.pipeline.clone(),
        store,
    );
    JobScraper::new(orchestrator, launcher)
}

async fn run(request: &ScrapeRequest, transport: Transport, store: PgJobStore) -> Result<ScrapeResults> {
    let config = ScraperConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;

    // Ctrl-C stops a live scrape; records stored so far are kept.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing current record");
            on_signal.cancel();
        }
    });

    let results = match (request.mode, transport) {
        #[cfg(feature = "browser")]
        (ScrapeMode::Dynamic, Transport::Chromium) => {
            let launcher = jobharvest_client::ChromiumLauncher::new()
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            build_scraper(launcher, store, &config)
                .scrape(request, cancel)
                .await
        }
        _ => {
            build_scraper(HttpLauncher::new(), store, &config)
                .scrape(request, cancel)
                .await
        }
    }
    .map_err(|e| anyhow::anyhow!(e))?;

    if let ScrapeResults::Dynamic { jobs, error } = &results {
        let count = |outcome| jobs.iter().filter(|j| j.outcome == Some(outcome)).count();
        tracing::info!(
            fetched = jobs.len(),
            inserted = count(ReconcileOutcome::Inserted),
            updated = count(ReconcileOutcome::Updated),
            unchanged = count(ReconcileOutcome::Unchanged),
            unpersisted = jobs.iter().filter(|j| !j.is_persisted()).count(),
            "Live scrape finished"
        );
        if let Some(e) = error {
            tracing::warn!(error = %e, category = e.category(), "Live scrape stopped early");
        }
    }

    Ok(results)
}

fn print_records(records: &[JobRecord]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(records)?);
    Ok(())
}

async fn cmd_tags(store: &PgJobStore, limit: usize, category: Option<TagCategory>) -> Result<()> {
    let tags = store
        .popular_tags(limit, category)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    if tags.is_empty() {
        println!("No tags found");
        return Ok(());
    }

    for tag in &tags {
        println!("  {:>6}  {:<40} ({})", tag.count, tag.name, tag.category);
    }
    println!("\nTotal: {} tags", tags.len());

    Ok(())
}

async fn cmd_stats(store: &PgJobStore) -> Result<()> {
    let stats = store.job_stats().await.map_err(|e| anyhow::anyhow!(e))?;
    let tags = store
        .tag_stats(chrono::Utc::now())
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!("Total jobs:  {}", stats.total_jobs);
    println!("Remote jobs: {}", stats.remote_jobs);
    if !stats.jobs_by_source.is_empty() {
        println!("\nBy source:");
        for (source, count) in &stats.jobs_by_source {
            println!("  {source:<12} {count}");
        }
    }

    println!("\nTotal tags:  {}", tags.total_tags);
    println!("Tag growth:  {:+.1}% week over week", tags.growth_rate);
    if !tags.tags_by_category.is_empty() {
        println!("\nTags by category:");
        for (category, count) in &tags.tags_by_category {
            println!("  {:<12} {count}", category.as_str());
        }
    }
    if !tags.most_popular.is_empty() {
        println!("\nMost popular:");
        for tag in &tags.most_popular {
            println!("  {:>6}  {}", tag.count, tag.name);
        }
    }
    if !tags.recent_tags.is_empty() {
        println!("\nNew this week:");
        for tag in &tags.recent_tags {
            println!("  {}  {}", tag.created_at.format("%Y-%m-%d"), tag.name);
        }
    }

    Ok(())
}
