pub mod adapter;
pub mod config;
pub mod error;
pub mod models;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod rate_limiter;
pub mod reconcile;
pub mod service;
pub mod tagging;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use adapter::{ParseError, ScriptPolicy, SourceAdapter, SourceRegistry};
pub use config::ScraperConfig;
pub use error::{AppError, ScrapeContext};
pub use models::{
    JobFilters, JobRecord, JobStats, ReconcileOutcome, ScrapeMode, ScrapedJob, TagCategory,
    TagRecord, TagStats, UpsertOutcome,
};
pub use orchestrator::{Orchestrator, ScrapeRequest, ScrapeRun};
pub use pipeline::{ExtractionPipeline, PipelineConfig};
pub use rate_limiter::{BackoffPolicy, RateLimiter, RateLimiterConfig, RateLimiters};
pub use reconcile::DedupReconciler;
pub use service::{JobScraper, ScrapeResults};
pub use traits::{BrowserLauncher, BrowserSession, JobStore};
