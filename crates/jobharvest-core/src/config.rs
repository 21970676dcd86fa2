use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::pipeline::PipelineConfig;
use crate::rate_limiter::RateLimiterConfig;

/// Scraper tunables shared by the CLI and the server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScraperConfig {
    /// Bucket shape applied to every source.
    pub rate_limit: RateLimiterConfig,
    pub pipeline: PipelineConfig,
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    expected: &str,
) -> Result<T, AppError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigError(format!("Invalid {name} '{raw}': must be {expected}"))
        }),
    }
}

impl ScraperConfig {
    /// Read configuration from environment variables.
    ///
    /// - `JOBHARVEST_REQUESTS_PER_SEC` (optional, defaults to 1.0)
    /// - `JOBHARVEST_BUCKET_CAPACITY` (optional, defaults to 1)
    /// - `JOBHARVEST_WAIT_TIMEOUT_SECS` (optional, defaults to 10)
    /// - `JOBHARVEST_PAGE_ATTEMPTS` (optional, defaults to 3)
    /// - `JOBHARVEST_EMPTY_PAGE_THRESHOLD` (optional, defaults to 3)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let rate: f64 = parse_var(
            &lookup,
            "JOBHARVEST_REQUESTS_PER_SEC",
            defaults.rate_limit.refill_rate,
            "a non-negative number",
        )?;
        if !rate.is_finite() || rate < 0.0 {
            return Err(AppError::ConfigError(
                "JOBHARVEST_REQUESTS_PER_SEC must be a non-negative number".into(),
            ));
        }
        let capacity: u32 = parse_var(
            &lookup,
            "JOBHARVEST_BUCKET_CAPACITY",
            defaults.rate_limit.capacity,
            "a non-negative integer",
        )?;
        let wait_secs: u64 = parse_var(
            &lookup,
            "JOBHARVEST_WAIT_TIMEOUT_SECS",
            defaults.pipeline.wait_timeout.as_secs(),
            "a positive integer",
        )?;
        let page_attempts: u32 = parse_var(
            &lookup,
            "JOBHARVEST_PAGE_ATTEMPTS",
            defaults.pipeline.page_attempts,
            "a positive integer",
        )?;
        let empty_page_threshold: u32 = parse_var(
            &lookup,
            "JOBHARVEST_EMPTY_PAGE_THRESHOLD",
            defaults.pipeline.empty_page_threshold,
            "a positive integer",
        )?;

        for (name, value) in [
            ("JOBHARVEST_WAIT_TIMEOUT_SECS", wait_secs),
            ("JOBHARVEST_PAGE_ATTEMPTS", u64::from(page_attempts)),
            ("JOBHARVEST_EMPTY_PAGE_THRESHOLD", u64::from(empty_page_threshold)),
        ] {
            if value == 0 {
                return Err(AppError::ConfigError(format!("{name} must be at least 1")));
            }
        }

        Ok(Self {
            rate_limit: RateLimiterConfig::new(capacity, rate),
            pipeline: PipelineConfig {
                wait_timeout: Duration::from_secs(wait_secs),
                page_attempts,
                empty_page_threshold,
                ..defaults.pipeline
            },
        })
    }
}
