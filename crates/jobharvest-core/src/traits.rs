use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{
    JobFilters, JobRecord, JobStats, TagCategory, TagRecord, TagStats, UpsertOutcome,
};

/// One browser session, used by exactly one scrape invocation.
///
/// Page navigation and DOM querying are opaque to the core; implementations
/// decide the transport (plain HTTP, headless Chromium, ...).
pub trait BrowserSession: Send + Sync {
    /// Load `url` into the session.
    fn navigate(&self, url: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Wait up to `timeout` for `selector` to match. `Ok(false)` on timeout.
    fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// The current page content (HTML).
    fn content(&self) -> impl Future<Output = Result<String, AppError>> + Send;

    /// Run a script in the page context.
    fn execute_script(&self, script: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Whether this transport can execute page scripts at all.
    fn supports_scripts(&self) -> bool;

    /// Turn page script execution on or off for the rest of the session.
    fn set_script_execution(
        &self,
        enabled: bool,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Provisions a fresh [`BrowserSession`] per scrape invocation.
///
/// Sessions are single-use; pooling is left to implementations.
pub trait BrowserLauncher: Send + Sync + Clone {
    type Session: BrowserSession;

    fn launch(&self) -> impl Future<Output = Result<Self::Session, AppError>> + Send;
}

/// Persists job records and tag aggregates.
pub trait JobStore: Send + Sync + Clone {
    /// Look up a record by its `(source, job_url)` identity.
    fn find_by_key(
        &self,
        source: &str,
        job_url: &str,
    ) -> impl Future<Output = Result<Option<JobRecord>, AppError>> + Send;

    /// Insert or update a record in one atomic call.
    ///
    /// On conflict only the volatile fields (salary, tags, posted date) and
    /// `updated_at` are overwritten; `created_at` is never touched.
    fn upsert(
        &self,
        record: &JobRecord,
    ) -> impl Future<Output = Result<UpsertOutcome, AppError>> + Send;

    /// Overwrite the volatile fields of an existing record, but only while
    /// its stored `updated_at` still equals `expected`.
    ///
    /// `Ok(false)` means another writer changed the record since it was read.
    fn update_if_current(
        &self,
        record: &JobRecord,
        expected: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, AppError>> + Send;

    /// Atomically add one to a tag's count, creating the tag if needed.
    fn increment_tag_count(&self, name: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Atomically subtract one from a tag's count, floored at zero.
    fn decrement_tag_count(&self, name: &str) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Stored records matching `filters`, newest posting first.
    fn query(
        &self,
        filters: &JobFilters,
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = Result<Vec<JobRecord>, AppError>> + Send;

    /// Number of stored records matching `filters`.
    fn count(&self, filters: &JobFilters) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn get_tag(&self, name: &str)
    -> impl Future<Output = Result<Option<TagRecord>, AppError>> + Send;

    /// Tags with the highest counts, optionally restricted to a category.
    fn popular_tags(
        &self,
        limit: usize,
        category: Option<TagCategory>,
    ) -> impl Future<Output = Result<Vec<TagRecord>, AppError>> + Send;

    fn job_stats(&self) -> impl Future<Output = Result<JobStats, AppError>> + Send;

    /// Tag totals, per-category counts and week-over-week tag growth as of `now`.
    fn tag_stats(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<TagStats, AppError>> + Send;
}
