//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::adapter::{ParseError, ScriptPolicy, SourceAdapter};
use crate::error::AppError;
use crate::models::{
    JobFilters, JobRecord, JobStats, TAG_STATS_POPULAR, TAG_STATS_RECENT, TAG_STATS_WINDOW_DAYS,
    TagCategory, TagRecord, TagStats, UpsertOutcome,
};
use crate::tagging::categorize;
use crate::traits::{BrowserLauncher, BrowserSession, JobStore};

/// A stored-looking record with the given identity and tags.
pub fn make_record(source: &str, job_url: &str, tags: &[&str]) -> JobRecord {
    let mut record = JobRecord::new(source, job_url, "Rust Engineer", "Acme");
    record.tags = tags.iter().map(|t| t.to_string()).collect();
    record
}

// ---------------------------------------------------------------------------
// MockBrowser
// ---------------------------------------------------------------------------

/// One scripted page load.
#[derive(Debug, Clone)]
pub struct MockPage {
    pub ready: bool,
    pub content: String,
}

impl MockPage {
    /// A ready page whose content holds one entry per line.
    pub fn entries(entries: &[&str]) -> Self {
        Self {
            ready: true,
            content: entries.join("\n"),
        }
    }

    /// A page whose ready marker never shows up.
    pub fn not_ready() -> Self {
        Self {
            ready: false,
            content: String::new(),
        }
    }
}

#[derive(Debug, Default)]
struct BrowserState {
    pages: VecDeque<MockPage>,
    current: Option<MockPage>,
    navigations: Vec<String>,
    scripts: Vec<String>,
    script_execution: Option<bool>,
}

/// Browser that serves a queue of pages, one per navigation.
///
/// Once the queue is empty every navigation lands on a ready, empty page.
#[derive(Debug, Clone)]
pub struct MockBrowser {
    state: Arc<Mutex<BrowserState>>,
    scripts_supported: bool,
}

impl MockBrowser {
    pub fn with_pages(pages: Vec<MockPage>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrowserState {
                pages: pages.into(),
                ..Default::default()
            })),
            scripts_supported: true,
        }
    }

    pub fn without_scripts(mut self) -> Self {
        self.scripts_supported = false;
        self
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().unwrap().scripts.clone()
    }

    pub fn script_execution(&self) -> Option<bool> {
        self.state.lock().unwrap().script_execution
    }
}

impl BrowserSession for MockBrowser {
    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.navigations.push(url.to_string());
        let next = state
            .pages
            .pop_front()
            .unwrap_or_else(|| MockPage::entries(&[]));
        state.current = Some(next);
        Ok(())
    }

    async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<bool, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state.current.as_ref().is_some_and(|p| p.ready))
    }

    async fn content(&self) -> Result<String, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .current
            .as_ref()
            .map(|p| p.content.clone())
            .unwrap_or_default())
    }

    async fn execute_script(&self, script: &str) -> Result<(), AppError> {
        self.state.lock().unwrap().scripts.push(script.to_string());
        Ok(())
    }

    fn supports_scripts(&self) -> bool {
        self.scripts_supported
    }

    async fn set_script_execution(&self, enabled: bool) -> Result<(), AppError> {
        self.state.lock().unwrap().script_execution = Some(enabled);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockLauncher
// ---------------------------------------------------------------------------

/// Launcher handing out a fresh [`MockBrowser`] with the same pages each time.
#[derive(Debug, Clone)]
pub struct MockLauncher {
    pages: Vec<MockPage>,
    launches: Arc<Mutex<usize>>,
}

impl MockLauncher {
    pub fn new(pages: Vec<MockPage>) -> Self {
        Self {
            pages,
            launches: Arc::new(Mutex::new(0)),
        }
    }

    pub fn launches(&self) -> usize {
        *self.launches.lock().unwrap()
    }
}

impl BrowserLauncher for MockLauncher {
    type Session = MockBrowser;

    async fn launch(&self) -> Result<MockBrowser, AppError> {
        *self.launches.lock().unwrap() += 1;
        Ok(MockBrowser::with_pages(self.pages.clone()))
    }
}

// ---------------------------------------------------------------------------
// MockAdapter
// ---------------------------------------------------------------------------

/// Adapter over line-based content: each non-empty line is one entry and
/// lines starting with `!` fail to parse.
#[derive(Debug, Clone)]
pub struct MockAdapter {
    name: String,
    page_size: Option<usize>,
    max_pages: Option<u32>,
    script_policy: ScriptPolicy,
}

impl MockAdapter {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            page_size: None,
            max_pages: None,
            script_policy: ScriptPolicy::Optional,
        }
    }

    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn with_max_pages(mut self, max: u32) -> Self {
        self.max_pages = Some(max);
        self
    }

    pub fn with_script_policy(mut self, policy: ScriptPolicy) -> Self {
        self.script_policy = policy;
        self
    }
}

impl SourceAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn build_search_url(
        &self,
        query: &str,
        _filters: &JobFilters,
        page: u32,
    ) -> Result<String, AppError> {
        Ok(format!(
            "https://mock.test/search?q={}&page={page}",
            query.replace(' ', "+")
        ))
    }

    fn ready_selector(&self) -> &str {
        "li.job"
    }

    fn extract_raw_entries(&self, page_content: &str) -> Vec<String> {
        page_content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    }

    fn parse_entry(&self, raw: &str) -> Result<JobRecord, ParseError> {
        if raw.starts_with('!') {
            return Err(ParseError::Malformed(raw.to_string()));
        }
        Ok(JobRecord::new(
            self.name.clone(),
            format!("https://mock.test/jobs/{raw}"),
            format!("Job {raw}"),
            "Mock Co",
        ))
    }

    fn page_size(&self) -> Option<usize> {
        self.page_size
    }

    fn max_pages(&self) -> Option<u32> {
        self.max_pages
    }

    fn script_policy(&self) -> ScriptPolicy {
        self.script_policy
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreState {
    jobs: Vec<JobRecord>,
    tags: BTreeMap<String, TagRecord>,
    upsert_calls: usize,
    fail_upserts: bool,
    fail_tag_counts: bool,
}

/// In-memory [`JobStore`] keeping insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every upsert fails with a persistence error.
    pub fn failing_upserts(self) -> Self {
        self.state.lock().unwrap().fail_upserts = true;
        self
    }

    /// Every tag count change fails with a persistence error.
    pub fn failing_tag_counts(self) -> Self {
        self.state.lock().unwrap().fail_tag_counts = true;
        self
    }

    /// Store a tag directly, bypassing reconciliation.
    pub fn seed_tag(&self, tag: TagRecord) {
        self.state.lock().unwrap().tags.insert(tag.name.clone(), tag);
    }

    /// Store a record directly, bypassing reconciliation.
    pub fn seed(&self, record: JobRecord) {
        self.state.lock().unwrap().jobs.push(record);
    }

    pub fn get(&self, source: &str, job_url: &str) -> Option<JobRecord> {
        self.state
            .lock()
            .unwrap()
            .jobs
            .iter()
            .find(|j| j.source == source && j.job_url == job_url)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes to job records, conditional updates included.
    pub fn upsert_calls(&self) -> usize {
        self.state.lock().unwrap().upsert_calls
    }

    pub fn tag_count(&self, name: &str) -> Option<i64> {
        self.state.lock().unwrap().tags.get(name).map(|t| t.count)
    }

    fn sorted_matches(&self, filters: &JobFilters) -> Vec<JobRecord> {
        let mut matches: Vec<JobRecord> = self
            .state
            .lock()
            .unwrap()
            .jobs
            .iter()
            .filter(|j| filters.matches(j))
            .cloned()
            .collect();
        // Newest first, undated last; stable so ties keep insertion order.
        matches.sort_by(|a, b| match (a.posted_date, b.posted_date) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        matches
    }
}

impl JobStore for MemoryStore {
    async fn find_by_key(&self, source: &str, job_url: &str) -> Result<Option<JobRecord>, AppError> {
        Ok(self.get(source, job_url))
    }

    async fn upsert(&self, record: &JobRecord) -> Result<UpsertOutcome, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_upserts {
            return Err(AppError::PersistenceError("connection refused".into()));
        }
        state.upsert_calls += 1;
        match state
            .jobs
            .iter_mut()
            .find(|j| j.source == record.source && j.job_url == record.job_url)
        {
            Some(existing) => {
                existing.salary.clone_from(&record.salary);
                existing.salary_min = record.salary_min;
                existing.salary_max = record.salary_max;
                existing.currency.clone_from(&record.currency);
                existing.tags.clone_from(&record.tags);
                existing.posted_date = record.posted_date;
                existing.updated_at = record.updated_at;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                state.jobs.push(record.clone());
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    async fn update_if_current(
        &self,
        record: &JobRecord,
        expected: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_upserts {
            return Err(AppError::PersistenceError("connection refused".into()));
        }
        let Some(existing) = state
            .jobs
            .iter_mut()
            .find(|j| j.source == record.source && j.job_url == record.job_url)
        else {
            return Ok(false);
        };
        if existing.updated_at != expected {
            return Ok(false);
        }
        existing.salary.clone_from(&record.salary);
        existing.salary_min = record.salary_min;
        existing.salary_max = record.salary_max;
        existing.currency.clone_from(&record.currency);
        existing.tags.clone_from(&record.tags);
        existing.posted_date = record.posted_date;
        existing.updated_at = record.updated_at;
        state.upsert_calls += 1;
        Ok(true)
    }

    async fn increment_tag_count(&self, name: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_tag_counts {
            return Err(AppError::PersistenceError("tag table locked".into()));
        }
        let now = Utc::now();
        let tag = state.tags.entry(name.to_string()).or_insert_with(|| TagRecord {
            name: name.to_string(),
            count: 0,
            category: categorize(name),
            created_at: now,
            updated_at: now,
        });
        tag.count += 1;
        tag.updated_at = now;
        Ok(())
    }

    async fn decrement_tag_count(&self, name: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_tag_counts {
            return Err(AppError::PersistenceError("tag table locked".into()));
        }
        if let Some(tag) = state.tags.get_mut(name) {
            tag.count = (tag.count - 1).max(0);
            tag.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn query(
        &self,
        filters: &JobFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JobRecord>, AppError> {
        Ok(self
            .sorted_matches(filters)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect())
    }

    async fn count(&self, filters: &JobFilters) -> Result<u64, AppError> {
        Ok(self.sorted_matches(filters).len() as u64)
    }

    async fn get_tag(&self, name: &str) -> Result<Option<TagRecord>, AppError> {
        Ok(self.state.lock().unwrap().tags.get(name).cloned())
    }

    async fn popular_tags(
        &self,
        limit: usize,
        category: Option<TagCategory>,
    ) -> Result<Vec<TagRecord>, AppError> {
        let mut tags: Vec<TagRecord> = self
            .state
            .lock()
            .unwrap()
            .tags
            .values()
            .filter(|t| category.is_none_or(|c| t.category == c))
            .cloned()
            .collect();
        tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        tags.truncate(limit);
        Ok(tags)
    }

    async fn job_stats(&self) -> Result<JobStats, AppError> {
        let state = self.state.lock().unwrap();
        let mut by_source: BTreeMap<String, u64> = BTreeMap::new();
        for job in &state.jobs {
            *by_source.entry(job.source.clone()).or_default() += 1;
        }
        let mut jobs_by_source: Vec<(String, u64)> = by_source.into_iter().collect();
        jobs_by_source.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        Ok(JobStats {
            total_jobs: state.jobs.len() as u64,
            remote_jobs: state.jobs.iter().filter(|j| j.is_remote).count() as u64,
            jobs_by_source,
        })
    }

    async fn tag_stats(&self, now: DateTime<Utc>) -> Result<TagStats, AppError> {
        let state = self.state.lock().unwrap();
        let week = TimeDelta::days(TAG_STATS_WINDOW_DAYS);
        let week_ago = now - week;
        let two_weeks_ago = week_ago - week;

        let mut most_popular: Vec<TagRecord> = state.tags.values().cloned().collect();
        most_popular.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
        most_popular.truncate(TAG_STATS_POPULAR);

        let mut by_category: BTreeMap<&'static str, (TagCategory, u64)> = BTreeMap::new();
        for tag in state.tags.values() {
            by_category
                .entry(tag.category.as_str())
                .or_insert((tag.category, 0))
                .1 += 1;
        }
        let mut tags_by_category: Vec<(TagCategory, u64)> = by_category.into_values().collect();
        tags_by_category.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));

        let mut recent_tags: Vec<TagRecord> = state
            .tags
            .values()
            .filter(|t| t.created_at >= week_ago)
            .cloned()
            .collect();
        let recent = recent_tags.len() as u64;
        recent_tags.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.name.cmp(&b.name)));
        recent_tags.truncate(TAG_STATS_RECENT);

        let previous = state
            .tags
            .values()
            .filter(|t| t.created_at >= two_weeks_ago && t.created_at < week_ago)
            .count() as u64;

        Ok(TagStats {
            total_tags: state.tags.len() as u64,
            most_popular,
            tags_by_category,
            recent_tags,
            growth_rate: TagStats::growth_rate(recent, previous),
        })
    }
}
