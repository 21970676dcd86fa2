use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether records are served from the store or fetched live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMode {
    /// Serve already-persisted records only.
    #[default]
    Static,
    /// Fetch live and persist as a side effect.
    Dynamic,
}

impl ScrapeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeMode::Static => "static",
            ScrapeMode::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScrapeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "static" => Ok(ScrapeMode::Static),
            "dynamic" => Ok(ScrapeMode::Dynamic),
            _ => Err(format!("Unknown scrape mode: {}", s)),
        }
    }
}

/// A job listing. `(source, job_url)` is its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub source: String,
    pub mode: ScrapeMode,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    /// Salary exactly as displayed by the source.
    pub salary: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub currency: Option<String>,
    pub tags: BTreeSet<String>,
    pub posted_date: Option<DateTime<Utc>>,
    pub job_url: String,
    pub is_remote: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a record with only identity and headline fields set.
    pub fn new(
        source: impl Into<String>,
        job_url: impl Into<String>,
        title: impl Into<String>,
        company: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            source: source.into(),
            mode: ScrapeMode::Dynamic,
            title: title.into(),
            company: company.into(),
            location: None,
            salary: None,
            salary_min: None,
            salary_max: None,
            currency: None,
            tags: BTreeSet::new(),
            posted_date: None,
            job_url: job_url.into(),
            is_remote: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// The dedup identity of this record.
    pub fn key(&self) -> (&str, &str) {
        (&self.source, &self.job_url)
    }
}

/// Filters shared by static queries and live scrapes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilters {
    /// Case-insensitive title substring.
    pub query: Option<String>,
    pub source: Option<String>,
    /// Case-insensitive company substring.
    pub company: Option<String>,
    /// Case-insensitive location substring.
    pub location: Option<String>,
    pub is_remote: Option<bool>,
    /// Match records holding any of these tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl JobFilters {
    /// True when `record` satisfies every filter that is set.
    pub fn matches(&self, record: &JobRecord) -> bool {
        fn contains(haystack: &str, needle: &str) -> bool {
            haystack.to_lowercase().contains(&needle.trim().to_lowercase())
        }

        if let Some(q) = non_blank(&self.query) {
            if !contains(&record.title, q) {
                return false;
            }
        }
        if let Some(source) = non_blank(&self.source) {
            if record.source != source {
                return false;
            }
        }
        if let Some(company) = non_blank(&self.company) {
            if !contains(&record.company, company) {
                return false;
            }
        }
        if let Some(location) = non_blank(&self.location) {
            match &record.location {
                Some(l) if contains(l, location) => {}
                _ => return false,
            }
        }
        if let Some(remote) = self.is_remote {
            if record.is_remote != remote {
                return false;
            }
        }
        let wanted: Vec<String> = self
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if !wanted.is_empty() && !wanted.iter().any(|t| record.tags.contains(t)) {
            return false;
        }
        true
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Coarse grouping for tags, derived from their prefix or keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagCategory {
    Technology,
    Experience,
    Location,
    JobType,
    Company,
    Compensation,
    Search,
    Source,
    Other,
}

impl TagCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagCategory::Technology => "technology",
            TagCategory::Experience => "experience",
            TagCategory::Location => "location",
            TagCategory::JobType => "job_type",
            TagCategory::Company => "company",
            TagCategory::Compensation => "compensation",
            TagCategory::Search => "search",
            TagCategory::Source => "source",
            TagCategory::Other => "other",
        }
    }
}

impl fmt::Display for TagCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TagCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "technology" => Ok(TagCategory::Technology),
            "experience" => Ok(TagCategory::Experience),
            "location" => Ok(TagCategory::Location),
            "job_type" => Ok(TagCategory::JobType),
            "company" => Ok(TagCategory::Company),
            "compensation" => Ok(TagCategory::Compensation),
            "search" => Ok(TagCategory::Search),
            "source" => Ok(TagCategory::Source),
            "other" => Ok(TagCategory::Other),
            _ => Err(format!("Unknown tag category: {}", s)),
        }
    }
}

/// Aggregate counter for one tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    pub name: String,
    /// Number of job records currently holding this tag. Never negative.
    pub count: i64,
    pub category: TagCategory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of reconciling one record against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcileOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// What the store reports for a single upsert call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

impl From<UpsertOutcome> for ReconcileOutcome {
    fn from(outcome: UpsertOutcome) -> Self {
        match outcome {
            UpsertOutcome::Inserted => ReconcileOutcome::Inserted,
            UpsertOutcome::Updated => ReconcileOutcome::Updated,
        }
    }
}

/// A record yielded by a live scrape.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapedJob {
    #[serde(flatten)]
    pub record: JobRecord,
    /// `None` when persistence failed; the record is still returned.
    pub outcome: Option<ReconcileOutcome>,
}

impl ScrapedJob {
    pub fn is_persisted(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Store-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub total_jobs: u64,
    pub remote_jobs: u64,
    /// `(source, count)`, largest first.
    pub jobs_by_source: Vec<(String, u64)>,
}

/// How many top tags and recent tags [`TagStats`] carries.
pub const TAG_STATS_POPULAR: usize = 10;
pub const TAG_STATS_RECENT: usize = 5;
/// Width of the growth window, in days.
pub const TAG_STATS_WINDOW_DAYS: i64 = 7;

/// Tag-level aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagStats {
    pub total_tags: u64,
    /// Highest counts first.
    pub most_popular: Vec<TagRecord>,
    /// `(category, number of tags)`, largest first.
    pub tags_by_category: Vec<(TagCategory, u64)>,
    /// Tags first seen within the last window, newest first.
    pub recent_tags: Vec<TagRecord>,
    /// Percent change in new tags: last window against the one before it.
    pub growth_rate: f64,
}

impl TagStats {
    /// Percent growth from `previous` to `recent`, treating an empty
    /// previous window as one tag.
    pub fn growth_rate(recent: u64, previous: u64) -> f64 {
        (recent as f64 - previous as f64) / previous.max(1) as f64 * 100.0
    }
}
