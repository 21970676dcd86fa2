use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jobharvest_core::error::AppError;
use jobharvest_core::models::{
    JobFilters, JobRecord, JobStats, ReconcileOutcome, ScrapedJob, TagRecord, TagStats,
};
use jobharvest_core::orchestrator::DEFAULT_LIMIT;

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobResponse {
    pub source: String,
    pub mode: String,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub salary: Option<String>,
    pub salary_min: Option<i64>,
    pub salary_max: Option<i64>,
    pub currency: Option<String>,
    pub tags: Vec<String>,
    pub posted_date: Option<DateTime<Utc>>,
    pub job_url: String,
    pub is_remote: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set for live scrapes only: inserted, updated, unchanged, or null if not stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

impl From<JobRecord> for JobResponse {
    fn from(record: JobRecord) -> Self {
        Self {
            source: record.source,
            mode: record.mode.to_string(),
            title: record.title,
            company: record.company,
            location: record.location,
            salary: record.salary,
            salary_min: record.salary_min,
            salary_max: record.salary_max,
            currency: record.currency,
            tags: record.tags.into_iter().collect(),
            posted_date: record.posted_date,
            job_url: record.job_url,
            is_remote: record.is_remote,
            created_at: record.created_at,
            updated_at: record.updated_at,
            outcome: None,
        }
    }
}

impl From<ScrapedJob> for JobResponse {
    fn from(job: ScrapedJob) -> Self {
        let outcome = job.outcome.map(|o| outcome_label(o).to_string());
        Self {
            outcome,
            ..Self::from(job.record)
        }
    }
}

fn outcome_label(outcome: ReconcileOutcome) -> &'static str {
    match outcome {
        ReconcileOutcome::Inserted => "inserted",
        ReconcileOutcome::Updated => "updated",
        ReconcileOutcome::Unchanged => "unchanged",
    }
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct JobListQuery {
    /// Substring matched against titles
    pub query: Option<String>,
    pub source: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub is_remote: Option<bool>,
    /// Comma-separated; matches records carrying any of them
    pub tags: Option<String>,
    /// 1-1000, defaults to 100
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl JobListQuery {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }

    pub fn filters(&self) -> JobFilters {
        JobFilters {
            query: self.query.clone(),
            source: self.source.clone(),
            company: self.company.clone(),
            location: self.location.clone(),
            is_remote: self.is_remote,
            tags: split_tags(self.tags.as_deref()),
        }
    }
}

fn split_tags(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    /// Matching records in the store, ignoring limit and offset.
    pub total: u64,
    pub limit: usize,
    pub offset: usize,
}

// ---------------------------------------------------------------------------
// Scrape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ScrapeBody {
    /// Job board to scrape (linkedin, naukri)
    pub source: String,
    #[serde(default)]
    pub query: String,
    pub company: Option<String>,
    pub location: Option<String>,
    pub is_remote: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub limit: Option<usize>,
}

impl ScrapeBody {
    pub fn filters(&self) -> JobFilters {
        JobFilters {
            company: self.company.clone(),
            location: self.location.clone(),
            is_remote: self.is_remote,
            tags: self.tags.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ScrapeResponse {
    pub jobs: Vec<JobResponse>,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub unpersisted: usize,
    /// Error that cut the run short; the jobs gathered before it are kept.
    pub error: Option<ErrorResponse>,
}

impl ScrapeResponse {
    pub fn new(jobs: Vec<ScrapedJob>, error: Option<AppError>) -> Self {
        let count = |outcome| jobs.iter().filter(|j| j.outcome == Some(outcome)).count();
        let inserted = count(ReconcileOutcome::Inserted);
        let updated = count(ReconcileOutcome::Updated);
        let unchanged = count(ReconcileOutcome::Unchanged);
        let unpersisted = jobs.iter().filter(|j| !j.is_persisted()).count();
        Self {
            jobs: jobs.into_iter().map(JobResponse::from).collect(),
            inserted,
            updated,
            unchanged,
            unpersisted,
            error: error.as_ref().map(ErrorResponse::from),
        }
    }
}

// ---------------------------------------------------------------------------
// Tags & stats
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TagResponse {
    pub name: String,
    pub count: i64,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TagRecord> for TagResponse {
    fn from(tag: TagRecord) -> Self {
        Self {
            name: tag.name,
            count: tag.count,
            category: tag.category.to_string(),
            created_at: tag.created_at,
            updated_at: tag.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct TagListQuery {
    /// Defaults to 20, capped at 100
    pub limit: Option<usize>,
    /// e.g. technology, location, source
    pub category: Option<String>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TagListResponse {
    pub tags: Vec<TagResponse>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SourceCount {
    pub source: String,
    pub count: u64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CategoryCount {
    pub category: String,
    pub tags: u64,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TagStatsResponse {
    pub total_tags: u64,
    pub most_popular: Vec<TagResponse>,
    pub tags_by_category: Vec<CategoryCount>,
    pub recent_tags: Vec<TagResponse>,
    /// Percent change in new tags, this week against last week
    pub growth_rate: f64,
}

impl From<TagStats> for TagStatsResponse {
    fn from(stats: TagStats) -> Self {
        Self {
            total_tags: stats.total_tags,
            most_popular: stats.most_popular.into_iter().map(Into::into).collect(),
            tags_by_category: stats
                .tags_by_category
                .into_iter()
                .map(|(category, tags)| CategoryCount {
                    category: category.to_string(),
                    tags,
                })
                .collect(),
            recent_tags: stats.recent_tags.into_iter().map(Into::into).collect(),
            growth_rate: stats.growth_rate,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct StatsResponse {
    pub total_jobs: u64,
    pub remote_jobs: u64,
    pub jobs_by_source: Vec<SourceCount>,
    pub tags: TagStatsResponse,
}

impl StatsResponse {
    pub fn new(jobs: JobStats, tags: TagStats) -> Self {
        Self {
            total_jobs: jobs.total_jobs,
            remote_jobs: jobs.remote_jobs,
            jobs_by_source: jobs
                .jobs_by_source
                .into_iter()
                .map(|(source, count)| SourceCount { source, count })
                .collect(),
            tags: tags.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        Self::new(err.category(), err.to_string())
    }
}
