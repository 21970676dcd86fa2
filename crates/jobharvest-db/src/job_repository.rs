use chrono::{DateTime, TimeDelta, Utc};
use sqlx::{PgPool, Pool, Postgres, QueryBuilder};

use jobharvest_core::error::AppError;
use jobharvest_core::models::{
    JobFilters, JobRecord, JobStats, ScrapeMode, TAG_STATS_POPULAR, TAG_STATS_RECENT,
    TAG_STATS_WINDOW_DAYS, TagCategory, TagRecord, TagStats, UpsertOutcome,
};
use jobharvest_core::tagging::categorize;
use jobharvest_core::traits::JobStore;

const JOB_COLUMNS: &str = "source, mode, title, company, location, salary, salary_min, \
     salary_max, currency, tags, posted_date, job_url, is_remote, created_at, updated_at";

/// PostgreSQL-backed [`JobStore`].
#[derive(Clone)]
pub struct PgJobStore {
    pool: Pool<Postgres>,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(e: sqlx::Error) -> AppError {
    AppError::PersistenceError(e.to_string())
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct JobRow {
    source: String,
    mode: String,
    title: String,
    company: String,
    location: Option<String>,
    salary: Option<String>,
    salary_min: Option<i64>,
    salary_max: Option<i64>,
    currency: Option<String>,
    tags: Vec<String>,
    posted_date: Option<DateTime<Utc>>,
    job_url: String,
    is_remote: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<JobRow> for JobRecord {
    fn from(row: JobRow) -> Self {
        JobRecord {
            source: row.source,
            mode: row.mode.parse().unwrap_or(ScrapeMode::Dynamic),
            title: row.title,
            company: row.company,
            location: row.location,
            salary: row.salary,
            salary_min: row.salary_min,
            salary_max: row.salary_max,
            currency: row.currency,
            tags: row.tags.into_iter().collect(),
            posted_date: row.posted_date,
            job_url: row.job_url,
            is_remote: row.is_remote,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TagRow {
    name: String,
    count: i64,
    category: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TagRow> for TagRecord {
    fn from(row: TagRow) -> Self {
        TagRecord {
            category: row
                .category
                .parse()
                .unwrap_or_else(|_| categorize(&row.name)),
            name: row.name,
            count: row.count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Escape `%`, `_` and `\` for use inside an `ILIKE` pattern.
fn like_pattern(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for c in value.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Append `WHERE` clauses for every filter that is set.
fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filters: &JobFilters) {
    qb.push(" WHERE TRUE");
    if let Some(q) = non_blank(&filters.query) {
        qb.push(" AND title ILIKE ").push_bind(like_pattern(q));
    }
    if let Some(source) = non_blank(&filters.source) {
        qb.push(" AND source = ").push_bind(source.to_string());
    }
    if let Some(company) = non_blank(&filters.company) {
        qb.push(" AND company ILIKE ").push_bind(like_pattern(company));
    }
    if let Some(location) = non_blank(&filters.location) {
        qb.push(" AND location ILIKE ").push_bind(like_pattern(location));
    }
    if let Some(remote) = filters.is_remote {
        qb.push(" AND is_remote = ").push_bind(remote);
    }
    let tags: Vec<String> = filters
        .tags
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if !tags.is_empty() {
        qb.push(" AND tags && ").push_bind(tags).push("::text[]");
    }
}

impl JobStore for PgJobStore {
    async fn find_by_key(&self, source: &str, job_url: &str) -> Result<Option<JobRecord>, AppError> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE source = $1 AND job_url = $2"
        ))
        .bind(source)
        .bind(job_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(Into::into))
    }

    async fn upsert(&self, record: &JobRecord) -> Result<UpsertOutcome, AppError> {
        let tags: Vec<&str> = record.tags.iter().map(String::as_str).collect();
        // `xmax = 0` only holds for a row this statement inserted.
        let (inserted,): (bool,) = sqlx::query_as(&format!(
            r#"
            INSERT INTO jobs ({JOB_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (source, job_url) DO UPDATE SET
                salary = EXCLUDED.salary,
                salary_min = EXCLUDED.salary_min,
                salary_max = EXCLUDED.salary_max,
                currency = EXCLUDED.currency,
                tags = EXCLUDED.tags,
                posted_date = EXCLUDED.posted_date,
                updated_at = EXCLUDED.updated_at
            RETURNING (xmax = 0) AS inserted
            "#
        ))
        .bind(&record.source)
        .bind(record.mode.as_str())
        .bind(&record.title)
        .bind(&record.company)
        .bind(&record.location)
        .bind(&record.salary)
        .bind(record.salary_min)
        .bind(record.salary_max)
        .bind(&record.currency)
        .bind(&tags)
        .bind(record.posted_date)
        .bind(&record.job_url)
        .bind(record.is_remote)
        .bind(record.created_at)
        .bind(record.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn update_if_current(
        &self,
        record: &JobRecord,
        expected: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let tags: Vec<&str> = record.tags.iter().map(String::as_str).collect();
        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                salary = $3,
                salary_min = $4,
                salary_max = $5,
                currency = $6,
                tags = $7,
                posted_date = $8,
                updated_at = $9
            WHERE source = $1 AND job_url = $2 AND updated_at = $10
            "#,
        )
        .bind(&record.source)
        .bind(&record.job_url)
        .bind(&record.salary)
        .bind(record.salary_min)
        .bind(record.salary_max)
        .bind(&record.currency)
        .bind(&tags)
        .bind(record.posted_date)
        .bind(record.updated_at)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn increment_tag_count(&self, name: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO job_tags (name, count, category)
            VALUES ($1, 1, $2)
            ON CONFLICT (name) DO UPDATE
            SET count = job_tags.count + 1, updated_at = NOW()
            "#,
        )
        .bind(name)
        .bind(categorize(name).as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn decrement_tag_count(&self, name: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE job_tags
            SET count = GREATEST(count - 1, 0), updated_at = NOW()
            WHERE name = $1
            "#,
        )
        .bind(name)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn query(
        &self,
        filters: &JobFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JobRecord>, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {JOB_COLUMNS} FROM jobs"));
        push_filters(&mut qb, filters);
        qb.push(" ORDER BY posted_date DESC NULLS LAST, id ASC LIMIT ")
            .push_bind(limit as i64)
            .push(" OFFSET ")
            .push_bind(offset as i64);

        let rows = qb
            .build_query_as::<JobRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self, filters: &JobFilters) -> Result<u64, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM jobs");
        push_filters(&mut qb, filters);

        let (count,): (i64,) = qb
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(count as u64)
    }

    async fn get_tag(&self, name: &str) -> Result<Option<TagRecord>, AppError> {
        let row = sqlx::query_as::<_, TagRow>(
            r#"SELECT name, count, category, created_at, updated_at FROM job_tags WHERE name = $1"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(row.map(Into::into))
    }

    async fn popular_tags(
        &self,
        limit: usize,
        category: Option<TagCategory>,
    ) -> Result<Vec<TagRecord>, AppError> {
        let rows = sqlx::query_as::<_, TagRow>(
            r#"
            SELECT name, count, category, created_at, updated_at
            FROM job_tags
            WHERE $2::text IS NULL OR category = $2
            ORDER BY count DESC, name ASC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .bind(category.map(|c| c.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn job_stats(&self) -> Result<JobStats, AppError> {
        let (total, remote): (i64, i64) = sqlx::query_as(
            r#"SELECT COUNT(*), COUNT(*) FILTER (WHERE is_remote) FROM jobs"#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        let by_source: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT source, COUNT(*) FROM jobs
            GROUP BY source
            ORDER BY COUNT(*) DESC, source ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(JobStats {
            total_jobs: total as u64,
            remote_jobs: remote as u64,
            jobs_by_source: by_source
                .into_iter()
                .map(|(source, count)| (source, count as u64))
                .collect(),
        })
    }

    async fn tag_stats(&self, now: DateTime<Utc>) -> Result<TagStats, AppError> {
        let week_ago = now - TimeDelta::days(TAG_STATS_WINDOW_DAYS);
        let two_weeks_ago = week_ago - TimeDelta::days(TAG_STATS_WINDOW_DAYS);

        let (total, recent, previous): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE created_at >= $1),
                COUNT(*) FILTER (WHERE created_at >= $2 AND created_at < $1)
            FROM job_tags
            "#,
        )
        .bind(week_ago)
        .bind(two_weeks_ago)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        let by_category: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT category, COUNT(*) FROM job_tags
            GROUP BY category
            ORDER BY COUNT(*) DESC, category ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let recent_tags = sqlx::query_as::<_, TagRow>(
            r#"
            SELECT name, count, category, created_at, updated_at
            FROM job_tags
            WHERE created_at >= $1
            ORDER BY created_at DESC, name ASC
            LIMIT $2
            "#,
        )
        .bind(week_ago)
        .bind(TAG_STATS_RECENT as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(TagStats {
            total_tags: total as u64,
            most_popular: self.popular_tags(TAG_STATS_POPULAR, None).await?,
            tags_by_category: by_category
                .into_iter()
                .map(|(category, count)| {
                    (category.parse().unwrap_or(TagCategory::Other), count as u64)
                })
                .collect(),
            recent_tags: recent_tags.into_iter().map(Into::into).collect(),
            growth_rate: TagStats::growth_rate(recent as u64, previous as u64),
        })
    }
}
