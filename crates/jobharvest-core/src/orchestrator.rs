//! Turns one scrape request into a lazy, finite sequence of records.

use std::collections::VecDeque;

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::adapter::SourceRegistry;
use crate::error::AppError;
use crate::models::{JobFilters, JobRecord, ScrapeMode, ScrapedJob};
use crate::pipeline::{ExtractionPipeline, PageOutcome, PipelineConfig};
use crate::rate_limiter::RateLimiters;
use crate::reconcile::DedupReconciler;
use crate::tagging::{TagContext, enrich};
use crate::traits::{BrowserSession, JobStore};

pub const DEFAULT_LIMIT: usize = 100;
pub const MAX_LIMIT: usize = 1000;

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// A scrape request as accepted by the CLI and HTTP front-ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    #[serde(default)]
    pub mode: ScrapeMode,
    /// Required for dynamic scrapes; narrows static queries.
    pub source: Option<String>,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub filters: JobFilters,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl ScrapeRequest {
    pub fn new(mode: ScrapeMode, query: impl Into<String>) -> Self {
        Self {
            mode,
            source: None,
            query: query.into(),
            filters: JobFilters::default(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    /// Check the request before any work is done.
    pub fn validate(&self, registry: &SourceRegistry) -> Result<(), AppError> {
        if self.limit == 0 || self.limit > MAX_LIMIT {
            return Err(AppError::ValidationError(format!(
                "limit must be between 1 and {MAX_LIMIT}, got {}",
                self.limit
            )));
        }

        match self.mode {
            ScrapeMode::Static => {
                if let Some(source) = self.source.as_deref() {
                    registry.resolve(source)?;
                }
            }
            ScrapeMode::Dynamic => {
                if self.offset > 0 {
                    return Err(AppError::ValidationError(
                        "offset is not supported for dynamic scrapes".into(),
                    ));
                }
                let source = self.source.as_deref().ok_or_else(|| {
                    AppError::ValidationError("source is required for dynamic scrapes".into())
                })?;
                registry.resolve(source)?;
                if self.effective_query().is_empty() {
                    return Err(AppError::ValidationError(
                        "query must not be empty unless a company is given".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// The search text sent to the site: `"<company> <query>"`.
    pub fn effective_query(&self) -> String {
        let company = self.filters.company.as_deref().map(str::trim).unwrap_or("");
        let query = self.query.trim();
        match (company.is_empty(), query.is_empty()) {
            (false, false) => format!("{company} {query}"),
            (false, true) => company.to_string(),
            _ => query.to_string(),
        }
    }

    /// Filters for the static path, with `query` and `source` folded in.
    pub fn static_filters(&self) -> JobFilters {
        let mut filters = self.filters.clone();
        if filters.query.is_none() && !self.query.trim().is_empty() {
            filters.query = Some(self.query.trim().to_string());
        }
        if filters.source.is_none() {
            filters.source.clone_from(&self.source);
        }
        filters
    }
}

/// Progress of one run. Owned by exactly one [`ScrapeRun`].
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineCursor {
    pub query: String,
    pub filters: JobFilters,
    pub offset: usize,
    /// Next page to be fetched.
    pub page: u32,
    pub collected: usize,
}

/// Builds scrape runs from validated requests.
#[derive(Debug, Clone)]
pub struct Orchestrator<St: JobStore> {
    registry: SourceRegistry,
    limiters: RateLimiters,
    config: PipelineConfig,
    store: St,
}

impl<St: JobStore> Orchestrator<St> {
    pub fn new(
        registry: SourceRegistry,
        limiters: RateLimiters,
        config: PipelineConfig,
        store: St,
    ) -> Self {
        Self {
            registry,
            limiters,
            config,
            store,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn store(&self) -> &St {
        &self.store
    }

    /// Start a dynamic run on `session`. Nothing is fetched until the run is
    /// polled.
    pub fn start<S: BrowserSession>(
        &self,
        request: &ScrapeRequest,
        session: S,
        cancel: CancellationToken,
    ) -> Result<ScrapeRun<S, St>, AppError> {
        let mut request = request.clone();
        request.mode = ScrapeMode::Dynamic;
        request.validate(&self.registry)?;

        let source = request.source.as_deref().unwrap_or_default();
        let adapter = self.registry.resolve(source)?;
        let limiter = self.limiters.for_source(adapter.name());
        let query = request.effective_query();

        let run_id = Uuid::new_v4();
        tracing::info!(
            %run_id,
            source = %adapter.name(),
            %query,
            limit = request.limit,
            "Starting scrape run"
        );

        let pipeline = ExtractionPipeline::new(
            adapter.clone(),
            session,
            limiter,
            self.config.clone(),
            query.clone(),
            request.filters.clone(),
        );

        Ok(ScrapeRun {
            run_id,
            source: adapter.name().to_string(),
            pipeline,
            reconciler: DedupReconciler::new(self.store.clone()),
            cursor: PipelineCursor {
                query,
                filters: request.filters,
                offset: 0,
                page: 0,
                collected: 0,
            },
            limit: request.limit,
            buffer: VecDeque::new(),
            cancel,
            finished: false,
        })
    }
}

/// One live scrape. Yields each record after it was tagged and reconciled.
///
/// A run is not restartable: once it returns `None` it stays finished.
pub struct ScrapeRun<S: BrowserSession, St: JobStore> {
    run_id: Uuid,
    source: String,
    pipeline: ExtractionPipeline<S>,
    reconciler: DedupReconciler<St>,
    cursor: PipelineCursor,
    limit: usize,
    buffer: VecDeque<JobRecord>,
    cancel: CancellationToken,
    finished: bool,
}

impl<S: BrowserSession, St: JobStore> ScrapeRun<S, St> {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn cursor(&self) -> &PipelineCursor {
        &self.cursor
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self, reason: &str) {
        if !self.finished {
            self.finished = true;
            tracing::info!(
                run_id = %self.run_id,
                source = %self.source,
                collected = self.cursor.collected,
                pages = self.cursor.page,
                reason,
                "Scrape run finished"
            );
        }
    }

    async fn reconcile(&self, record: JobRecord) -> ScrapedJob {
        let ctx = TagContext {
            query: &self.cursor.query,
            location: self.cursor.filters.location.as_deref(),
            mode: ScrapeMode::Dynamic,
            source: &self.source,
        };
        let record = enrich(record, &ctx);

        match self.reconciler.reconcile(record.clone()).await {
            Ok((stored, outcome)) => ScrapedJob {
                record: stored,
                outcome: Some(outcome),
            },
            Err(e) => {
                tracing::warn!(
                    run_id = %self.run_id,
                    source = %record.source,
                    job_url = %record.job_url,
                    page = self.cursor.page.saturating_sub(1),
                    error = %e,
                    "Record not persisted"
                );
                ScrapedJob {
                    record,
                    outcome: None,
                }
            }
        }
    }

    /// The next record, or `None` when the run is over.
    ///
    /// A fatal error is yielded once and ends the run.
    pub async fn next(&mut self) -> Option<Result<ScrapedJob, AppError>> {
        loop {
            if self.finished {
                return None;
            }
            if self.cursor.collected >= self.limit {
                self.finish("limit reached");
                return None;
            }
            if self.cancel.is_cancelled() {
                self.finish("cancelled");
                return None;
            }

            if let Some(record) = self.buffer.pop_front() {
                let job = self.reconcile(record).await;
                self.cursor.collected += 1;
                return Some(Ok(job));
            }

            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.finish("cancelled");
                    return None;
                }
                outcome = self.pipeline.next_page() => outcome,
            };
            self.cursor.page = self.pipeline.page();

            match outcome {
                Ok(PageOutcome::Records { records, .. }) => self.buffer.extend(records),
                Ok(PageOutcome::Skipped { .. } | PageOutcome::Empty { .. }) => {}
                Ok(PageOutcome::Exhausted) => {
                    self.finish("end of results");
                    return None;
                }
                Err(e) => {
                    self.finish(e.category());
                    return Some(Err(e));
                }
            }
        }
    }

    /// Drain the run, keeping everything yielded before a fatal error.
    pub async fn collect(mut self) -> (Vec<ScrapedJob>, Option<AppError>) {
        let mut jobs = Vec::new();
        while let Some(item) = self.next().await {
            match item {
                Ok(job) => jobs.push(job),
                Err(e) => return (jobs, Some(e)),
            }
        }
        (jobs, None)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<ScrapedJob, AppError>> + Send
    where
        S: 'static,
        St: 'static,
    {
        futures::stream::unfold(self, |mut run| async move {
            run.next().await.map(|item| (item, run))
        })
    }
}
