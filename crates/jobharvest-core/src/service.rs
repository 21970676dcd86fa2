use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{JobFilters, JobRecord, ScrapeMode, ScrapedJob};
use crate::orchestrator::{MAX_LIMIT, Orchestrator, ScrapeRequest, ScrapeRun};
use crate::traits::{BrowserLauncher, JobStore};

/// What a [`JobScraper::scrape`] call returned.
#[derive(Debug)]
pub enum ScrapeResults {
    /// Records served from the store.
    Static(Vec<JobRecord>),
    /// Records fetched live, with the error that cut the run short, if any.
    Dynamic {
        jobs: Vec<ScrapedJob>,
        error: Option<AppError>,
    },
}

impl ScrapeResults {
    pub fn len(&self) -> usize {
        match self {
            ScrapeResults::Static(records) => records.len(),
            ScrapeResults::Dynamic { jobs, .. } => jobs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_records(self) -> Vec<JobRecord> {
        match self {
            ScrapeResults::Static(records) => records,
            ScrapeResults::Dynamic { jobs, .. } => jobs.into_iter().map(|j| j.record).collect(),
        }
    }
}

/// Front door for both scrape modes.
///
/// Generic over the browser launcher and the store so front-ends and tests
/// can plug in their own.
#[derive(Debug, Clone)]
pub struct JobScraper<L, St>
where
    L: BrowserLauncher,
    St: JobStore,
{
    orchestrator: Orchestrator<St>,
    launcher: L,
}

impl<L, St> JobScraper<L, St>
where
    L: BrowserLauncher,
    St: JobStore,
{
    pub fn new(orchestrator: Orchestrator<St>, launcher: L) -> Self {
        Self {
            orchestrator,
            launcher,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator<St> {
        &self.orchestrator
    }

    pub fn store(&self) -> &St {
        self.orchestrator.store()
    }

    /// Serve stored records matching `filters`, skipping `offset` of them.
    pub async fn scrape_static(
        &self,
        filters: &JobFilters,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<JobRecord>, AppError> {
        if limit == 0 || limit > MAX_LIMIT {
            return Err(AppError::ValidationError(format!(
                "limit must be between 1 and {MAX_LIMIT}, got {limit}"
            )));
        }
        let records = self.store().query(filters, limit, offset).await?;
        tracing::info!(count = records.len(), limit, offset, "Static query served");
        Ok(records)
    }

    /// Launch a fresh browser session and start a live run.
    ///
    /// The request is validated before the browser is launched.
    pub async fn scrape_dynamic(
        &self,
        source: &str,
        query: &str,
        filters: &JobFilters,
        limit: usize,
        cancel: CancellationToken,
    ) -> Result<ScrapeRun<L::Session, St>, AppError> {
        let request = ScrapeRequest {
            mode: ScrapeMode::Dynamic,
            source: Some(source.to_string()),
            query: query.to_string(),
            filters: filters.clone(),
            limit,
            offset: 0,
        };
        self.start_run(&request, cancel).await
    }

    async fn start_run(
        &self,
        request: &ScrapeRequest,
        cancel: CancellationToken,
    ) -> Result<ScrapeRun<L::Session, St>, AppError> {
        request.validate(self.orchestrator.registry())?;
        let session = self.launcher.launch().await?;
        self.orchestrator.start(request, session, cancel)
    }

    /// Run `request` to completion in either mode.
    ///
    /// A live run that fails before yielding anything returns the error;
    /// otherwise partial results are kept alongside it.
    pub async fn scrape(
        &self,
        request: &ScrapeRequest,
        cancel: CancellationToken,
    ) -> Result<ScrapeResults, AppError> {
        request.validate(self.orchestrator.registry())?;
        match request.mode {
            ScrapeMode::Static => {
                let filters = request.static_filters();
                let records = self
                    .scrape_static(&filters, request.limit, request.offset)
                    .await?;
                Ok(ScrapeResults::Static(records))
            }
            ScrapeMode::Dynamic => {
                let run = self.start_run(request, cancel).await?;
                let (jobs, error) = run.collect().await;
                match error {
                    Some(e) if jobs.is_empty() => Err(e),
                    error => Ok(ScrapeResults::Dynamic { jobs, error }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::adapter::SourceRegistry;
    use crate::models::ReconcileOutcome;
    use crate::pipeline::PipelineConfig;
    use crate::rate_limiter::{RateLimiterConfig, RateLimiters};
    use crate::testutil::{MemoryStore, MockAdapter, MockLauncher, MockPage, make_record};

    fn scraper(store: MemoryStore, launcher: MockLauncher) -> JobScraper<MockLauncher, MemoryStore> {
        let registry = SourceRegistry::new().register(Arc::new(MockAdapter::named("mock").with_page_size(5)));
        let orchestrator = Orchestrator::new(
            registry,
            RateLimiters::new(RateLimiterConfig::new(10, 10.0)),
            PipelineConfig::default(),
            store,
        );
        JobScraper::new(orchestrator, launcher)
    }

    #[tokio::test]
    async fn static_window_respects_offset_and_limit() {
        let store = MemoryStore::new();
        for i in 1..=20 {
            let mut record = make_record("linkedin", &format!("https://x/{i}"), &[]);
            record.title = format!("Rank {i}");
            store.seed(record);
        }
        let scraper = scraper(store, MockLauncher::new(vec![]));

        let records = scraper
            .scrape_static(&JobFilters::default(), 10, 5)
            .await
            .unwrap();
        let titles: Vec<_> = records.iter().map(|r| r.title.as_str()).collect();
        let expected: Vec<String> = (6..=15).map(|i| format!("Rank {i}")).collect();
        assert_eq!(titles, expected);
    }

    #[tokio::test]
    async fn static_rejects_bad_limit() {
        let scraper = scraper(MemoryStore::new(), MockLauncher::new(vec![]));
        let err = scraper
            .scrape_static(&JobFilters::default(), 0, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn dynamic_offset_is_rejected_without_launching() {
        let launcher = MockLauncher::new(vec![MockPage::entries(&["a"])]);
        let scraper = scraper(MemoryStore::new(), launcher.clone());
        let mut request = ScrapeRequest::new(ScrapeMode::Dynamic, "rust");
        request.source = Some("mock".into());
        request.offset = 1;

        let err = scraper
            .scrape(&request, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(launcher.launches(), 0);
    }

    #[tokio::test]
    async fn dynamic_scrape_persists_and_serves_statically() {
        let store = MemoryStore::new();
        let launcher = MockLauncher::new(vec![MockPage::entries(&["a", "b"])]);
        let scraper = scraper(store.clone(), launcher.clone());

        let run = scraper
            .scrape_dynamic("mock", "rust", &JobFilters::default(), 10, CancellationToken::new())
            .await
            .unwrap();
        let (jobs, error) = run.collect().await;
        assert!(error.is_none());
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.outcome == Some(ReconcileOutcome::Inserted)));
        assert_eq!(launcher.launches(), 1);

        let mut request = ScrapeRequest::new(ScrapeMode::Static, "job");
        request.source = Some("mock".into());
        let results = scraper
            .scrape(&request, CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(results, ScrapeResults::Static(_)));
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn dynamic_failure_before_any_record_is_an_error() {
        let launcher = MockLauncher::new(vec![
            MockPage::entries(&[]),
            MockPage::entries(&[]),
            MockPage::entries(&[]),
        ]);
        let scraper = scraper(MemoryStore::new(), launcher);
        let mut request = ScrapeRequest::new(ScrapeMode::Dynamic, "rust");
        request.source = Some("mock".into());

        let err = scraper
            .scrape(&request, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ScrapeSchemaDrift { .. }));
    }
}
