//! Page-by-page extraction state machine for one source.
//!
//! ```text
//! INIT -> NAVIGATE -> WAIT_READY -> EXTRACT -> PARSE -> NORMALIZE -+-> DONE
//!            ^                                                     |
//!            +-----------------------------------------------------+
//!                        (any stage) -> FATAL
//! ```
//!
//! The pipeline owns its browser session. Each call to
//! [`ExtractionPipeline::next_page`] processes exactly one results page.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{ScriptPolicy, SourceAdapter};
use crate::error::{AppError, ScrapeContext};
use crate::models::{JobFilters, JobRecord, ScrapeMode};
use crate::normalize::normalize;
use crate::rate_limiter::{BackoffPolicy, RateLimiter};
use crate::traits::BrowserSession;

/// Hides the `navigator.webdriver` automation flag.
pub const STEALTH_SCRIPT: &str =
    "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})";

/// Tunables for a pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Upper bound for each WAIT_READY wait.
    pub wait_timeout: Duration,
    /// Navigate/wait attempts per page before it is skipped.
    pub page_attempts: u32,
    /// Consecutive entry parse failures after which a page is abandoned.
    pub max_consecutive_parse_failures: u32,
    /// Consecutive empty or skipped pages that indicate schema drift.
    pub empty_page_threshold: u32,
    pub backoff: BackoffPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_secs(10),
            page_attempts: 3,
            max_consecutive_parse_failures: 5,
            empty_page_threshold: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Navigate,
    WaitReady,
    Extract,
    Parse,
    Normalize,
    Done,
    Fatal,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Fatal)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Init => "INIT",
            PipelineState::Navigate => "NAVIGATE",
            PipelineState::WaitReady => "WAIT_READY",
            PipelineState::Extract => "EXTRACT",
            PipelineState::Parse => "PARSE",
            PipelineState::Normalize => "NORMALIZE",
            PipelineState::Done => "DONE",
            PipelineState::Fatal => "FATAL",
        };
        f.write_str(name)
    }
}

/// What one [`ExtractionPipeline::next_page`] call produced.
#[derive(Debug)]
pub enum PageOutcome {
    /// At least one entry parsed.
    Records {
        page: u32,
        records: Vec<JobRecord>,
        parse_failures: u32,
    },
    /// The page never became ready within its attempts.
    Skipped { page: u32 },
    /// The page rendered but yielded no usable entries.
    Empty { page: u32 },
    /// No more pages: the run ended normally.
    Exhausted,
}

struct ParsedPage {
    records: Vec<JobRecord>,
    raw_entries: usize,
    parse_failures: u32,
    abandoned: bool,
}

pub struct ExtractionPipeline<S: BrowserSession> {
    adapter: Arc<dyn SourceAdapter>,
    session: S,
    limiter: RateLimiter,
    config: PipelineConfig,
    query: String,
    filters: JobFilters,
    state: PipelineState,
    page: u32,
    empty_streak: u32,
    last_page_productive: bool,
    pending_drift: Option<AppError>,
}

impl<S: BrowserSession> ExtractionPipeline<S> {
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        session: S,
        limiter: RateLimiter,
        config: PipelineConfig,
        query: impl Into<String>,
        filters: JobFilters,
    ) -> Self {
        Self {
            adapter,
            session,
            limiter,
            config,
            query: query.into(),
            filters,
            state: PipelineState::Init,
            page: 0,
            empty_streak: 0,
            last_page_productive: false,
            pending_drift: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Zero-based index of the next page to fetch.
    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn source(&self) -> &str {
        self.adapter.name()
    }

    fn context(&self) -> ScrapeContext {
        ScrapeContext::new(self.adapter.name(), self.query.clone(), self.page)
    }

    fn transition(&mut self, next: PipelineState) {
        tracing::trace!(
            source = %self.adapter.name(),
            page = self.page,
            from = %self.state,
            to = %next,
            "Pipeline transition"
        );
        self.state = next;
    }

    fn fail(&mut self, error: AppError) -> AppError {
        self.transition(PipelineState::Fatal);
        tracing::error!(
            source = %self.adapter.name(),
            page = self.page,
            category = error.category(),
            error = %error,
            "Pipeline failed"
        );
        error
    }

    /// Check the adapter's script policy against the session, then hide the
    /// automation flag once.
    async fn init(&mut self) -> Result<(), AppError> {
        let policy = self.adapter.script_policy();
        let scripts = self.session.supports_scripts();

        match policy {
            ScriptPolicy::Required if !scripts => {
                return Err(AppError::ConfigError(format!(
                    "Source '{}' renders listings with scripts; use a script-capable browser",
                    self.adapter.name()
                )));
            }
            ScriptPolicy::Disabled if scripts => {
                self.session.set_script_execution(false).await?;
            }
            _ => {}
        }

        if scripts && policy != ScriptPolicy::Disabled {
            if let Err(e) = self.session.execute_script(STEALTH_SCRIPT).await {
                tracing::warn!(source = %self.adapter.name(), error = %e, "Stealth script failed");
            }
        }
        Ok(())
    }

    /// NAVIGATE + WAIT_READY + content retrieval with bounded retries.
    ///
    /// Returns `None` when every attempt failed.
    async fn load_page(&mut self, url: &str) -> Result<Option<String>, AppError> {
        let context = self.context();
        let selector = self.adapter.ready_selector().to_string();

        for attempt in 1..=self.config.page_attempts.max(1) {
            self.limiter.admit(&self.config.backoff, &context).await?;

            self.transition(PipelineState::Navigate);
            if let Err(e) = self.session.navigate(url).await {
                tracing::warn!(%context, attempt, error = %e, "Navigation failed");
                continue;
            }

            self.transition(PipelineState::WaitReady);
            match self
                .session
                .wait_for_selector(&selector, self.config.wait_timeout)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    let timeout = AppError::PageTimeout {
                        context: context.clone(),
                        selector: selector.clone(),
                        waited: self.config.wait_timeout,
                    };
                    tracing::warn!(attempt, error = %timeout, "Page not ready");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(%context, attempt, error = %e, "Wait for selector failed");
                    continue;
                }
            }

            match self.session.content().await {
                Ok(content) => return Ok(Some(content)),
                Err(e) => {
                    tracing::warn!(%context, attempt, error = %e, "Content retrieval failed");
                }
            }
        }
        Ok(None)
    }

    /// EXTRACT + PARSE + NORMALIZE over one page of content.
    fn parse_page(&mut self, content: &str) -> ParsedPage {
        self.transition(PipelineState::Extract);
        let raw_entries = self.adapter.extract_raw_entries(content);

        self.transition(PipelineState::Parse);
        let mut records = Vec::with_capacity(raw_entries.len());
        let mut parse_failures = 0;
        let mut consecutive = 0;
        let mut abandoned = false;

        for (index, raw) in raw_entries.iter().enumerate() {
            let parsed = self
                .adapter
                .parse_entry(raw)
                .and_then(|record| normalize(record, self.adapter.name(), ScrapeMode::Dynamic));
            match parsed {
                Ok(record) => {
                    consecutive = 0;
                    records.push(record);
                }
                Err(e) => {
                    parse_failures += 1;
                    consecutive += 1;
                    tracing::debug!(
                        source = %self.adapter.name(),
                        page = self.page,
                        index,
                        error = %e,
                        "Skipping unparseable entry"
                    );
                    if consecutive >= self.config.max_consecutive_parse_failures.max(1) {
                        tracing::warn!(
                            source = %self.adapter.name(),
                            page = self.page,
                            consecutive,
                            "Too many consecutive parse failures, abandoning page"
                        );
                        abandoned = true;
                        break;
                    }
                }
            }
        }
        self.transition(PipelineState::Normalize);

        ParsedPage {
            records,
            raw_entries: raw_entries.len(),
            parse_failures,
            abandoned,
        }
    }

    /// Count an empty or skipped page and decide whether the run continues.
    fn register_empty(&mut self, at_cap: bool) -> Result<bool, AppError> {
        self.empty_streak += 1;
        if self.last_page_productive || at_cap {
            tracing::info!(
                source = %self.adapter.name(),
                page = self.page,
                "End of results"
            );
            return Ok(true);
        }
        if self.empty_streak >= self.config.empty_page_threshold {
            return Err(AppError::ScrapeSchemaDrift {
                context: self.context(),
                empty_pages: self.empty_streak,
            });
        }
        Ok(false)
    }

    /// Process the next results page.
    ///
    /// Returns [`PageOutcome::Exhausted`] once the pipeline is DONE. After a
    /// fatal error every further call also reports `Exhausted`.
    pub async fn next_page(&mut self) -> Result<PageOutcome, AppError> {
        if let Some(drift) = self.pending_drift.take() {
            return Err(self.fail(drift));
        }
        if self.state.is_terminal() {
            return Ok(PageOutcome::Exhausted);
        }

        if self.state == PipelineState::Init {
            let initialized = self.init().await;
            if let Err(e) = initialized {
                return Err(self.fail(e));
            }
        }

        let max_pages = self.adapter.max_pages();
        if max_pages.is_some_and(|max| self.page >= max) {
            self.transition(PipelineState::Done);
            return Ok(PageOutcome::Exhausted);
        }
        let at_cap = max_pages.is_some_and(|max| self.page + 1 >= max);
        let page = self.page;

        let url = match self
            .adapter
            .build_search_url(&self.query, &self.filters, page)
        {
            Ok(url) => url,
            Err(e) => return Err(self.fail(e)),
        };
        tracing::debug!(source = %self.adapter.name(), page, %url, "Fetching results page");

        let loaded = self.load_page(&url).await;
        let content = match loaded {
            Ok(content) => content,
            Err(e) => return Err(self.fail(e)),
        };

        let Some(content) = content else {
            tracing::warn!(
                source = %self.adapter.name(),
                page,
                attempts = self.config.page_attempts,
                "Skipping page after repeated failures"
            );
            return self.finish_empty(PageOutcome::Skipped { page }, at_cap);
        };

        let parsed = self.parse_page(&content);
        if parsed.records.is_empty() {
            return self.finish_empty(PageOutcome::Empty { page }, at_cap);
        }

        if parsed.abandoned {
            self.empty_streak += 1;
            self.last_page_productive = false;
            if self.empty_streak >= self.config.empty_page_threshold {
                self.pending_drift = Some(AppError::ScrapeSchemaDrift {
                    context: self.context(),
                    empty_pages: self.empty_streak,
                });
            }
        } else {
            self.empty_streak = 0;
            self.last_page_productive = true;
        }

        let short_page = self
            .adapter
            .page_size()
            .is_some_and(|size| parsed.raw_entries < size);
        tracing::info!(
            source = %self.adapter.name(),
            page,
            records = parsed.records.len(),
            parse_failures = parsed.parse_failures,
            "Page extracted"
        );

        self.page += 1;
        if !parsed.abandoned && (short_page || at_cap) {
            self.transition(PipelineState::Done);
        } else {
            self.transition(PipelineState::Navigate);
        }

        Ok(PageOutcome::Records {
            page,
            records: parsed.records,
            parse_failures: parsed.parse_failures,
        })
    }

    fn finish_empty(&mut self, outcome: PageOutcome, at_cap: bool) -> Result<PageOutcome, AppError> {
        match self.register_empty(at_cap) {
            Ok(true) => {
                self.page += 1;
                self.transition(PipelineState::Done);
                Ok(PageOutcome::Exhausted)
            }
            Ok(false) => {
                self.page += 1;
                self.last_page_productive = false;
                self.transition(PipelineState::Navigate);
                Ok(outcome)
            }
            Err(e) => Err(self.fail(e)),
        }
    }
}
