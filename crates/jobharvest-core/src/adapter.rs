use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::error::AppError;
use crate::models::{JobFilters, JobRecord};

/// How an adapter's target site relates to page script execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScriptPolicy {
    /// Listings are server-rendered; scripts may run or not.
    #[default]
    Optional,
    /// Listings are rendered client-side; a script-capable browser is needed.
    Required,
    /// Scripts must be switched off for this site.
    Disabled,
}

/// Why a single raw entry could not be turned into a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid job url: {0}")]
    InvalidUrl(String),

    #[error("malformed entry: {0}")]
    Malformed(String),
}

/// Site-specific scraping rules for one job board.
///
/// Adapters are pure: they build URLs and parse page content, but never
/// perform I/O. The extraction pipeline drives them.
pub trait SourceAdapter: Send + Sync {
    /// Registry name, also stored as `JobRecord::source`.
    fn name(&self) -> &str;

    /// Search results URL for a zero-based `page`.
    fn build_search_url(
        &self,
        query: &str,
        filters: &JobFilters,
        page: u32,
    ) -> Result<String, AppError>;

    /// Selector whose presence means the results have rendered.
    fn ready_selector(&self) -> &str;

    /// Split a results page into one raw blob per listing.
    fn extract_raw_entries(&self, page_content: &str) -> Vec<String>;

    /// Turn one raw blob into a record.
    fn parse_entry(&self, raw: &str) -> Result<JobRecord, ParseError>;

    /// Listings per full page, if the site uses a fixed page size.
    fn page_size(&self) -> Option<usize> {
        None
    }

    /// Number of result pages the site serves at most.
    fn max_pages(&self) -> Option<u32> {
        None
    }

    fn script_policy(&self) -> ScriptPolicy {
        ScriptPolicy::Optional
    }
}

/// Fixed mapping of source names to adapters.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: BTreeMap<String, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an adapter under its own name, replacing any previous one.
    pub fn register(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.insert(adapter.name().to_string(), adapter);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&name.to_lowercase()).cloned()
    }

    /// Like [`get`](Self::get) but unknown names are a validation error.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn SourceAdapter>, AppError> {
        self.get(name).ok_or_else(|| {
            AppError::ValidationError(format!(
                "Unknown source '{}'. Available: {}",
                name,
                self.names().join(", ")
            ))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }
}

impl fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}
