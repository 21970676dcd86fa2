use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Where in a scrape run an error happened.
///
/// Attached to every scrape-stage error so log lines and API responses can be
/// correlated with the source, query and page that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScrapeContext {
    pub source: String,
    pub query: String,
    pub page: u32,
}

impl ScrapeContext {
    pub fn new(source: impl Into<String>, query: impl Into<String>, page: u32) -> Self {
        Self {
            source: source.into(),
            query: query.into(),
            page,
        }
    }
}

impl fmt::Display for ScrapeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "source={} page={} query={:?}",
            self.source, self.page, self.query
        )
    }
}

/// Application-wide error types for jobharvest.
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid filters, limit, offset or source.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Admission was denied by the per-source token bucket after bounded retries.
    #[error("Rate limited after {attempts} attempts ({context}), retry after {retry_after:?}")]
    RateLimited {
        context: ScrapeContext,
        attempts: u32,
        retry_after: Duration,
    },

    /// The page never showed its ready marker within the wait bound.
    #[error("Timed out after {waited:?} waiting for '{selector}' ({context})")]
    PageTimeout {
        context: ScrapeContext,
        selector: String,
        waited: Duration,
    },

    /// Too many consecutive empty pages: the adapter no longer matches the site.
    #[error("Schema drift: {empty_pages} consecutive empty pages ({context})")]
    ScrapeSchemaDrift {
        context: ScrapeContext,
        empty_pages: u32,
    },

    /// An upsert or tag-count adjustment failed.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// Navigation, content retrieval or script execution failed.
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Coarse category suitable for end users and metrics labels.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "validation_error",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::PageTimeout { .. } => "page_timeout",
            AppError::ScrapeSchemaDrift { .. } => "schema_drift",
            AppError::PersistenceError(_) => "persistence_error",
            AppError::BrowserError(_) => "browser_error",
            AppError::ConfigError(_) => "config_error",
            AppError::SerializationError(_) => "serialization_error",
            AppError::Generic(_) => "internal_error",
        }
    }

    /// Returns true if the whole request is worth retrying later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::RateLimited { .. } | AppError::PageTimeout { .. } | AppError::BrowserError(_)
        )
    }

    /// Returns true if this error ends the current scrape run.
    ///
    /// Page timeouts are absorbed by the pipeline and persistence failures
    /// only mark a record as unpersisted; everything else is terminal.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AppError::PageTimeout { .. } | AppError::PersistenceError(_)
        )
    }

    /// Scrape context, when the error came out of a scrape stage.
    pub fn context(&self) -> Option<&ScrapeContext> {
        match self {
            AppError::RateLimited { context, .. }
            | AppError::PageTimeout { context, .. }
            | AppError::ScrapeSchemaDrift { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ScrapeContext {
        ScrapeContext::new("linkedin", "rust developer", 2)
    }

    #[test]
    fn test_retryable_errors() {
        assert!(
            AppError::RateLimited {
                context: ctx(),
                attempts: 3,
                retry_after: Duration::from_secs(1),
            }
            .is_retryable()
        );
        assert!(AppError::BrowserError("reset".into()).is_retryable());
        assert!(!AppError::ValidationError("bad offset".into()).is_retryable());
        assert!(
            !AppError::ScrapeSchemaDrift {
                context: ctx(),
                empty_pages: 3,
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(
            AppError::ScrapeSchemaDrift {
                context: ctx(),
                empty_pages: 3,
            }
            .is_fatal()
        );
        assert!(AppError::ValidationError("x".into()).is_fatal());
        assert!(!AppError::PersistenceError("disk full".into()).is_fatal());
        assert!(
            !AppError::PageTimeout {
                context: ctx(),
                selector: "li".into(),
                waited: Duration::from_secs(30),
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_messages_carry_context() {
        let err = AppError::ScrapeSchemaDrift {
            context: ctx(),
            empty_pages: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("source=linkedin"));
        assert!(msg.contains("page=2"));
        assert!(msg.contains("rust developer"));
        assert_eq!(err.category(), "schema_drift");
        assert_eq!(err.context().map(|c| c.page), Some(2));
    }
}
