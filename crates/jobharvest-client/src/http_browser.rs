use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use jobharvest_core::error::AppError;
use jobharvest_core::traits::{BrowserLauncher, BrowserSession};
use reqwest::Client;
use scraper::{Html, Selector};
use tokio::sync::Mutex;

/// Desktop User-Agents handed out in turn, one per session.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124 Safari/537.36",
];

/// Launches [`HttpBrowser`] sessions.
///
/// Clones share the User-Agent rotation.
#[derive(Clone)]
pub struct HttpLauncher {
    timeout: Duration,
    next_agent: Arc<AtomicUsize>,
}

impl HttpLauncher {
    /// Launcher whose sessions give up on a request after **30 s**.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            next_agent: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Default for HttpLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserLauncher for HttpLauncher {
    type Session = HttpBrowser;

    async fn launch(&self) -> Result<HttpBrowser, AppError> {
        let index = self.next_agent.fetch_add(1, Ordering::Relaxed) % USER_AGENTS.len();
        HttpBrowser::new(USER_AGENTS[index], self.timeout)
    }
}

/// Plain HTTP transport: navigation is a GET, the DOM is the response body.
///
/// Pages are never rendered, so client-side content is invisible and
/// scripts cannot run. Waiting for a selector checks the fetched document
/// once instead of polling.
pub struct HttpBrowser {
    client: Client,
    user_agent: &'static str,
    timeout: Duration,
    page: Mutex<Option<String>>,
}

impl HttpBrowser {
    pub fn new(user_agent: &'static str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::BrowserError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            user_agent,
            timeout,
            page: Mutex::new(None),
        })
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent
    }
}

impl BrowserSession for HttpBrowser {
    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        // A failed navigation must not leave the previous page in place.
        *self.page.lock().await = None;

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::BrowserError(format!(
                    "Timed out after {}s loading {url}",
                    self.timeout.as_secs()
                ))
            } else if e.is_connect() {
                AppError::BrowserError(format!("Connection failed for {url}: {e}"))
            } else {
                AppError::BrowserError(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::BrowserError(format!(
                "HTTP {} for {url}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to read response body: {e}")))?;
        tracing::debug!(url, bytes = body.len(), "Page fetched");

        *self.page.lock().await = Some(body);
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<bool, AppError> {
        let page = self.page.lock().await;
        let html = page
            .as_deref()
            .ok_or_else(|| AppError::BrowserError("No page loaded".into()))?;
        let selector = Selector::parse(selector)
            .map_err(|e| AppError::BrowserError(format!("Invalid selector '{selector}': {e}")))?;
        Ok(Html::parse_document(html).select(&selector).next().is_some())
    }

    async fn content(&self) -> Result<String, AppError> {
        self.page
            .lock()
            .await
            .clone()
            .ok_or_else(|| AppError::BrowserError("No page loaded".into()))
    }

    async fn execute_script(&self, _script: &str) -> Result<(), AppError> {
        Err(AppError::BrowserError(
            "The HTTP transport cannot execute scripts".into(),
        ))
    }

    fn supports_scripts(&self) -> bool {
        false
    }

    async fn set_script_execution(&self, enabled: bool) -> Result<(), AppError> {
        if enabled {
            Err(AppError::BrowserError(
                "The HTTP transport cannot execute scripts".into(),
            ))
        } else {
            Ok(())
        }
    }
}
