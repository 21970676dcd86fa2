use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::emulation::SetScriptExecutionDisabledParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use jobharvest_core::error::AppError;
use jobharvest_core::traits::{BrowserLauncher, BrowserSession};
use tokio::time::Instant;

use crate::http_browser::USER_AGENTS;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Headless Chromium driven over the Chrome DevTools Protocol.
///
/// One Chromium process is shared by all clones; every
/// [`launch`](BrowserLauncher::launch) opens a fresh tab that is closed
/// when its [`ChromiumSession`] is dropped.
///
/// # Example
///
/// ```rust,no_run
/// use jobharvest_client::ChromiumLauncher;
/// use jobharvest_core::traits::{BrowserLauncher, BrowserSession};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let launcher = ChromiumLauncher::new().await?;
/// let session = launcher.launch().await?;
/// session.navigate("https://example.com").await?;
/// println!("{}", session.content().await?.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ChromiumLauncher {
    browser: Arc<Browser>,
    next_agent: Arc<AtomicUsize>,
}

impl ChromiumLauncher {
    /// Launch headless Chromium.
    ///
    /// Honours `CHROME_BIN`, then well-known install paths, then whatever
    /// `chromiumoxide` finds on its own.
    pub async fn new() -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

        if let Some(bin) = find_chrome_binary() {
            tracing::info!(binary = %bin.display(), "Using Chrome binary");
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--window-size=1366,900")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::ConfigError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the connection to make progress.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser CDP handler error");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            next_agent: Arc::new(AtomicUsize::new(0)),
        })
    }
}

/// Locate a Chrome/Chromium binary.
///
/// The snap wrapper at `/snap/bin/chromium` strips unknown flags and breaks
/// headless mode, so the real binary inside the snap is preferred.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

impl BrowserLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self) -> Result<ChromiumSession, AppError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to open tab: {e}")))?;

        let index = self.next_agent.fetch_add(1, Ordering::Relaxed) % USER_AGENTS.len();
        page.set_user_agent(USER_AGENTS[index])
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to set User-Agent: {e}")))?;

        Ok(ChromiumSession { page })
    }
}

/// One Chromium tab.
pub struct ChromiumSession {
    page: Page,
}

impl BrowserSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to navigate to {url}: {e}")))?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool, AppError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if Instant::now() + POLL_INTERVAL > deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn content(&self) -> Result<String, AppError> {
        self.page
            .content()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to read page content: {e}")))
    }

    async fn execute_script(&self, script: &str) -> Result<(), AppError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| AppError::BrowserError(format!("Script failed: {e}")))?;
        Ok(())
    }

    fn supports_scripts(&self) -> bool {
        true
    }

    async fn set_script_execution(&self, enabled: bool) -> Result<(), AppError> {
        self.page
            .execute(SetScriptExecutionDisabledParams::new(!enabled))
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to toggle scripts: {e}")))?;
        tracing::debug!(enabled, "Script execution toggled");
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        let page = self.page.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = page.close().await {
                    tracing::debug!(error = %e, "Failed to close tab");
                }
            });
        }
    }
}
