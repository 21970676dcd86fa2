use jobharvest_core::service::JobScraper;
use jobharvest_db::{Database, PgJobStore};

/// Browser transport used for live scrapes.
#[cfg(feature = "browser")]
pub type Launcher = jobharvest_client::ChromiumLauncher;
#[cfg(not(feature = "browser"))]
pub type Launcher = jobharvest_client::HttpLauncher;

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub db: Database,
    pub scraper: JobScraper<Launcher, PgJobStore>,
    /// Admin token protecting live scrapes (None = scrape endpoint disabled).
    pub admin_token: Option<String>,
}
