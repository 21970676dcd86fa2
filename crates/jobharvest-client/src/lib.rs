//! Browser transports and job-board adapters.
//!
//! [`HttpLauncher`] is always available; [`ChromiumLauncher`] needs the
//! `browser` feature and a local Chrome/Chromium install.

pub mod adapters;
#[cfg(feature = "browser")]
pub mod browser;
pub mod http_browser;

pub use adapters::{LinkedInAdapter, NaukriAdapter, default_registry};
#[cfg(feature = "browser")]
pub use browser::{ChromiumLauncher, ChromiumSession};
pub use http_browser::{HttpBrowser, HttpLauncher};
