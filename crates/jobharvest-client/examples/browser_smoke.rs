/// Smoke-test for `ChromiumLauncher`.
///
/// Launches a headless Chromium, loads <https://example.com> in a fresh
/// session, and verifies the rendered HTML contains the expected `<h1>`.
///
/// Run with:
///   cargo run -p jobharvest-client --example browser_smoke --features browser
use std::time::Duration;

use jobharvest_client::ChromiumLauncher;
use jobharvest_core::traits::{BrowserLauncher, BrowserSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    println!("Launching headless browser...");
    let launcher = ChromiumLauncher::new().await?;
    let session = launcher.launch().await?;

    let url = "https://example.com";
    println!("Loading {url} ...");
    session.navigate(url).await?;

    let ready = session.wait_for_selector("h1", Duration::from_secs(10)).await?;
    assert!(ready, "<h1> never appeared");

    let html = session.content().await?;
    assert!(
        html.contains("Example Domain"),
        "Expected heading not found in rendered HTML"
    );

    session.set_script_execution(false).await?;
    println!("OK, got {} bytes of rendered HTML", html.len());
    Ok(())
}
