use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

use jobharvest_client::{HttpLauncher, default_registry};
use jobharvest_core::orchestrator::Orchestrator;
use jobharvest_core::pipeline::PipelineConfig;
use jobharvest_core::rate_limiter::{RateLimiterConfig, RateLimiters};
use jobharvest_core::service::JobScraper;
use jobharvest_db::{Database, PgJobStore};
use jobharvest_server::routes;
use jobharvest_server::state::AppState;

pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

pub struct TestApp {
    pub router: Router,
    pub store: PgJobStore,
    _container: ContainerAsync<GenericImage>,
}

/// Spin up a PostgreSQL container and return the app with admin auth enabled.
pub async fn setup_test_app() -> TestApp {
    setup(Some(TEST_ADMIN_TOKEN.to_string())).await
}

/// Same as [`setup_test_app`] but without an admin token, so live scrapes are disabled.
pub async fn setup_test_app_no_auth() -> TestApp {
    setup(None).await
}

async fn setup(admin_token: Option<String>) -> TestApp {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "jobharvest_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let url = format!("postgresql://postgres:postgres@{host}:{port}/jobharvest_test");

    let db = Database::from_pool(retry_connect(&url).await);
    db.migrate().await.expect("Failed to run migrations");

    let store = db.job_store();
    let orchestrator = Orchestrator::new(
        default_registry(),
        RateLimiters::new(RateLimiterConfig::default()),
        PipelineConfig::default(),
        store.clone(),
    );
    let state = Arc::new(AppState {
        db,
        scraper: JobScraper::new(orchestrator, HttpLauncher::new()),
        admin_token,
    });

    TestApp {
        router: routes::router(state),
        store,
        _container: container,
    }
}

async fn retry_connect(url: &str) -> PgPool {
    for _ in 0..30 {
        if let Ok(pool) = PgPoolOptions::new().max_connections(5).connect(url).await {
            return pool;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("Failed to connect to test database");
}
