use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use jobharvest_core::error::AppError;
use jobharvest_core::models::{JobFilters, ScrapeMode, TagCategory};
use jobharvest_core::orchestrator::{DEFAULT_LIMIT, ScrapeRequest};
use jobharvest_core::service::ScrapeResults;
use jobharvest_core::traits::JobStore;

use crate::auth::require_admin_token;
use crate::dto::{
    ErrorResponse, HealthResponse, JobListQuery, JobListResponse, JobResponse, ScrapeBody,
    ScrapeResponse, StatsResponse, TagListQuery, TagListResponse, TagResponse,
};
use crate::error::ApiError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

const DEFAULT_TAG_LIMIT: usize = 20;
const MAX_TAG_LIMIT: usize = 100;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/v1/scrape", post(scrape))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ));

    let public = Router::new()
        .route("/health", get(health))
        .route("/v1/jobs", get(list_jobs))
        .route("/v1/tags", get(list_tags))
        .route("/v1/tags/{name}", get(get_tag))
        .route("/v1/stats", get(stats))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public.merge(admin).with_state(state)
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/jobs",
    params(JobListQuery),
    responses(
        (status = 200, description = "Stored jobs, newest first", body = JobListResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
    ),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let request = ScrapeRequest {
        mode: ScrapeMode::Static,
        source: query.source.clone(),
        query: query.query.clone().unwrap_or_default(),
        filters: JobFilters {
            query: None,
            source: None,
            ..query.filters()
        },
        limit: query.limit(),
        offset: query.offset(),
    };

    let records = state
        .scraper
        .scrape(&request, CancellationToken::new())
        .await?
        .into_records();
    let total = state.scraper.store().count(&request.static_filters()).await?;

    let response = JobListResponse {
        jobs: records.into_iter().map(JobResponse::from).collect(),
        total,
        limit: request.limit,
        offset: request.offset,
    };

    Ok(axum::Json(response))
}

// ---------------------------------------------------------------------------
// Scrape
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/v1/scrape",
    request_body = ScrapeBody,
    responses(
        (status = 200, description = "Jobs fetched live and reconciled", body = ScrapeResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Live scraping disabled", body = ErrorResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse),
        (status = 502, description = "Source layout changed", body = ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "scrape"
)]
pub async fn scrape(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<ScrapeBody>,
) -> Result<impl IntoResponse, ApiError> {
    let request = ScrapeRequest {
        mode: ScrapeMode::Dynamic,
        source: Some(body.source.clone()),
        query: body.query.clone(),
        filters: body.filters(),
        limit: body.limit.unwrap_or(DEFAULT_LIMIT),
        offset: 0,
    };

    // Stops the run if the client goes away and this future is dropped.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let ScrapeResults::Dynamic { jobs, error } = state.scraper.scrape(&request, cancel).await?
    else {
        return Err(AppError::Generic("live scrape returned stored records".into()).into());
    };

    if let Some(e) = &error {
        tracing::warn!(error = %e, category = e.category(), source = %body.source, "Live scrape stopped early");
    }

    Ok(axum::Json(ScrapeResponse::new(jobs, error)))
}

// ---------------------------------------------------------------------------
// Tags & stats
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/v1/tags",
    params(TagListQuery),
    responses(
        (status = 200, description = "Most used tags", body = TagListResponse),
        (status = 400, description = "Unknown category", body = ErrorResponse),
    ),
    tag = "tags"
)]
pub async fn list_tags(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TagListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let category = query
        .category
        .as_deref()
        .map(str::parse::<TagCategory>)
        .transpose()
        .map_err(AppError::ValidationError)?;
    let limit = query.limit.unwrap_or(DEFAULT_TAG_LIMIT).min(MAX_TAG_LIMIT);

    let tags = state.scraper.store().popular_tags(limit, category).await?;

    Ok(axum::Json(TagListResponse {
        tags: tags.into_iter().map(TagResponse::from).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/tags/{name}",
    params(
        ("name" = String, Path, description = "Tag name, e.g. rust or location:pune")
    ),
    responses(
        (status = 200, description = "Tag counter", body = TagResponse),
        (status = 404, description = "Not found", body = ErrorResponse),
    ),
    tag = "tags"
)]
pub async fn get_tag(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.scraper.store().get_tag(&name).await? {
        Some(tag) => Ok(axum::Json(TagResponse::from(tag)).into_response()),
        None => {
            let body = ErrorResponse::new("not_found", format!("Tag not found: {name}"));
            Ok((StatusCode::NOT_FOUND, axum::Json(body)).into_response())
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/stats",
    responses(
        (status = 200, description = "Store-wide job and tag counters", body = StatsResponse),
    ),
    tag = "tags"
)]
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let store = state.scraper.store();
    let jobs = store.job_stats().await?;
    let tags = store.tag_stats(Utc::now()).await?;
    Ok(axum::Json(StatsResponse::new(jobs, tags)))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let healthy = state.db.health_check().await.is_ok();

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        database: if healthy { "ok" } else { "error" },
    };

    (status, axum::Json(response))
}
