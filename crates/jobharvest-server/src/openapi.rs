use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "jobharvest API",
        version = "0.1.0",
        description = "Job listing scraper with deduplicating storage and tag statistics."
    ),
    paths(
        crate::routes::list_jobs,
        crate::routes::scrape,
        crate::routes::list_tags,
        crate::routes::get_tag,
        crate::routes::stats,
        crate::routes::health,
    ),
    components(schemas(
        crate::dto::JobResponse,
        crate::dto::JobListResponse,
        crate::dto::ScrapeBody,
        crate::dto::ScrapeResponse,
        crate::dto::TagResponse,
        crate::dto::TagListResponse,
        crate::dto::SourceCount,
        crate::dto::CategoryCount,
        crate::dto::TagStatsResponse,
        crate::dto::StatsResponse,
        crate::dto::HealthResponse,
        crate::dto::ErrorResponse,
    )),
    tags(
        (name = "jobs", description = "Stored job records"),
        (name = "scrape", description = "Live scraping"),
        (name = "tags", description = "Tag counters and statistics"),
        (name = "system", description = "Health and system status"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Adds Bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("token")
                        .description(Some(
                            "Admin token for live scrapes. Set via JOBHARVEST_ADMIN_TOKEN environment variable.",
                        ))
                        .build(),
                ),
            );
        }
    }
}
