use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

use jobharvest_core::models::JobRecord;
use jobharvest_core::traits::JobStore;
use jobharvest_db::PgJobStore;

use crate::integration::common::{TEST_ADMIN_TOKEN, TestApp, setup_test_app, setup_test_app_no_auth};

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

fn scrape_request(token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::post("/v1/scrape").header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn seed(store: &PgJobStore, source: &str, slug: &str, day: u32, remote: bool, tags: &[&str]) {
    let mut record = JobRecord::new(
        source,
        format!("https://jobs.example/{source}/{slug}"),
        format!("Rust Engineer {slug}"),
        "Acme",
    );
    record.posted_date = Some(Utc.with_ymd_and_hms(2024, 5, day, 0, 0, 0).unwrap());
    record.is_remote = remote;
    record.tags = tags.iter().map(|t| t.to_string()).collect();
    store.upsert(&record).await.unwrap();
    for tag in tags {
        store.increment_tag_count(tag).await.unwrap();
    }
}

async fn seed_three(store: &PgJobStore) {
    seed(store, "linkedin", "a", 10, false, &["rust", "source:linkedin"]).await;
    seed(store, "linkedin", "b", 20, true, &["rust", "remote", "source:linkedin"]).await;
    seed(store, "naukri", "c", 15, false, &["go", "location:pune", "source:naukri"]).await;
}

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app().await;

    let (status, json) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "ok");
}

#[tokio::test]
async fn list_jobs_is_public_and_newest_first() {
    let app = setup_test_app().await;
    seed_three(&app.store).await;

    let (status, json) = get(&app, "/v1/jobs").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 3);
    assert_eq!(json["limit"], 100);
    let urls: Vec<&str> = json["jobs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["job_url"].as_str().unwrap())
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://jobs.example/linkedin/b",
            "https://jobs.example/naukri/c",
            "https://jobs.example/linkedin/a",
        ]
    );
    assert!(json["jobs"][0].get("outcome").is_none());
}

#[tokio::test]
async fn list_jobs_applies_filters_and_window() {
    let app = setup_test_app().await;
    seed_three(&app.store).await;

    let (_, json) = get(&app, "/v1/jobs?source=linkedin&limit=1&offset=1").await;
    assert_eq!(json["total"], 2);
    assert_eq!(json["jobs"].as_array().unwrap().len(), 1);
    assert_eq!(json["jobs"][0]["job_url"], "https://jobs.example/linkedin/a");

    let (_, json) = get(&app, "/v1/jobs?tags=go,remote").await;
    assert_eq!(json["total"], 2);

    let (_, json) = get(&app, "/v1/jobs?is_remote=true").await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["jobs"][0]["is_remote"], true);

    let (_, json) = get(&app, "/v1/jobs?query=engineer%20c").await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["jobs"][0]["source"], "naukri");
}

#[tokio::test]
async fn list_jobs_rejects_bad_limit_and_source() {
    let app = setup_test_app().await;

    for uri in ["/v1/jobs?limit=0", "/v1/jobs?limit=1001", "/v1/jobs?source=monster"] {
        let (status, json) = get(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(json["error"], "validation_error", "{uri}");
    }
}

#[tokio::test]
async fn scrape_without_token_returns_401() {
    let app = setup_test_app().await;
    let body = serde_json::json!({"source": "linkedin", "query": "rust"});

    let (status, json) = send(&app, scrape_request(None, body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "unauthorized");

    let (status, _) = send(&app, scrape_request(Some("wrong-token"), body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn no_admin_token_returns_403() {
    let app = setup_test_app_no_auth().await;

    let body = serde_json::json!({"source": "linkedin", "query": "rust"});
    let (status, json) = send(&app, scrape_request(Some("any-token"), body)).await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "forbidden");
}

#[tokio::test]
async fn scrape_validates_before_launching() {
    let app = setup_test_app().await;

    let cases = [
        serde_json::json!({"source": "monster", "query": "rust"}),
        serde_json::json!({"source": "linkedin", "query": "   "}),
        serde_json::json!({"source": "linkedin", "query": "rust", "limit": 0}),
    ];
    for body in cases {
        let (status, json) = send(&app, scrape_request(Some(TEST_ADMIN_TOKEN), body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(json["error"], "validation_error", "{body}");
    }
}

#[tokio::test]
async fn tags_are_ranked_and_filterable() {
    let app = setup_test_app().await;
    seed_three(&app.store).await;

    let (status, json) = get(&app, "/v1/tags?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let tags = json["tags"].as_array().unwrap();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0]["name"], "rust");
    assert_eq!(tags[0]["count"], 2);
    assert_eq!(tags[1]["name"], "source:linkedin");

    let (_, json) = get(&app, "/v1/tags?category=location").await;
    assert_eq!(json["tags"][0]["name"], "location:pune");
    assert_eq!(json["tags"][0]["category"], "location");

    let (status, json) = get(&app, "/v1/tags?category=nonsense").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn get_tag_returns_counter_or_404() {
    let app = setup_test_app().await;
    seed_three(&app.store).await;

    let (status, json) = get(&app, "/v1/tags/go").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 1);
    assert_eq!(json["category"], "technology");

    let (status, json) = get(&app, "/v1/tags/cobol").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn stats_group_by_source() {
    let app = setup_test_app().await;
    seed_three(&app.store).await;

    let (status, json) = get(&app, "/v1/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_jobs"], 3);
    assert_eq!(json["remote_jobs"], 1);
    assert_eq!(json["jobs_by_source"][0]["source"], "linkedin");
    assert_eq!(json["jobs_by_source"][0]["count"], 2);
    assert_eq!(json["jobs_by_source"][1]["source"], "naukri");

    let tags = &json["tags"];
    assert_eq!(tags["total_tags"], 6);
    assert_eq!(tags["most_popular"][0]["name"], "rust");
    assert_eq!(tags["most_popular"][0]["count"], 2);
    assert_eq!(tags["tags_by_category"].as_array().unwrap().len(), 3);
    assert_eq!(tags["tags_by_category"][0]["category"], "location");
    assert_eq!(tags["tags_by_category"][0]["tags"], 2);
    assert_eq!(tags["recent_tags"].as_array().unwrap().len(), 5);
    assert_eq!(tags["growth_rate"], 600.0);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = setup_test_app().await;

    let (status, json) = get(&app, "/api-docs/openapi.json").await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/v1/scrape"].is_object());
}
