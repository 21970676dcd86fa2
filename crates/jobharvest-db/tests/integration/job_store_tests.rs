use chrono::{TimeDelta, TimeZone, Utc};
use jobharvest_core::models::{JobFilters, JobRecord, ReconcileOutcome, TagCategory, UpsertOutcome};
use jobharvest_core::reconcile::DedupReconciler;
use jobharvest_core::traits::JobStore;
use jobharvest_db::PgJobStore;

use crate::integration::common::setup_test_db;

fn record(source: &str, url: &str, title: &str, tags: &[&str]) -> JobRecord {
    let mut record = JobRecord::new(source, url, title, "Acme");
    record.tags = tags.iter().map(|t| t.to_string()).collect();
    record
}

#[tokio::test]
async fn upsert_inserts_then_updates_volatile_fields() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);

    let mut job = record("linkedin", "https://x/1", "Rust Engineer", &["rust"]);
    job.location = Some("Pune".into());
    assert_eq!(store.upsert(&job).await.unwrap(), UpsertOutcome::Inserted);
    let stored = store.find_by_key("linkedin", "https://x/1").await.unwrap().unwrap();

    let mut changed = job.clone();
    changed.title = "Renamed".into();
    changed.salary = Some("10-12 LPA".into());
    changed.salary_min = Some(1_000_000);
    changed.salary_max = Some(1_200_000);
    changed.tags.insert("tokio".into());
    changed.created_at = Utc::now() + chrono::Duration::days(1);
    changed.updated_at = Utc::now() + chrono::Duration::days(1);
    assert_eq!(store.upsert(&changed).await.unwrap(), UpsertOutcome::Updated);

    let updated = store.find_by_key("linkedin", "https://x/1").await.unwrap().unwrap();
    assert_eq!(updated.title, "Rust Engineer");
    assert_eq!(updated.location.as_deref(), Some("Pune"));
    assert_eq!(updated.salary.as_deref(), Some("10-12 LPA"));
    assert_eq!(updated.salary_min, Some(1_000_000));
    assert!(updated.tags.contains("tokio"));
    assert_eq!(updated.created_at, stored.created_at);
    assert!(updated.updated_at > stored.updated_at);
}

#[tokio::test]
async fn find_by_key_misses_other_sources() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);

    store
        .upsert(&record("linkedin", "https://x/1", "Rust", &[]))
        .await
        .unwrap();
    assert!(store.find_by_key("naukri", "https://x/1").await.unwrap().is_none());
}

#[tokio::test]
async fn query_orders_newest_first_with_undated_last() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);

    let mut old = record("linkedin", "https://x/old", "Old", &[]);
    old.posted_date = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    let undated = record("linkedin", "https://x/undated", "Undated", &[]);
    let mut new = record("linkedin", "https://x/new", "New", &[]);
    new.posted_date = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
    for job in [&old, &undated, &new] {
        store.upsert(job).await.unwrap();
    }

    let titles: Vec<String> = store
        .query(&JobFilters::default(), 10, 0)
        .await
        .unwrap()
        .into_iter()
        .map(|j| j.title)
        .collect();
    assert_eq!(titles, vec!["New", "Old", "Undated"]);

    let window = store.query(&JobFilters::default(), 1, 1).await.unwrap();
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].title, "Old");
}

#[tokio::test]
async fn query_and_count_apply_filters() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);

    let mut remote = record("linkedin", "https://x/1", "Senior Rust Engineer", &["rust", "remote"]);
    remote.is_remote = true;
    let mut onsite = record("naukri", "https://x/2", "Python Developer", &["python"]);
    onsite.location = Some("Bengaluru, India".into());
    let mut literal = record("naukri", "https://x/3", "100% Rust", &["rust"]);
    literal.company = "Globex".into();
    for job in [&remote, &onsite, &literal] {
        store.upsert(job).await.unwrap();
    }

    let cases = [
        (JobFilters { query: Some("rust".into()), ..Default::default() }, 2),
        (JobFilters { query: Some("100%".into()), ..Default::default() }, 1),
        (JobFilters { source: Some("naukri".into()), ..Default::default() }, 2),
        (JobFilters { company: Some("glob".into()), ..Default::default() }, 1),
        (JobFilters { location: Some("bengaluru".into()), ..Default::default() }, 1),
        (JobFilters { is_remote: Some(true), ..Default::default() }, 1),
        (JobFilters { tags: vec!["Python".into(), "remote".into()], ..Default::default() }, 2),
        (JobFilters { query: Some("rust".into()), is_remote: Some(false), ..Default::default() }, 1),
    ];
    for (filters, expected) in cases {
        assert_eq!(store.count(&filters).await.unwrap(), expected, "{filters:?}");
        assert_eq!(
            store.query(&filters, 100, 0).await.unwrap().len() as u64,
            expected,
            "{filters:?}"
        );
    }
}

#[tokio::test]
async fn tag_counts_floor_at_zero() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);

    store.increment_tag_count("rust").await.unwrap();
    store.increment_tag_count("rust").await.unwrap();
    let tag = store.get_tag("rust").await.unwrap().unwrap();
    assert_eq!(tag.count, 2);
    assert_eq!(tag.category, TagCategory::Technology);

    for _ in 0..4 {
        store.decrement_tag_count("rust").await.unwrap();
    }
    assert_eq!(store.get_tag("rust").await.unwrap().unwrap().count, 0);

    // Unknown tags are left alone.
    store.decrement_tag_count("cobol").await.unwrap();
    assert!(store.get_tag("cobol").await.unwrap().is_none());
}

#[tokio::test]
async fn popular_tags_rank_by_count_and_filter_category() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);

    for (name, times) in [("rust", 3), ("python", 1), ("location:pune", 2), ("go", 1)] {
        for _ in 0..times {
            store.increment_tag_count(name).await.unwrap();
        }
    }

    let names: Vec<String> = store
        .popular_tags(3, None)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["rust", "location:pune", "go"]);

    let locations = store
        .popular_tags(10, Some(TagCategory::Location))
        .await
        .unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].name, "location:pune");
}

#[tokio::test]
async fn job_stats_group_by_source() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);

    let mut remote = record("naukri", "https://x/1", "A", &[]);
    remote.is_remote = true;
    store.upsert(&remote).await.unwrap();
    store.upsert(&record("naukri", "https://x/2", "B", &[])).await.unwrap();
    store.upsert(&record("linkedin", "https://x/3", "C", &[])).await.unwrap();

    let stats = store.job_stats().await.unwrap();
    assert_eq!(stats.total_jobs, 3);
    assert_eq!(stats.remote_jobs, 1);
    assert_eq!(
        stats.jobs_by_source,
        vec![("naukri".to_string(), 2), ("linkedin".to_string(), 1)]
    );
}

#[tokio::test]
async fn reconciler_is_idempotent_against_postgres() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);
    let reconciler = DedupReconciler::new(store.clone());

    let job = record("linkedin", "https://x/1", "Rust", &["rust", "search:rust"]);
    let (_, first) = reconciler.reconcile(job.clone()).await.unwrap();
    assert_eq!(first, ReconcileOutcome::Inserted);
    let (_, second) = reconciler.reconcile(job.clone()).await.unwrap();
    assert_eq!(second, ReconcileOutcome::Unchanged);

    let mut retagged = job;
    retagged.tags.remove("search:rust");
    retagged.tags.insert("tokio".into());
    let (_, third) = reconciler.reconcile(retagged).await.unwrap();
    assert_eq!(third, ReconcileOutcome::Updated);

    assert_eq!(store.get_tag("rust").await.unwrap().unwrap().count, 1);
    assert_eq!(store.get_tag("search:rust").await.unwrap().unwrap().count, 0);
    assert_eq!(store.get_tag("tokio").await.unwrap().unwrap().count, 1);
    assert_eq!(store.job_stats().await.unwrap().total_jobs, 1);
}

#[tokio::test]
async fn update_if_current_rejects_stale_version() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool);

    store
        .upsert(&record("naukri", "https://x/1", "Rust", &["rust"]))
        .await
        .unwrap();
    let stored = store.find_by_key("naukri", "https://x/1").await.unwrap().unwrap();

    let mut changed = stored.clone();
    changed.tags.insert("aws".into());
    changed.updated_at = stored.updated_at + TimeDelta::seconds(1);
    assert!(store.update_if_current(&changed, stored.updated_at).await.unwrap());
    assert!(!store.update_if_current(&changed, stored.updated_at).await.unwrap());

    let reread = store.find_by_key("naukri", "https://x/1").await.unwrap().unwrap();
    assert!(reread.tags.contains("aws"));
    assert_eq!(reread.updated_at, changed.updated_at);
    assert_eq!(reread.created_at, stored.created_at);
}

#[tokio::test]
async fn tag_stats_report_categories_and_growth() {
    let (pool, _container) = setup_test_db().await;
    let store = PgJobStore::new(pool.clone());

    for name in ["rust", "rust", "python", "location:pune", "source:naukri"] {
        store.increment_tag_count(name).await.unwrap();
    }
    sqlx::query("UPDATE job_tags SET created_at = NOW() - INTERVAL '10 days' WHERE name = $1")
        .bind("python")
        .execute(&pool)
        .await
        .unwrap();

    let stats = store.tag_stats(Utc::now()).await.unwrap();

    assert_eq!(stats.total_tags, 4);
    assert_eq!(stats.most_popular[0].name, "rust");
    assert_eq!(stats.tags_by_category[0], (TagCategory::Technology, 2));
    assert_eq!(stats.tags_by_category.len(), 3);
    assert_eq!(stats.recent_tags.len(), 3);
    assert!(stats.recent_tags.iter().all(|t| t.name != "python"));
    // Three new tags this week against one the week before.
    assert_eq!(stats.growth_rate, 200.0);
}
