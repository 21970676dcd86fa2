use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};

use crate::error::AppError;
use crate::models::{JobRecord, ReconcileOutcome, UpsertOutcome};
use crate::traits::JobStore;

/// Reconciles freshly scraped records against the store.
///
/// Records are keyed by `(source, job_url)`. Only the volatile fields
/// (salary, salary bounds, currency, tags, posted date) are ever updated on
/// an existing record.
#[derive(Debug, Clone)]
pub struct DedupReconciler<S: JobStore> {
    store: S,
}

fn volatile_differs(stored: &JobRecord, fresh: &JobRecord) -> bool {
    stored.salary != fresh.salary
        || stored.salary_min != fresh.salary_min
        || stored.salary_max != fresh.salary_max
        || stored.currency != fresh.currency
        || stored.tags != fresh.tags
        || posted_day(stored) != posted_day(fresh)
}

/// Relative dates ("3 days ago") resolve against the scrape time, so
/// posting dates are compared by calendar day.
fn posted_day(record: &JobRecord) -> Option<NaiveDate> {
    record.posted_date.map(|d| d.date_naive())
}

/// Conditional update attempts before giving up on a contended record.
const MAX_UPDATE_ATTEMPTS: u32 = 5;

/// A timestamp at least one microsecond after `previous`, the finest
/// resolution the store keeps.
fn advance(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous + TimeDelta::microseconds(1))
}

impl<S: JobStore> DedupReconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Insert, update or skip `record`, keeping tag counts in step.
    ///
    /// Updates only land if the stored record is still the one the tag
    /// changes were computed from; otherwise the record is re-read and
    /// reconciled again. Returns the stored view of the record with the
    /// outcome.
    pub async fn reconcile(
        &self,
        record: JobRecord,
    ) -> Result<(JobRecord, ReconcileOutcome), AppError> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let existing = self
                .store
                .find_by_key(&record.source, &record.job_url)
                .await?;

            let Some(stored) = existing else {
                return self.insert(record).await;
            };

            if !volatile_differs(&stored, &record) {
                tracing::trace!(
                    source = %stored.source,
                    job_url = %stored.job_url,
                    "Record unchanged"
                );
                return Ok((stored, ReconcileOutcome::Unchanged));
            }

            let added: BTreeSet<String> = record.tags.difference(&stored.tags).cloned().collect();
            let removed: BTreeSet<String> =
                stored.tags.difference(&record.tags).cloned().collect();

            let mut updated = stored.clone();
            updated.salary.clone_from(&record.salary);
            updated.salary_min = record.salary_min;
            updated.salary_max = record.salary_max;
            updated.currency.clone_from(&record.currency);
            updated.tags.clone_from(&record.tags);
            updated.posted_date = record.posted_date;
            updated.updated_at = advance(stored.updated_at);

            if !self
                .store
                .update_if_current(&updated, stored.updated_at)
                .await?
            {
                tracing::debug!(
                    source = %stored.source,
                    job_url = %stored.job_url,
                    attempt,
                    "Record changed concurrently, re-reading"
                );
                continue;
            }

            for tag in &added {
                self.store.increment_tag_count(tag).await?;
            }
            for tag in &removed {
                self.store.decrement_tag_count(tag).await?;
            }

            tracing::debug!(
                source = %updated.source,
                job_url = %updated.job_url,
                tags_added = added.len(),
                tags_removed = removed.len(),
                "Reconciled changed record"
            );
            return Ok((updated, ReconcileOutcome::Updated));
        }

        Err(AppError::PersistenceError(format!(
            "record {} kept changing during {MAX_UPDATE_ATTEMPTS} update attempts",
            record.job_url
        )))
    }

    async fn insert(&self, mut record: JobRecord) -> Result<(JobRecord, ReconcileOutcome), AppError> {
        let now = Utc::now();
        record.created_at = now;
        record.updated_at = now;

        let outcome = self.store.upsert(&record).await?;
        if outcome == UpsertOutcome::Inserted {
            for tag in &record.tags {
                self.store.increment_tag_count(tag).await?;
            }
        } else {
            // Another invocation inserted the same key in between.
            tracing::debug!(
                source = %record.source,
                job_url = %record.job_url,
                "Concurrent insert detected, tag counts left untouched"
            );
        }
        tracing::debug!(
            source = %record.source,
            job_url = %record.job_url,
            ?outcome,
            "Reconciled new record"
        );
        Ok((record, outcome.into()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Barrier;

    use super::*;
    use crate::models::{JobFilters, JobStats, TagCategory, TagRecord, TagStats};
    use crate::testutil::{MemoryStore, make_record};

    /// Holds the first `gated` lookups at a barrier so that concurrent
    /// reconcilers all read the same stored record.
    #[derive(Clone)]
    struct GatedStore {
        inner: MemoryStore,
        barrier: Arc<Barrier>,
        lookups: Arc<AtomicUsize>,
        gated: usize,
    }

    impl GatedStore {
        fn new(inner: MemoryStore, gated: usize) -> Self {
            Self {
                inner,
                barrier: Arc::new(Barrier::new(gated)),
                lookups: Arc::new(AtomicUsize::new(0)),
                gated,
            }
        }
    }

    impl JobStore for GatedStore {
        async fn find_by_key(
            &self,
            source: &str,
            job_url: &str,
        ) -> Result<Option<JobRecord>, AppError> {
            let found = self.inner.find_by_key(source, job_url).await?;
            if self.lookups.fetch_add(1, Ordering::SeqCst) < self.gated {
                self.barrier.wait().await;
            }
            Ok(found)
        }

        async fn upsert(&self, record: &JobRecord) -> Result<UpsertOutcome, AppError> {
            self.inner.upsert(record).await
        }

        async fn update_if_current(
            &self,
            record: &JobRecord,
            expected: DateTime<Utc>,
        ) -> Result<bool, AppError> {
            self.inner.update_if_current(record, expected).await
        }

        async fn increment_tag_count(&self, name: &str) -> Result<(), AppError> {
            self.inner.increment_tag_count(name).await
        }

        async fn decrement_tag_count(&self, name: &str) -> Result<(), AppError> {
            self.inner.decrement_tag_count(name).await
        }

        async fn query(
            &self,
            filters: &JobFilters,
            limit: usize,
            offset: usize,
        ) -> Result<Vec<JobRecord>, AppError> {
            self.inner.query(filters, limit, offset).await
        }

        async fn count(&self, filters: &JobFilters) -> Result<u64, AppError> {
            self.inner.count(filters).await
        }

        async fn get_tag(&self, name: &str) -> Result<Option<TagRecord>, AppError> {
            self.inner.get_tag(name).await
        }

        async fn popular_tags(
            &self,
            limit: usize,
            category: Option<TagCategory>,
        ) -> Result<Vec<TagRecord>, AppError> {
            self.inner.popular_tags(limit, category).await
        }

        async fn job_stats(&self) -> Result<JobStats, AppError> {
            self.inner.job_stats().await
        }

        async fn tag_stats(&self, now: DateTime<Utc>) -> Result<TagStats, AppError> {
            self.inner.tag_stats(now).await
        }
    }

    #[tokio::test]
    async fn reconcile_is_idempotent() {
        let store = MemoryStore::new();
        let reconciler = DedupReconciler::new(store.clone());
        let record = make_record("linkedin", "https://x/1", &["rust", "remote"]);

        let (_, first) = reconciler.reconcile(record.clone()).await.unwrap();
        assert_eq!(first, ReconcileOutcome::Inserted);
        for _ in 0..3 {
            let (_, outcome) = reconciler.reconcile(record.clone()).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::Unchanged);
        }
        assert_eq!(store.upsert_calls(), 1);
        assert_eq!(store.tag_count("rust"), Some(1));
    }

    #[tokio::test]
    async fn posting_date_compares_by_day() {
        use chrono::TimeZone;

        let store = MemoryStore::new();
        let reconciler = DedupReconciler::new(store.clone());
        let mut record = make_record("naukri", "https://x/1", &[]);
        record.posted_date = Some(Utc.with_ymd_and_hms(2024, 5, 20, 9, 0, 0).unwrap());
        reconciler.reconcile(record.clone()).await.unwrap();

        record.posted_date = Some(Utc.with_ymd_and_hms(2024, 5, 20, 17, 30, 0).unwrap());
        let (_, outcome) = reconciler.reconcile(record.clone()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unchanged);

        record.posted_date = Some(Utc.with_ymd_and_hms(2024, 5, 21, 9, 0, 0).unwrap());
        let (_, outcome) = reconciler.reconcile(record).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated);
    }

    #[tokio::test]
    async fn salary_change_updates_and_preserves_created_at() {
        let store = MemoryStore::new();
        let reconciler = DedupReconciler::new(store.clone());
        let record = make_record("linkedin", "https://x/1", &[]);

        let (inserted, outcome) = reconciler.reconcile(record.clone()).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Inserted);
        let t0 = inserted.created_at;

        let mut changed = record.clone();
        changed.salary = Some("10-12 LPA".into());
        changed.salary_min = Some(1_000_000);
        changed.salary_max = Some(1_200_000);
        changed.title = "Renamed title is not volatile".into();

        let (updated, outcome) = reconciler.reconcile(changed).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated);
        assert_eq!(updated.created_at, t0);
        assert!(updated.updated_at > inserted.updated_at);
        assert_eq!(updated.salary_min, Some(1_000_000));
        assert_eq!(updated.title, inserted.title);

        let stored = store.get("linkedin", "https://x/1").unwrap();
        assert_eq!(stored.created_at, t0);
        assert_eq!(stored.salary.as_deref(), Some("10-12 LPA"));
    }

    #[tokio::test]
    async fn tag_counts_follow_attachment() {
        let store = MemoryStore::new();
        let reconciler = DedupReconciler::new(store.clone());

        let a = make_record("naukri", "https://x/a", &["rust", "aws"]);
        let b = make_record("naukri", "https://x/b", &["rust"]);
        reconciler.reconcile(a.clone()).await.unwrap();
        reconciler.reconcile(b).await.unwrap();
        reconciler.reconcile(a.clone()).await.unwrap();
        assert_eq!(store.tag_count("rust"), Some(2));
        assert_eq!(store.tag_count("aws"), Some(1));

        let mut a_without_aws = a.clone();
        a_without_aws.tags.remove("aws");
        a_without_aws.tags.insert("python".into());
        let (_, outcome) = reconciler.reconcile(a_without_aws).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated);
        assert_eq!(store.tag_count("aws"), Some(0));
        assert_eq!(store.tag_count("python"), Some(1));
        assert_eq!(store.tag_count("rust"), Some(2));
    }

    #[tokio::test]
    async fn tag_count_never_negative() {
        let store = MemoryStore::new();
        store.decrement_tag_count("ghost").await.unwrap();
        assert!(store.tag_count("ghost").unwrap_or(0) >= 0);

        let reconciler = DedupReconciler::new(store.clone());
        let record = make_record("naukri", "https://x/a", &["ghost"]);
        reconciler.reconcile(record.clone()).await.unwrap();
        let mut untagged = record;
        untagged.tags.clear();
        reconciler.reconcile(untagged.clone()).await.unwrap();
        store.decrement_tag_count("ghost").await.unwrap();
        assert_eq!(store.tag_count("ghost"), Some(0));
    }

    #[tokio::test]
    async fn persistence_failure_propagates() {
        let store = MemoryStore::new().failing_upserts();
        let reconciler = DedupReconciler::new(store.clone());
        let err = reconciler
            .reconcile(make_record("linkedin", "https://x/1", &["rust"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PersistenceError(_)));
        assert_eq!(store.tag_count("rust"), None);
    }

    #[tokio::test]
    async fn concurrent_updates_apply_tag_changes_once() {
        let memory = MemoryStore::new();
        let seed = DedupReconciler::new(memory.clone());
        let original = make_record("naukri", "https://x/1", &["rust"]);
        seed.reconcile(original.clone()).await.unwrap();

        let reconciler = DedupReconciler::new(GatedStore::new(memory.clone(), 2));
        let mut with_aws = original;
        with_aws.tags.insert("aws".into());

        let (a, b) = tokio::join!(
            reconciler.reconcile(with_aws.clone()),
            reconciler.reconcile(with_aws.clone()),
        );
        let mut outcomes = vec![a.unwrap().1, b.unwrap().1];
        outcomes.sort_by_key(|o| *o == ReconcileOutcome::Unchanged);

        assert_eq!(
            outcomes,
            vec![ReconcileOutcome::Updated, ReconcileOutcome::Unchanged]
        );
        assert_eq!(memory.tag_count("aws"), Some(1));
        assert_eq!(memory.tag_count("rust"), Some(1));
        assert!(memory.get("naukri", "https://x/1").unwrap().tags.contains("aws"));
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let store = MemoryStore::new();
        let reconciler = DedupReconciler::new(store.clone());
        let (stored, _) = reconciler
            .reconcile(make_record("linkedin", "https://x/1", &[]))
            .await
            .unwrap();

        let mut changed = stored.clone();
        changed.salary = Some("20 LPA".into());
        changed.updated_at = advance(stored.updated_at);
        assert!(store.update_if_current(&changed, stored.updated_at).await.unwrap());
        assert!(!store.update_if_current(&changed, stored.updated_at).await.unwrap());
    }

    #[tokio::test]
    async fn tag_stats_follow_reconciled_records() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let long_ago = now - TimeDelta::days(10);
        store.seed_tag(TagRecord {
            name: "perl".into(),
            count: 4,
            category: TagCategory::Technology,
            created_at: long_ago,
            updated_at: long_ago,
        });

        let reconciler = DedupReconciler::new(store.clone());
        reconciler
            .reconcile(make_record("naukri", "https://x/a", &["rust", "location:pune"]))
            .await
            .unwrap();
        reconciler
            .reconcile(make_record("naukri", "https://x/b", &["rust"]))
            .await
            .unwrap();

        let stats = store.tag_stats(now + TimeDelta::seconds(1)).await.unwrap();
        assert_eq!(stats.total_tags, 3);
        assert_eq!(
            stats.most_popular.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            vec!["perl", "rust", "location:pune"]
        );
        assert_eq!(
            stats.tags_by_category,
            vec![(TagCategory::Technology, 2), (TagCategory::Location, 1)]
        );
        assert_eq!(stats.recent_tags.len(), 2);
        assert!(stats.recent_tags.iter().all(|t| t.name != "perl"));
        assert_eq!(stats.growth_rate, 100.0);
    }

    #[test]
    fn advance_is_strictly_later() {
        let future = Utc::now() + TimeDelta::hours(1);
        assert_eq!(advance(future), future + TimeDelta::microseconds(1));
        let past = Utc::now() - TimeDelta::hours(1);
        assert!(advance(past) > past + TimeDelta::minutes(59));
    }
}
