use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    config::StatsCacheConfig,
    core::db::{
        CachedYearlyStats, LibraryDb, Page, ProjectContribution, ProjectRepository,
        YearlyStatsRepository, now_utc,
    },
    retry::{RetryPolicy, with_retry},
    stats::YearlyStats,
};

/// What the stats cache needs from the record store.
pub trait StatsBackend: Send + Sync + 'static {
    fn load_cached(
        &self,
        user_id: Uuid,
        year: i32,
    ) -> impl Future<Output = anyhow::Result<Option<CachedYearlyStats>>> + Send;
    fn store_cached(
        &self,
        user_id: Uuid,
        stats: &YearlyStats,
    ) -> impl Future<Output = anyhow::Result<CachedYearlyStats>> + Send;
    fn delete_cached(
        &self,
        user_id: Uuid,
        year: i32,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn cached_years(&self, user_id: Uuid) -> impl Future<Output = anyhow::Result<Vec<i32>>> + Send;
    fn delete_all_cached(&self, user_id: Uuid) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn project_page(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> impl Future<Output = anyhow::Result<Page<ProjectContribution>>> + Send;
}

impl StatsBackend for LibraryDb {
    async fn load_cached(
        &self,
        user_id: Uuid,
        year: i32,
    ) -> anyhow::Result<Option<CachedYearlyStats>> {
        self.bind_user(user_id).load_yearly_stats(year).await
    }

    async fn store_cached(
        &self,
        user_id: Uuid,
        stats: &YearlyStats,
    ) -> anyhow::Result<CachedYearlyStats> {
        self.bind_user(user_id).store_yearly_stats(stats).await
    }

    async fn delete_cached(&self, user_id: Uuid, year: i32) -> anyhow::Result<()> {
        self.bind_user(user_id).delete_yearly_stats(year).await
    }

    async fn cached_years(&self, user_id: Uuid) -> anyhow::Result<Vec<i32>> {
        self.bind_user(user_id).cached_stats_years().await
    }

    async fn delete_all_cached(&self, user_id: Uuid) -> anyhow::Result<()> {
        self.bind_user(user_id).clear_yearly_stats().await
    }

    async fn project_page(
        &self,
        user_id: Uuid,
        page: u32,
        page_size: u32,
    ) -> anyhow::Result<Page<ProjectContribution>> {
        self.bind_user(user_id)
            .contributions_page(page, page_size)
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatsKey {
    pub user_id: Uuid,
    pub year: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsSource {
    /// Served from a fresh cache entry.
    Cache,
    /// Recomputed for this request.
    Realtime,
    /// Recomputation failed; stale cache or zeros.
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct YearlyStatsResult {
    pub stats: YearlyStats,
    pub source: StatsSource,
    /// `None` only for the all-zero fallback.
    pub last_calculated: Option<OffsetDateTime>,
}

/// Outcome of an incremental cache adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheUpdate {
    Adjusted,
    Recomputed,
    Invalidated,
    /// Nothing was cached and the recomputation failed.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub errors: u64,
    pub deduplicated: u64,
    pub background_refreshes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    errors: AtomicU64,
    deduplicated: AtomicU64,
    background_refreshes: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

type SharedResult = Shared<BoxFuture<'static, YearlyStatsResult>>;

struct Inner<B> {
    backend: B,
    config: StatsCacheConfig,
    retry: RetryPolicy,
    pending: Mutex<HashMap<StatsKey, SharedResult>>,
    refreshes: Mutex<HashMap<StatsKey, JoinHandle<()>>>,
    counters: Counters,
}

impl<B> Drop for Inner<B> {
    fn drop(&mut self) {
        for (_, handle) in self.refreshes.get_mut().drain() {
            handle.abort();
        }
    }
}

/// Serves yearly aggregates from the cache table, recomputing on miss and
/// refreshing in the background once an entry ages past the refresh threshold.
///
/// Concurrent requests for the same `(user, year)` share a single
/// computation. Scheduled refreshes are tied to the service: dropping the last
/// clone (or calling [`shutdown`](Self::shutdown)) cancels them.
pub struct YearlyStatsService<B: StatsBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: StatsBackend> Clone for YearlyStatsService<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: StatsBackend> YearlyStatsService<B> {
    pub fn new(backend: B, config: StatsCacheConfig, retry: RetryPolicy) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                backend,
                config,
                retry,
                pending: Mutex::new(HashMap::new()),
                refreshes: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
        })
    }

    pub fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// Never fails: backend errors degrade to [`StatsSource::Fallback`].
    pub async fn get_yearly_stats(&self, user_id: Uuid, year: i32) -> YearlyStatsResult {
        let key = StatsKey { user_id, year };
        bump(&self.inner.counters.total_requests);

        let shared = {
            let mut pending = self.inner.pending.lock();
            if let Some(in_flight) = pending.get(&key) {
                bump(&self.inner.counters.deduplicated);
                tracing::trace!(%user_id, year, "joining in-flight stats request");
                in_flight.clone()
            } else {
                let inner = Arc::clone(&self.inner);
                let fut = async move {
                    let result = inner.resolve(key).await;
                    inner.pending.lock().remove(&key);
                    result
                }
                .boxed()
                .shared();
                pending.insert(key, fut.clone());
                fut
            }
        };
        shared.await
    }

    /// Drop the cached aggregate so the next read recomputes it.
    pub async fn invalidate(&self, user_id: Uuid, year: i32) -> bool {
        self.inner.invalidate(StatsKey { user_id, year }).await
    }

    /// Drop every cached aggregate of the user. Status counts span all years,
    /// so any change to a project's status or milestones reaches every row.
    pub async fn invalidate_user(&self, user_id: Uuid) -> bool {
        match self.inner.backend.delete_all_cached(user_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "failed to invalidate cached stats");
                false
            }
        }
    }

    /// Apply a deletion to every cached year of the user, and to
    /// `current_year` even when it is not cached yet.
    pub async fn apply_project_deletion_to_user(
        &self,
        user_id: Uuid,
        current_year: i32,
        project: &ProjectContribution,
    ) -> Vec<(i32, CacheUpdate)> {
        let mut years = match self.inner.backend.cached_years(user_id).await {
            Ok(years) => years,
            Err(e) => {
                tracing::warn!(%user_id, error = %e, "could not list cached stats, invalidating");
                self.invalidate_user(user_id).await;
                Vec::new()
            }
        };
        if !years.contains(&current_year) {
            years.push(current_year);
        }
        let mut updates = Vec::with_capacity(years.len());
        for year in years {
            updates.push((year, self.apply_project_deletion(user_id, year, project).await));
        }
        updates
    }

    /// Adjust the cached aggregate for a project that has just been deleted.
    /// Call after the deletion so a fallback recomputation no longer sees it.
    pub async fn apply_project_deletion(
        &self,
        user_id: Uuid,
        year: i32,
        project: &ProjectContribution,
    ) -> CacheUpdate {
        let key = StatsKey { user_id, year };
        let inner = &self.inner;
        match inner.backend.load_cached(user_id, year).await {
            Ok(Some(cached)) => {
                let mut stats = cached.stats;
                stats.subtract(project);
                match inner.backend.store_cached(user_id, &stats).await {
                    Ok(_) => CacheUpdate::Adjusted,
                    Err(e) => {
                        tracing::warn!(%user_id, year, error = %e, "incremental stats update failed, invalidating");
                        inner.invalidate(key).await;
                        CacheUpdate::Invalidated
                    }
                }
            }
            Ok(None) => inner.recompute_after_deletion(key).await,
            Err(e) => {
                tracing::warn!(%user_id, year, error = %e, "could not read cached stats");
                inner.recompute_after_deletion(key).await
            }
        }
    }

    /// Cancel a scheduled background refresh. Returns whether one was pending.
    pub fn cancel_background_refresh(&self, user_id: Uuid, year: i32) -> bool {
        match self.inner.refreshes.lock().remove(&StatsKey { user_id, year }) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending_refreshes(&self) -> usize {
        self.inner.refreshes.lock().len()
    }

    /// Cancel every scheduled background refresh.
    pub fn shutdown(&self) {
        let handles: Vec<_> = self.inner.refreshes.lock().drain().map(|(_, h)| h).collect();
        if !handles.is_empty() {
            tracing::debug!(count = handles.len(), "cancelling background stats refreshes");
        }
        for handle in handles {
            handle.abort();
        }
    }

    pub fn metrics(&self) -> CacheMetrics {
        let c = &self.inner.counters;
        CacheMetrics {
            total_requests: c.total_requests.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            cache_misses: c.cache_misses.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
            deduplicated: c.deduplicated.load(Ordering::Relaxed),
            background_refreshes: c.background_refreshes.load(Ordering::Relaxed),
        }
    }
}

fn age_of(last_calculated: OffsetDateTime) -> Duration {
    // Timestamps from the future count as brand new.
    Duration::try_from(now_utc() - last_calculated).unwrap_or(Duration::ZERO)
}

impl<B: StatsBackend> Inner<B> {
    async fn resolve(self: &Arc<Self>, key: StatsKey) -> YearlyStatsResult {
        let cached = match self.backend.load_cached(key.user_id, key.year).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(user_id = %key.user_id, year = key.year, error = %e, "cached stats unavailable");
                None
            }
        };

        if let Some(cached) = &cached {
            let age = age_of(cached.last_calculated);
            if age < self.config.expiration() {
                bump(&self.counters.cache_hits);
                if age > self.config.refresh_threshold() {
                    self.schedule_background_refresh(key);
                }
                return YearlyStatsResult {
                    stats: cached.stats.clone(),
                    source: StatsSource::Cache,
                    last_calculated: Some(cached.last_calculated),
                };
            }
            tracing::debug!(user_id = %key.user_id, year = key.year, age_secs = age.as_secs(), "cached stats expired");
        }

        bump(&self.counters.cache_misses);
        match self.recompute(key).await {
            Ok(result) => result,
            Err(e) => {
                bump(&self.counters.errors);
                tracing::warn!(user_id = %key.user_id, year = key.year, error = %e, "stats recomputation failed, serving fallback");
                match cached {
                    Some(stale) => YearlyStatsResult {
                        stats: stale.stats,
                        source: StatsSource::Fallback,
                        last_calculated: Some(stale.last_calculated),
                    },
                    None => YearlyStatsResult {
                        stats: YearlyStats::empty(key.year),
                        source: StatsSource::Fallback,
                        last_calculated: None,
                    },
                }
            }
        }
    }

    async fn compute(&self, key: StatsKey) -> anyhow::Result<YearlyStats> {
        let backend = &self.backend;
        let page_size = self.config.page_size;
        let mut stats = YearlyStats::empty(key.year);
        let mut page = 1;
        loop {
            let batch = with_retry(self.retry, "stats project page", move || {
                backend.project_page(key.user_id, page, page_size)
            })
            .await?;
            for project in &batch.items {
                stats.add(project);
            }
            if batch.items.is_empty() || !batch.has_next() {
                break;
            }
            page += 1;
        }
        Ok(stats)
    }

    /// Recompute and write back. A failed write is logged; the fresh
    /// numbers are still returned.
    async fn recompute(&self, key: StatsKey) -> anyhow::Result<YearlyStatsResult> {
        let stats = self.compute(key).await?;
        let last_calculated = match self.backend.store_cached(key.user_id, &stats).await {
            Ok(stored) => stored.last_calculated,
            Err(e) => {
                tracing::warn!(user_id = %key.user_id, year = key.year, error = %e, "failed to cache stats");
                now_utc()
            }
        };
        tracing::debug!(user_id = %key.user_id, year = key.year, projects = stats.total_projects, "stats recomputed");
        Ok(YearlyStatsResult {
            stats,
            source: StatsSource::Realtime,
            last_calculated: Some(last_calculated),
        })
    }

    async fn recompute_after_deletion(&self, key: StatsKey) -> CacheUpdate {
        match self.recompute(key).await {
            Ok(_) => CacheUpdate::Recomputed,
            Err(e) => {
                bump(&self.counters.errors);
                tracing::warn!(user_id = %key.user_id, year = key.year, error = %e, "stats recomputation after deletion failed");
                CacheUpdate::Skipped
            }
        }
    }

    async fn invalidate(&self, key: StatsKey) -> bool {
        match self.backend.delete_cached(key.user_id, key.year).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(user_id = %key.user_id, year = key.year, error = %e, "failed to invalidate cached stats");
                false
            }
        }
    }

    fn refresh_delay(&self) -> Duration {
        let jitter = match self.config.refresh_jitter_ms {
            0 => 0,
            max => rand::thread_rng().gen_range(0..=max),
        };
        Duration::from_millis(self.config.refresh_delay_ms + jitter)
    }

    fn schedule_background_refresh(self: &Arc<Self>, key: StatsKey) {
        let mut refreshes = self.refreshes.lock();
        if refreshes.contains_key(&key) {
            return;
        }
        let delay = self.refresh_delay();
        let weak: Weak<Self> = Arc::downgrade(self);
        tracing::debug!(user_id = %key.user_id, year = key.year, delay_ms = delay.as_millis() as u64, "scheduling background stats refresh");

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            bump(&inner.counters.background_refreshes);
            if let Err(e) = inner.recompute(key).await {
                bump(&inner.counters.errors);
                tracing::warn!(user_id = %key.user_id, year = key.year, error = %e, "background stats refresh failed");
            }
            inner.refreshes.lock().remove(&key);
        });
        refreshes.insert(key, handle);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32};

    use time::macros::date;

    use super::*;
    use crate::core::db::ProjectStatus;

    #[derive(Default)]
    struct MockBackend {
        cached: Mutex<HashMap<(Uuid, i32), CachedYearlyStats>>,
        projects: Mutex<Vec<ProjectContribution>>,
        page_calls: Arc<AtomicU32>,
        fail_pages: AtomicBool,
        fail_writes: AtomicBool,
        page_delay: Duration,
    }

    impl MockBackend {
        fn seed_cache(&self, user_id: Uuid, stats: YearlyStats, age: Duration) {
            let last_calculated = now_utc() - age;
            self.cached.lock().insert(
                (user_id, stats.year),
                CachedYearlyStats {
                    stats,
                    last_calculated,
                },
            );
        }

        fn cached(&self, user_id: Uuid, year: i32) -> Option<CachedYearlyStats> {
            self.cached.lock().get(&(user_id, year)).cloned()
        }
    }

    impl StatsBackend for MockBackend {
        async fn load_cached(
            &self,
            user_id: Uuid,
            year: i32,
        ) -> anyhow::Result<Option<CachedYearlyStats>> {
            Ok(self.cached(user_id, year))
        }

        async fn store_cached(
            &self,
            user_id: Uuid,
            stats: &YearlyStats,
        ) -> anyhow::Result<CachedYearlyStats> {
            if self.fail_writes.load(Ordering::SeqCst) {
                anyhow::bail!("write rejected");
            }
            let entry = CachedYearlyStats {
                stats: stats.clone(),
                last_calculated: now_utc(),
            };
            self.cached.lock().insert((user_id, stats.year), entry.clone());
            Ok(entry)
        }

        async fn delete_cached(&self, user_id: Uuid, year: i32) -> anyhow::Result<()> {
            self.cached.lock().remove(&(user_id, year));
            Ok(())
        }

        async fn cached_years(&self, user_id: Uuid) -> anyhow::Result<Vec<i32>> {
            let mut years: Vec<_> = self
                .cached
                .lock()
                .keys()
                .filter(|(user, _)| *user == user_id)
                .map(|(_, year)| *year)
                .collect();
            years.sort_unstable();
            Ok(years)
        }

        async fn delete_all_cached(&self, user_id: Uuid) -> anyhow::Result<()> {
            self.cached.lock().retain(|(user, _), _| *user != user_id);
            Ok(())
        }

        async fn project_page(
            &self,
            _user_id: Uuid,
            page: u32,
            page_size: u32,
        ) -> anyhow::Result<Page<ProjectContribution>> {
            self.page_calls.fetch_add(1, Ordering::SeqCst);
            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
            if self.fail_pages.load(Ordering::SeqCst) {
                anyhow::bail!("backend unavailable");
            }
            let (items, total) = {
                let projects = self.projects.lock();
                let start = ((page - 1) * page_size) as usize;
                let items = projects
                    .iter()
                    .skip(start)
                    .take(page_size as usize)
                    .copied()
                    .collect::<Vec<_>>();
                (items, projects.len() as u64)
            };
            Ok(Page::new(items, page, page_size, total))
        }
    }

    fn config() -> StatsCacheConfig {
        StatsCacheConfig {
            expiration_secs: 3600,
            background_refresh_fraction: 0.75,
            refresh_delay_ms: 1_000,
            refresh_jitter_ms: 2_000,
            page_size: 2,
        }
    }

    fn service(backend: MockBackend) -> YearlyStatsService<MockBackend> {
        YearlyStatsService::new(backend, config(), RetryPolicy::none()).unwrap()
    }

    fn completed_2024(diamonds: u64) -> ProjectContribution {
        ProjectContribution {
            status: ProjectStatus::Completed,
            total_diamonds: Some(diamonds),
            date_completed: Some(date!(2024 - 06 - 01)),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn miss_recomputes_across_pages_and_caches() {
        let backend = MockBackend::default();
        backend.projects.lock().extend([
            completed_2024(100),
            completed_2024(200),
            completed_2024(300),
        ]);
        let service = service(backend);
        let user = Uuid::new_v4();

        let result = service.get_yearly_stats(user, 2024).await;
        assert_eq!(result.source, StatsSource::Realtime);
        assert_eq!(result.stats.completed_count, 3);
        assert_eq!(result.stats.total_diamonds, 600);
        assert_eq!(service.backend().page_calls.load(Ordering::SeqCst), 2);

        let again = service.get_yearly_stats(user, 2024).await;
        assert_eq!(again.source, StatsSource::Cache);
        assert_eq!(again.stats, result.stats);
        assert_eq!(service.backend().page_calls.load(Ordering::SeqCst), 2);

        let metrics = service.metrics();
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_share_one_computation() {
        let backend = MockBackend {
            page_delay: Duration::from_millis(100),
            ..Default::default()
        };
        backend.projects.lock().push(completed_2024(50));
        let service = service(backend);
        let user = Uuid::new_v4();

        let results =
            futures::future::join_all((0..5).map(|_| service.get_yearly_stats(user, 2024))).await;

        assert_eq!(service.backend().page_calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r == &results[0]));
        assert_eq!(results[0].source, StatsSource::Realtime);
        assert_eq!(service.metrics().deduplicated, 4);
        assert!(service.inner.pending.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn different_years_are_not_deduplicated() {
        let backend = MockBackend {
            page_delay: Duration::from_millis(100),
            ..Default::default()
        };
        let service = service(backend);
        let user = Uuid::new_v4();

        let (a, b) = tokio::join!(
            service.get_yearly_stats(user, 2023),
            service.get_yearly_stats(user, 2024)
        );
        assert_eq!(a.stats.year, 2023);
        assert_eq!(b.stats.year, 2024);
        assert_eq!(service.backend().page_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn aging_hit_schedules_one_background_refresh() {
        let backend = MockBackend::default();
        let user = Uuid::new_v4();
        backend.projects.lock().push(completed_2024(10));
        backend.seed_cache(user, YearlyStats::empty(2024), Duration::from_secs(50 * 60));
        let service = service(backend);

        let first = service.get_yearly_stats(user, 2024).await;
        let second = service.get_yearly_stats(user, 2024).await;
        assert_eq!(first.source, StatsSource::Cache);
        assert_eq!(second.source, StatsSource::Cache);
        assert_eq!(first.stats.completed_count, 0);
        assert_eq!(service.pending_refreshes(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(service.pending_refreshes(), 0);
        assert_eq!(service.metrics().background_refreshes, 1);
        assert_eq!(service.backend().page_calls.load(Ordering::SeqCst), 1);
        let refreshed = service.backend().cached(user, 2024).unwrap();
        assert_eq!(refreshed.stats.completed_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn young_hit_does_not_refresh() {
        let backend = MockBackend::default();
        let user = Uuid::new_v4();
        backend.seed_cache(user, YearlyStats::empty(2024), Duration::from_secs(60));
        let service = service(backend);

        assert_eq!(service.get_yearly_stats(user, 2024).await.source, StatsSource::Cache);
        assert_eq!(service.pending_refreshes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_service_cancels_scheduled_refreshes() {
        let user = Uuid::new_v4();
        let mock = MockBackend::default();
        mock.seed_cache(user, YearlyStats::empty(2024), Duration::from_secs(55 * 60));
        let page_calls = Arc::clone(&mock.page_calls);
        let service = service(mock);

        service.get_yearly_stats(user, 2024).await;
        assert_eq!(service.pending_refreshes(), 1);
        let weak = Arc::downgrade(&service.inner);
        drop(service);
        assert!(weak.upgrade().is_none());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(page_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_background_refresh_by_key() {
        let backend = MockBackend::default();
        let user = Uuid::new_v4();
        backend.seed_cache(user, YearlyStats::empty(2024), Duration::from_secs(50 * 60));
        let service = service(backend);

        service.get_yearly_stats(user, 2024).await;
        assert!(service.cancel_background_refresh(user, 2024));
        assert!(!service.cancel_background_refresh(user, 2024));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(service.backend().page_calls.load(Ordering::SeqCst), 0);
        assert_eq!(service.metrics().background_refreshes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_recompute_serves_stale_cache() {
        let backend = MockBackend::default();
        let user = Uuid::new_v4();
        let stale = YearlyStats {
            completed_count: 4,
            total_diamonds: 40_000,
            ..YearlyStats::empty(2024)
        };
        backend.seed_cache(user, stale.clone(), Duration::from_secs(2 * 3600));
        backend.fail_pages.store(true, Ordering::SeqCst);
        let service = service(backend);

        let result = service.get_yearly_stats(user, 2024).await;
        assert_eq!(result.source, StatsSource::Fallback);
        assert_eq!(result.stats, stale);
        assert!(result.last_calculated.is_some());
        assert_eq!(service.metrics().errors, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_recompute_without_cache_serves_zeros() {
        let backend = MockBackend::default();
        backend.fail_pages.store(true, Ordering::SeqCst);
        let service = service(backend);

        let result = service.get_yearly_stats(Uuid::new_v4(), 2024).await;
        assert_eq!(result.source, StatsSource::Fallback);
        assert_eq!(result.stats, YearlyStats::empty(2024));
        assert!(result.last_calculated.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cache_write_still_returns_fresh_numbers() {
        let backend = MockBackend::default();
        backend.projects.lock().push(completed_2024(77));
        backend.fail_writes.store(true, Ordering::SeqCst);
        let service = service(backend);
        let user = Uuid::new_v4();

        let result = service.get_yearly_stats(user, 2024).await;
        assert_eq!(result.source, StatsSource::Realtime);
        assert_eq!(result.stats.total_diamonds, 77);
        assert!(service.backend().cached(user, 2024).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn deletion_adjusts_cached_aggregate() {
        let backend = MockBackend::default();
        let user = Uuid::new_v4();
        let cached = YearlyStats::tally(2024, &[completed_2024(20_000), completed_2024(30_000)]);
        backend.seed_cache(user, cached, Duration::from_secs(10));
        let service = service(backend);

        let outcome = service
            .apply_project_deletion(user, 2024, &completed_2024(20_000))
            .await;
        assert_eq!(outcome, CacheUpdate::Adjusted);
        let after = service.backend().cached(user, 2024).unwrap().stats;
        assert_eq!(after.completed_count, 1);
        assert_eq!(after.total_diamonds, 30_000);
        assert_eq!(after.status_counts.completed, 1);
        assert_eq!(after.total_projects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deletion_without_cache_recomputes() {
        let backend = MockBackend::default();
        backend.projects.lock().push(completed_2024(5));
        let service = service(backend);
        let user = Uuid::new_v4();

        let outcome = service
            .apply_project_deletion(user, 2024, &completed_2024(99))
            .await;
        assert_eq!(outcome, CacheUpdate::Recomputed);
        let cached = service.backend().cached(user, 2024).unwrap().stats;
        assert_eq!(cached.total_diamonds, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn deletion_with_failed_write_invalidates() {
        let backend = MockBackend::default();
        let user = Uuid::new_v4();
        backend.seed_cache(user, YearlyStats::empty(2024), Duration::from_secs(10));
        backend.fail_writes.store(true, Ordering::SeqCst);
        let service = service(backend);

        let outcome = service
            .apply_project_deletion(user, 2024, &completed_2024(1))
            .await;
        assert_eq!(outcome, CacheUpdate::Invalidated);
        assert!(service.backend().cached(user, 2024).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn deletion_reaches_every_cached_year() {
        let backend = MockBackend::default();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        let deleted = completed_2024(20_000);
        let projects = [deleted, completed_2024(30_000)];
        for year in [2021, 2024] {
            backend.seed_cache(user, YearlyStats::tally(year, &projects), Duration::from_secs(10));
        }
        backend.seed_cache(other, YearlyStats::tally(2021, &projects), Duration::from_secs(10));
        backend.projects.lock().push(completed_2024(30_000));
        let service = service(backend);

        let updates = service
            .apply_project_deletion_to_user(user, 2026, &deleted)
            .await;
        assert_eq!(
            updates,
            vec![
                (2021, CacheUpdate::Adjusted),
                (2024, CacheUpdate::Adjusted),
                (2026, CacheUpdate::Recomputed),
            ]
        );
        let old = service.backend().cached(user, 2021).unwrap().stats;
        assert_eq!(old.total_projects, 1);
        assert_eq!(old.status_counts.completed, 1);
        assert_eq!(old.completed_count, 0);
        let untouched = service.backend().cached(other, 2021).unwrap().stats;
        assert_eq!(untouched.total_projects, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_user_clears_only_that_user() {
        let backend = MockBackend::default();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        backend.seed_cache(user, YearlyStats::empty(2023), Duration::from_secs(10));
        backend.seed_cache(user, YearlyStats::empty(2024), Duration::from_secs(10));
        backend.seed_cache(other, YearlyStats::empty(2024), Duration::from_secs(10));
        let service = service(backend);

        assert!(service.invalidate_user(user).await);
        assert!(service.backend().cached(user, 2023).is_none());
        assert!(service.backend().cached(user, 2024).is_none());
        assert!(service.backend().cached(other, 2024).is_some());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = StatsCacheConfig {
            background_refresh_fraction: f64::NAN,
            ..config()
        };
        assert!(YearlyStatsService::new(MockBackend::default(), config, RetryPolicy::none()).is_err());
    }
}
