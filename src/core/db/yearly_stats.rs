use std::future::Future;

use time::OffsetDateTime;

use crate::stats::YearlyStats;

/// A persisted aggregate and the moment it was computed.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedYearlyStats {
    pub stats: YearlyStats,
    pub last_calculated: OffsetDateTime,
}

pub trait YearlyStatsRepository {
    fn load_yearly_stats(
        &self,
        year: i32,
    ) -> impl Future<Output = anyhow::Result<Option<CachedYearlyStats>>> + Send;
    /// Upsert, stamping `last_calculated` with the current time.
    fn store_yearly_stats(
        &self,
        stats: &YearlyStats,
    ) -> impl Future<Output = anyhow::Result<CachedYearlyStats>> + Send;
    fn delete_yearly_stats(&self, year: i32) -> impl Future<Output = anyhow::Result<()>> + Send;
    /// Years with a cached row, ascending.
    fn cached_stats_years(&self) -> impl Future<Output = anyhow::Result<Vec<i32>>> + Send;
    fn clear_yearly_stats(&self) -> impl Future<Output = anyhow::Result<()>> + Send;
}
