use std::future::Future;

use time::OffsetDateTime;

use crate::core::db::project::Project;

#[derive(Debug, Clone)]
pub struct RandomizerSpin {
    pub id: i64,
    /// `None` once the project has been deleted.
    pub project_id: Option<i64>,
    pub project_title: String,
    pub candidate_count: u32,
    pub spun_at: OffsetDateTime,
    pub(super) _guard: (),
}

pub trait SpinRepository {
    fn record_spin(
        &self,
        winner: &Project,
        candidate_count: u32,
    ) -> impl Future<Output = anyhow::Result<RandomizerSpin>> + Send;
    /// Most recent first.
    fn spin_history(
        &self,
        limit: u32,
    ) -> impl Future<Output = anyhow::Result<Vec<RandomizerSpin>>> + Send;
}
