//! "What should I work on next?": a uniform pick among candidate projects,
//! with every spin kept in the user's history.

use rand::{Rng, seq::SliceRandom};

use crate::{
    core::db::{Project, ProjectRepository, ProjectStatus, RandomizerSpin, SpinRepository, UserDb},
    error::LibraryError,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CandidatePool {
    /// Every project currently in progress.
    #[default]
    InProgress,
    /// An explicit selection of the user's projects.
    Projects(Vec<i64>),
}

#[derive(Debug, Clone)]
pub struct SpinOutcome {
    pub winner: Project,
    pub candidate_count: u32,
    pub spin: RandomizerSpin,
}

pub fn pick_project<'a, T, R>(candidates: &'a [T], rng: &mut R) -> Option<&'a T>
where
    R: Rng + ?Sized,
{
    candidates.choose(rng)
}

pub async fn candidates(db: &UserDb, pool: &CandidatePool) -> anyhow::Result<Vec<Project>> {
    match pool {
        CandidatePool::InProgress => Ok(db
            .get_projects()
            .await?
            .into_iter()
            .filter(|p| p.status == ProjectStatus::Progress)
            .collect()),
        CandidatePool::Projects(ids) => {
            let mut projects: Vec<Project> = Vec::with_capacity(ids.len());
            for &id in ids {
                if projects.iter().any(|p| p.id == id) {
                    continue;
                }
                let project = db
                    .get_project_by_id(id)
                    .await?
                    .ok_or_else(|| LibraryError::not_found("project", id))?;
                projects.push(project);
            }
            Ok(projects)
        }
    }
}

/// Pick one project from `pool` and record the spin. `None` when the pool is
/// empty; nothing is recorded then.
pub async fn spin(db: &UserDb, pool: &CandidatePool) -> anyhow::Result<Option<SpinOutcome>> {
    let candidates = candidates(db, pool).await?;
    let winner = pick_project(&candidates, &mut rand::thread_rng()).cloned();
    let Some(winner) = winner else {
        tracing::debug!(user_id = %db.user_id(), "randomizer has no candidates");
        return Ok(None);
    };
    let candidate_count = u32::try_from(candidates.len())?;
    let spin = db.record_spin(&winner, candidate_count).await?;
    tracing::debug!(
        user_id = %db.user_id(),
        project_id = winner.id,
        candidate_count,
        "randomizer spin"
    );
    Ok(Some(SpinOutcome {
        winner,
        candidate_count,
        spin,
    }))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn empty_pool_picks_nothing() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(pick_project::<i64, _>(&[], &mut rng), None);
    }

    #[test]
    fn single_candidate_always_wins() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            assert_eq!(pick_project(&[42], &mut rng), Some(&42));
        }
    }

    #[test]
    fn every_candidate_can_win() {
        let mut rng = StdRng::seed_from_u64(1234);
        let pool = [1, 2, 3, 4, 5];
        let winners: HashSet<_> = (0..500)
            .filter_map(|_| pick_project(&pool, &mut rng).copied())
            .collect();
        assert_eq!(winners.len(), pool.len());
    }
}
