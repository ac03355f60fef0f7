//! Yearly project statistics and the cache in front of them.

mod service;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::core::db::{ProjectContribution, ProjectStatus, StatusCounts};

pub use service::{
    CacheMetrics, CacheUpdate, StatsBackend, StatsKey, StatsSource, YearlyStatsResult,
    YearlyStatsService,
};

/// Aggregate over all of a user's projects, with per-year milestones for `year`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearlyStats {
    pub year: i32,
    /// Current status of every project, independent of `year`.
    pub status_counts: StatusCounts,
    pub total_projects: u64,
    pub in_progress_count: u64,
    /// Completed projects whose completion date falls in `year`.
    pub completed_count: u64,
    pub started_count: u64,
    pub purchased_count: u64,
    /// Diamonds of the projects counted in `completed_count`.
    pub total_diamonds: u64,
}

fn in_year(date: Option<Date>, year: i32) -> bool {
    date.is_some_and(|d| d.year() == year)
}

impl YearlyStats {
    pub fn empty(year: i32) -> Self {
        Self {
            year,
            ..Self::default()
        }
    }

    pub fn tally<'a, I>(year: i32, projects: I) -> Self
    where
        I: IntoIterator<Item = &'a ProjectContribution>,
    {
        let mut stats = Self::empty(year);
        for project in projects {
            stats.add(project);
        }
        stats
    }

    pub fn add(&mut self, project: &ProjectContribution) {
        self.status_counts.increment(project.status);
        self.total_projects += 1;
        if project.status == ProjectStatus::Progress {
            self.in_progress_count += 1;
        }
        if project.status == ProjectStatus::Completed && in_year(project.date_completed, self.year) {
            self.completed_count += 1;
            self.total_diamonds = self
                .total_diamonds
                .saturating_add(project.total_diamonds.unwrap_or(0));
        }
        if in_year(project.date_started, self.year) {
            self.started_count += 1;
        }
        if in_year(project.date_purchased, self.year) {
            self.purchased_count += 1;
        }
    }

    /// Remove one project's contribution. Every counter saturates at zero, so
    /// subtracting from an already-stale aggregate cannot wrap.
    pub fn subtract(&mut self, project: &ProjectContribution) {
        self.status_counts.decrement(project.status);
        self.total_projects = self.total_projects.saturating_sub(1);
        if project.status == ProjectStatus::Progress {
            self.in_progress_count = self.in_progress_count.saturating_sub(1);
        }
        if project.status == ProjectStatus::Completed && in_year(project.date_completed, self.year) {
            self.completed_count = self.completed_count.saturating_sub(1);
            self.total_diamonds = self
                .total_diamonds
                .saturating_sub(project.total_diamonds.unwrap_or(0));
        }
        if in_year(project.date_started, self.year) {
            self.started_count = self.started_count.saturating_sub(1);
        }
        if in_year(project.date_purchased, self.year) {
            self.purchased_count = self.purchased_count.saturating_sub(1);
        }
    }
}
