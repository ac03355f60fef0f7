use std::future::Future;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::core::db::model::{DrillShape, KitCategory, Page, ProjectStatus, StatusCounts};

#[derive(Debug, Clone)]
pub struct Project {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub status: ProjectStatus,
    pub company_id: Option<i64>,
    pub company_name: Option<String>,
    pub artist_id: Option<i64>,
    pub artist_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub total_diamonds: Option<u64>,
    pub kit_category: Option<KitCategory>,
    pub drill_shape: Option<DrillShape>,
    pub source_url: Option<String>,
    pub general_notes: String,
    pub date_purchased: Option<Date>,
    pub date_received: Option<Date>,
    pub date_started: Option<Date>,
    pub date_completed: Option<Date>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub(super) _guard: (),
}

impl Project {
    pub fn contribution(&self) -> ProjectContribution {
        ProjectContribution {
            status: self.status,
            total_diamonds: self.total_diamonds,
            date_purchased: self.date_purchased,
            date_started: self.date_started,
            date_completed: self.date_completed,
        }
    }
}

/// The slice of a project that yearly statistics are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectContribution {
    pub status: ProjectStatus,
    pub total_diamonds: Option<u64>,
    pub date_purchased: Option<Date>,
    pub date_started: Option<Date>,
    pub date_completed: Option<Date>,
}

#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub title: String,
    pub status: ProjectStatus,
    pub company_id: Option<i64>,
    pub artist_id: Option<i64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub total_diamonds: Option<u64>,
    pub kit_category: Option<KitCategory>,
    pub drill_shape: Option<DrillShape>,
    pub source_url: Option<String>,
    pub general_notes: String,
    pub date_purchased: Option<Date>,
    pub date_received: Option<Date>,
    pub date_started: Option<Date>,
    pub date_completed: Option<Date>,
    pub tag_ids: Vec<i64>,
}

/// Field-wise update; `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub title: Option<String>,
    pub status: Option<ProjectStatus>,
    pub company_id: Option<Option<i64>>,
    pub artist_id: Option<Option<i64>>,
    pub width: Option<Option<u32>>,
    pub height: Option<Option<u32>>,
    pub total_diamonds: Option<Option<u64>>,
    pub kit_category: Option<Option<KitCategory>>,
    pub drill_shape: Option<Option<DrillShape>>,
    pub source_url: Option<Option<String>>,
    pub general_notes: Option<String>,
    pub date_purchased: Option<Option<Date>>,
    pub date_received: Option<Option<Date>>,
    pub date_started: Option<Option<Date>>,
    pub date_completed: Option<Option<Date>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Title,
    Status,
    Company,
    Artist,
    TotalDiamonds,
    DatePurchased,
    DateStarted,
    DateCompleted,
    CreatedAt,
    #[default]
    UpdatedAt,
}

impl SortField {
    pub(super) fn column(&self) -> &'static str {
        match self {
            SortField::Title => "p.title COLLATE NOCASE",
            SortField::Status => "p.status",
            SortField::Company => "c.name COLLATE NOCASE",
            SortField::Artist => "a.name COLLATE NOCASE",
            SortField::TotalDiamonds => "p.total_diamonds",
            SortField::DatePurchased => "p.date_purchased",
            SortField::DateStarted => "p.date_started",
            SortField::DateCompleted => "p.date_completed",
            SortField::CreatedAt => "p.created_at",
            SortField::UpdatedAt => "p.updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub(super) fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Server-side listing filter. Empty fields do not constrain the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectQuery {
    pub status: Option<ProjectStatus>,
    pub company_id: Option<i64>,
    pub artist_id: Option<i64>,
    /// Projects carrying any of these tags.
    pub tag_ids: Vec<i64>,
    /// Case-insensitive substring of the title.
    pub search: Option<String>,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
    pub page: u32,
    pub page_size: u32,
}

impl Default for ProjectQuery {
    fn default() -> Self {
        Self {
            status: None,
            company_id: None,
            artist_id: None,
            tag_ids: Vec::new(),
            search: None,
            sort_field: SortField::default(),
            sort_direction: SortDirection::default(),
            page: 1,
            page_size: 25,
        }
    }
}

pub trait ProjectRepository {
    fn get_projects(&self) -> impl Future<Output = anyhow::Result<Vec<Project>>> + Send;
    fn get_project_by_id(
        &self,
        id: i64,
    ) -> impl Future<Output = anyhow::Result<Option<Project>>> + Send;
    fn add_project(
        &self,
        project: &NewProject,
    ) -> impl Future<Output = anyhow::Result<Project>> + Send;
    fn update_project(
        &self,
        project: &Project,
        update: &ProjectUpdate,
    ) -> impl Future<Output = anyhow::Result<Project>> + Send;
    /// Status change that also fills the matching milestone date when empty.
    fn update_status(
        &self,
        project: &Project,
        status: ProjectStatus,
    ) -> impl Future<Output = anyhow::Result<Project>> + Send;
    /// Deletes the project with its progress notes, note images and tag links.
    fn delete_project(&self, project: Project) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn list_projects(
        &self,
        query: &ProjectQuery,
    ) -> impl Future<Output = anyhow::Result<Page<Project>>> + Send;
    fn status_counts(&self) -> impl Future<Output = anyhow::Result<StatusCounts>> + Send;
    fn contributions_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> impl Future<Output = anyhow::Result<Page<ProjectContribution>>> + Send;
}
