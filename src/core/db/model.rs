use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::{
    Date, OffsetDateTime, UtcOffset, format_description::FormatItem, format_description::well_known::Rfc3339,
    macros::format_description,
};

use crate::error::LibraryError;

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIMESTAMP_FORMAT: &[FormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    #[default]
    Wishlist,
    Purchased,
    Stash,
    Progress,
    Completed,
    Archived,
    Destashed,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 7] = [
        ProjectStatus::Wishlist,
        ProjectStatus::Purchased,
        ProjectStatus::Stash,
        ProjectStatus::Progress,
        ProjectStatus::Completed,
        ProjectStatus::Archived,
        ProjectStatus::Destashed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Wishlist => "wishlist",
            ProjectStatus::Purchased => "purchased",
            ProjectStatus::Stash => "stash",
            ProjectStatus::Progress => "progress",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Archived => "archived",
            ProjectStatus::Destashed => "destashed",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = LibraryError;

    /// Accepts the canonical names plus the spellings people use in
    /// spreadsheets ("In Progress", "WIP", "Done", "Wish List", ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        let status = match normalized.as_str() {
            "wishlist" | "wish" | "wanted" => ProjectStatus::Wishlist,
            "purchased" | "ordered" | "bought" => ProjectStatus::Purchased,
            "stash" | "instash" | "received" => ProjectStatus::Stash,
            "progress" | "inprogress" | "wip" | "started" | "active" => ProjectStatus::Progress,
            "completed" | "complete" | "done" | "finished" => ProjectStatus::Completed,
            "archived" | "archive" => ProjectStatus::Archived,
            "destashed" | "destash" | "sold" | "givenaway" => ProjectStatus::Destashed,
            _ => {
                return Err(LibraryError::validation(
                    "status",
                    format!("unknown status '{}'", s.trim()),
                ));
            }
        };
        Ok(status)
    }
}

impl TryFrom<i64> for ProjectStatus {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ProjectStatus::Wishlist),
            1 => Ok(ProjectStatus::Purchased),
            2 => Ok(ProjectStatus::Stash),
            3 => Ok(ProjectStatus::Progress),
            4 => Ok(ProjectStatus::Completed),
            5 => Ok(ProjectStatus::Archived),
            6 => Ok(ProjectStatus::Destashed),
            _ => Err(anyhow::anyhow!("Invalid ProjectStatus value: {}", value)),
        }
    }
}

impl From<ProjectStatus> for i64 {
    fn from(status: ProjectStatus) -> Self {
        match status {
            ProjectStatus::Wishlist => 0,
            ProjectStatus::Purchased => 1,
            ProjectStatus::Stash => 2,
            ProjectStatus::Progress => 3,
            ProjectStatus::Completed => 4,
            ProjectStatus::Archived => 5,
            ProjectStatus::Destashed => 6,
        }
    }
}

/// Number of projects per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub wishlist: u64,
    pub purchased: u64,
    pub stash: u64,
    pub progress: u64,
    pub completed: u64,
    pub archived: u64,
    pub destashed: u64,
}

impl StatusCounts {
    pub fn get(&self, status: ProjectStatus) -> u64 {
        match status {
            ProjectStatus::Wishlist => self.wishlist,
            ProjectStatus::Purchased => self.purchased,
            ProjectStatus::Stash => self.stash,
            ProjectStatus::Progress => self.progress,
            ProjectStatus::Completed => self.completed,
            ProjectStatus::Archived => self.archived,
            ProjectStatus::Destashed => self.destashed,
        }
    }

    fn slot(&mut self, status: ProjectStatus) -> &mut u64 {
        match status {
            ProjectStatus::Wishlist => &mut self.wishlist,
            ProjectStatus::Purchased => &mut self.purchased,
            ProjectStatus::Stash => &mut self.stash,
            ProjectStatus::Progress => &mut self.progress,
            ProjectStatus::Completed => &mut self.completed,
            ProjectStatus::Archived => &mut self.archived,
            ProjectStatus::Destashed => &mut self.destashed,
        }
    }

    pub fn add(&mut self, status: ProjectStatus, n: u64) {
        let slot = self.slot(status);
        *slot = slot.saturating_add(n);
    }

    pub fn increment(&mut self, status: ProjectStatus) {
        self.add(status, 1);
    }

    /// Saturates at zero.
    pub fn decrement(&mut self, status: ProjectStatus) {
        let slot = self.slot(status);
        *slot = slot.saturating_sub(1);
    }

    pub fn total(&self) -> u64 {
        ProjectStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KitCategory {
    Full,
    Mini,
}

impl KitCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            KitCategory::Full => "full",
            KitCategory::Mini => "mini",
        }
    }
}

impl FromStr for KitCategory {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" | "full size" | "standard" => Ok(KitCategory::Full),
            "mini" | "small" => Ok(KitCategory::Mini),
            other => Err(LibraryError::validation(
                "kit_category",
                format!("expected full or mini, got '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrillShape {
    Round,
    Square,
}

impl DrillShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            DrillShape::Round => "round",
            DrillShape::Square => "square",
        }
    }
}

impl FromStr for DrillShape {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "round" | "r" => Ok(DrillShape::Round),
            "square" | "s" => Ok(DrillShape::Square),
            other => Err(LibraryError::validation(
                "drill_shape",
                format!("expected round or square, got '{}'", other),
            )),
        }
    }
}

/// One page of a paginated listing. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, page: u32, page_size: u32, total_items: u64) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_items.div_ceil(u64::from(page_size)) as u32
        };
        Self {
            items,
            page,
            page_size,
            total_items,
            total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub fn today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

/// Fixed-width UTC so stored timestamps sort correctly as text.
pub(crate) fn format_timestamp(ts: &OffsetDateTime) -> anyhow::Result<String> {
    Ok(ts.to_offset(UtcOffset::UTC).format(TIMESTAMP_FORMAT)?)
}

pub(crate) fn parse_timestamp(raw: &str) -> anyhow::Result<OffsetDateTime> {
    Ok(OffsetDateTime::parse(raw, &Rfc3339)?)
}

pub fn format_date(date: Date) -> String {
    // The fixed format only fails for years outside 0..=9999.
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| date.to_string())
}

pub fn parse_date(raw: &str) -> anyhow::Result<Date> {
    Ok(Date::parse(raw.trim(), DATE_FORMAT)?)
}

pub(crate) fn parse_optional_date(raw: Option<String>) -> anyhow::Result<Option<Date>> {
    raw.as_deref().map(parse_date).transpose()
}
