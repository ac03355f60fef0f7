#![allow(dead_code, unused_imports)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from dpstash for tests
pub use dpstash::LibraryError;
pub use dpstash::core::db::{
    Artist, ArtistRepository, Company, CompanyRepository, CompanyUpdate,
    DashboardSettingsRepository, DrillShape, KitCategory, LibraryDb, NewCompany,
    NewProgressNote, NewProject, NewTag, Page, ProgressNote, ProgressNoteRepository,
    ProgressNoteUpdate, Project, ProjectQuery, ProjectRepository, ProjectStatus, ProjectUpdate,
    SortDirection, SortField, SpinRepository, Tag, TagRepository, TagUpdate, UserDb,
    UserRepository, YearlyStatsRepository, today,
};

/// The domain error inside `err`, if any.
pub fn library_error(err: &anyhow::Error) -> Option<&LibraryError> {
    err.downcast_ref::<LibraryError>()
}
