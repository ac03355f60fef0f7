use std::{future::Future, path::PathBuf};

use image::DynamicImage;
use time::Date;

use crate::core::db::project::Project;

#[derive(Debug, Clone)]
pub struct ProgressNote {
    pub id: i64,
    pub project_id: i64,
    pub date: Date,
    pub content: String,
    pub image_fname: Option<String>,
    pub(super) _guard: (),
}

#[derive(Debug, Clone)]
pub struct NewProgressNote {
    pub date: Date,
    pub content: String,
    /// Image copied into the library on insert.
    pub image_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct ProgressNoteUpdate {
    pub date: Option<Date>,
    pub content: Option<String>,
}

pub trait ProgressNoteRepository {
    /// Newest first.
    fn get_notes(
        &self,
        project: &Project,
    ) -> impl Future<Output = anyhow::Result<Vec<ProgressNote>>> + Send;
    fn add_note(
        &self,
        project: &Project,
        note: &NewProgressNote,
    ) -> impl Future<Output = anyhow::Result<ProgressNote>> + Send;
    fn update_note(
        &self,
        note: &ProgressNote,
        update: &ProgressNoteUpdate,
    ) -> impl Future<Output = anyhow::Result<ProgressNote>> + Send;
    fn delete_note(&self, note: ProgressNote) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn load_note_image(
        &self,
        note: &ProgressNote,
    ) -> impl Future<Output = anyhow::Result<Option<DynamicImage>>> + Send;
    /// Image scaled to fit in `max_px` × `max_px`, aspect ratio preserved.
    fn note_thumbnail(
        &self,
        note: &ProgressNote,
        max_px: u32,
    ) -> impl Future<Output = anyhow::Result<Option<DynamicImage>>> + Send;
}
