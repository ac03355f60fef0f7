use std::future::Future;

use crate::core::db::project::Project;

#[derive(Debug, Clone)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub color: String,
    pub project_count: u64,
    pub(super) _guard: (),
}

#[derive(Debug, Clone, Default)]
pub struct NewTag {
    pub name: String,
    /// `#rrggbb`; a palette colour is picked when absent.
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TagUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
}

pub trait TagRepository {
    fn get_tags(&self) -> impl Future<Output = anyhow::Result<Vec<Tag>>> + Send;
    fn get_tag_by_id(&self, id: i64) -> impl Future<Output = anyhow::Result<Option<Tag>>> + Send;
    fn get_tag_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = anyhow::Result<Option<Tag>>> + Send;
    fn add_tag(&self, tag: &NewTag) -> impl Future<Output = anyhow::Result<Tag>> + Send;
    fn update_tag(
        &self,
        tag: &Tag,
        update: &TagUpdate,
    ) -> impl Future<Output = anyhow::Result<Tag>> + Send;
    fn delete_tag(&self, tag: Tag) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn tag_project(
        &self,
        project: &Project,
        tag: &Tag,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn untag_project(
        &self,
        project: &Project,
        tag: &Tag,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
    /// Replace the project's tag set.
    fn set_project_tags(
        &self,
        project: &Project,
        tag_ids: &[i64],
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
    fn get_project_tags(
        &self,
        project: &Project,
    ) -> impl Future<Output = anyhow::Result<Vec<Tag>>> + Send;
}
