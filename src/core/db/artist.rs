use std::future::Future;

#[derive(Debug, Clone)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub project_count: u64,
    pub(super) _guard: (),
}

pub trait ArtistRepository {
    fn get_artists(&self) -> impl Future<Output = anyhow::Result<Vec<Artist>>> + Send;
    fn get_artist_by_id(
        &self,
        id: i64,
    ) -> impl Future<Output = anyhow::Result<Option<Artist>>> + Send;
    fn get_artist_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = anyhow::Result<Option<Artist>>> + Send;
    fn add_artist(&self, name: &str) -> impl Future<Output = anyhow::Result<Artist>> + Send;
    fn rename_artist(
        &self,
        artist: &Artist,
        name: &str,
    ) -> impl Future<Output = anyhow::Result<Artist>> + Send;
    fn delete_artist(&self, artist: Artist) -> impl Future<Output = anyhow::Result<()>> + Send;
}
