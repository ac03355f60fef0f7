use std::future::Future;

/// Per-user storage for the serialized dashboard navigation context.
pub trait DashboardSettingsRepository {
    fn load_navigation_context(
        &self,
    ) -> impl Future<Output = anyhow::Result<Option<serde_json::Value>>> + Send;
    fn save_navigation_context(
        &self,
        context: &serde_json::Value,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}
