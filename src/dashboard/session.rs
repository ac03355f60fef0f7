use std::time::Duration;

use tokio::task::JoinHandle;

use crate::{
    config::DashboardConfig, core::db::DashboardSettingsRepository, dashboard::FilterState,
    error::is_not_found,
};

/// A mounted dashboard: the live [`FilterState`] plus debounced persistence
/// of it as the user's navigation context.
///
/// Every change restarts the debounce window; only the last snapshot inside a
/// window is written. A pending write still completes if the session is
/// dropped, use [`flush`](Self::flush) to write synchronously.
pub struct DashboardSession<R> {
    repo: R,
    state: FilterState,
    debounce: Duration,
    pending_save: Option<JoinHandle<()>>,
}

impl<R> DashboardSession<R>
where
    R: DashboardSettingsRepository + Clone + Send + Sync + 'static,
{
    /// Restore the saved snapshot, or start from defaults when there is none
    /// or it cannot be read.
    pub async fn mount(repo: R, config: &DashboardConfig) -> Self {
        let defaults = FilterState::with_page_size(config.default_page_size);
        let state = match repo.load_navigation_context().await {
            Ok(Some(snapshot)) => match serde_json::from_value::<FilterState>(snapshot) {
                Ok(mut state) => {
                    state.normalize();
                    state
                }
                Err(e) => {
                    tracing::debug!(error = %e, "ignoring unreadable navigation context");
                    defaults
                }
            },
            Ok(None) => defaults,
            Err(e) if is_not_found(&e) => defaults,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load navigation context, using defaults");
                defaults
            }
        };
        Self {
            repo,
            state,
            debounce: config.debounce(),
            pending_save: None,
        }
    }

    pub fn filters(&self) -> &FilterState {
        &self.state
    }

    /// Apply a change and schedule persistence if anything actually changed.
    pub fn update<F>(&mut self, change: F)
    where
        F: FnOnce(&mut FilterState),
    {
        let before = self.state.clone();
        change(&mut self.state);
        if self.state != before {
            self.schedule_save();
        }
    }

    pub fn has_pending_save(&self) -> bool {
        self.pending_save
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancel any pending debounced write and persist the current state now.
    pub async fn flush(&mut self) -> anyhow::Result<()> {
        if let Some(handle) = self.pending_save.take() {
            handle.abort();
        }
        let snapshot = serde_json::to_value(&self.state)?;
        self.repo.save_navigation_context(&snapshot).await
    }

    fn schedule_save(&mut self) {
        if let Some(handle) = self.pending_save.take() {
            handle.abort();
        }
        let snapshot = match serde_json::to_value(&self.state) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize navigation context");
                return;
            }
        };
        let repo = self.repo.clone();
        let debounce = self.debounce;
        self.pending_save = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            match repo.save_navigation_context(&snapshot).await {
                Ok(()) => tracing::trace!("navigation context saved"),
                Err(e) => tracing::warn!(error = %e, "failed to save navigation context"),
            }
        }));
    }
}
