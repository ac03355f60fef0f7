use serde::{Deserialize, Serialize};

use crate::core::db::{ProjectQuery, ProjectStatus, SortDirection, SortField, StatusCounts};

pub const DEFAULT_PAGE_SIZE: u32 = 25;
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    #[default]
    Grid,
    List,
    Table,
}

/// The user's current dashboard selection. Serialized as the navigation
/// context; missing fields fall back to their defaults when restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    /// `None` shows every status.
    pub status: Option<ProjectStatus>,
    pub company: Option<i64>,
    pub artist: Option<i64>,
    pub tag_ids: Vec<i64>,
    pub search_term: String,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
    pub current_page: u32,
    pub page_size: u32,
    pub view_type: ViewType,
}

impl Default for FilterState {
    fn default() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
}

/// One entry of the status tab strip. `status == None` is the "all" tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusTab {
    pub status: Option<ProjectStatus>,
    pub count: u64,
    pub active: bool,
}

impl StatusTab {
    pub fn label(&self) -> &'static str {
        self.status.map(|s| s.as_str()).unwrap_or("all")
    }
}

impl FilterState {
    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            status: None,
            company: None,
            artist: None,
            tag_ids: Vec::new(),
            search_term: String::new(),
            sort_field: SortField::default(),
            sort_direction: SortDirection::default(),
            current_page: 1,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            view_type: ViewType::default(),
        }
    }

    pub fn update_status(&mut self, status: Option<ProjectStatus>) {
        self.status = status;
        self.current_page = 1;
    }

    pub fn update_company(&mut self, company: Option<i64>) {
        self.company = company;
        self.current_page = 1;
    }

    pub fn update_artist(&mut self, artist: Option<i64>) {
        self.artist = artist;
        self.current_page = 1;
    }

    /// Duplicates are dropped; order is kept.
    pub fn update_tags(&mut self, tag_ids: impl IntoIterator<Item = i64>) {
        let mut ids = Vec::new();
        for id in tag_ids {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        self.tag_ids = ids;
        self.current_page = 1;
    }

    pub fn update_search(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
        self.current_page = 1;
    }

    pub fn update_sort(&mut self, field: SortField, direction: SortDirection) {
        self.sort_field = field;
        self.sort_direction = direction;
        self.current_page = 1;
    }

    pub fn update_view_type(&mut self, view_type: ViewType) {
        self.view_type = view_type;
        self.current_page = 1;
    }

    pub fn set_page(&mut self, page: u32) {
        self.current_page = page.max(1);
    }

    pub fn set_page_size(&mut self, page_size: u32) {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    }

    /// Re-apply the setter invariants to a state that did not come through
    /// the setters, such as a restored snapshot.
    pub fn normalize(&mut self) {
        self.set_page(self.current_page);
        self.set_page_size(self.page_size);
        let tag_ids = std::mem::take(&mut self.tag_ids);
        let page = self.current_page;
        self.update_tags(tag_ids);
        self.current_page = page;
    }

    /// Back to defaults, keeping the current page size.
    pub fn reset(&mut self) {
        *self = Self::with_page_size(self.page_size);
    }

    fn trimmed_search(&self) -> Option<&str> {
        let term = self.search_term.trim();
        (!term.is_empty()).then_some(term)
    }

    pub fn to_query(&self) -> ProjectQuery {
        ProjectQuery {
            status: self.status,
            company_id: self.company,
            artist_id: self.artist,
            tag_ids: self.tag_ids.clone(),
            search: self.trimmed_search().map(str::to_owned),
            sort_field: self.sort_field,
            sort_direction: self.sort_direction,
            page: self.current_page,
            page_size: self.page_size,
        }
    }

    /// Number of narrowing filters in effect. A tag selection counts once
    /// regardless of how many tags it holds.
    pub fn active_filter_count(&self) -> usize {
        [
            self.status.is_some(),
            self.company.is_some(),
            self.artist.is_some(),
            !self.tag_ids.is_empty(),
            self.trimmed_search().is_some(),
        ]
        .into_iter()
        .filter(|active| *active)
        .count()
    }

    pub fn status_tab_counts(&self, counts: &StatusCounts) -> Vec<StatusTab> {
        let all = StatusTab {
            status: None,
            count: counts.total(),
            active: self.status.is_none(),
        };
        std::iter::once(all)
            .chain(ProjectStatus::ALL.into_iter().map(|status| StatusTab {
                status: Some(status),
                count: counts.get(status),
                active: self.status == Some(status),
            }))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_page_three() -> FilterState {
        let mut state = FilterState::default();
        state.set_page(3);
        state
    }

    #[test]
    fn every_filter_update_returns_to_first_page() {
        let updates: [fn(&mut FilterState); 7] = [
            |s| s.update_status(Some(ProjectStatus::Stash)),
            |s| s.update_company(Some(4)),
            |s| s.update_artist(None),
            |s| s.update_tags([1, 2]),
            |s| s.update_search("sunset"),
            |s| s.update_sort(SortField::Title, SortDirection::Asc),
            |s| s.update_view_type(ViewType::List),
        ];
        for update in updates {
            let mut state = on_page_three();
            update(&mut state);
            assert_eq!(state.current_page, 1);
        }
    }

    #[test]
    fn page_and_page_size_changes_keep_the_page() {
        let mut state = on_page_three();
        state.set_page_size(50);
        assert_eq!(state.current_page, 3);
        assert_eq!(state.page_size, 50);

        state.set_page(7);
        assert_eq!(state.current_page, 7);
        state.set_page(0);
        assert_eq!(state.current_page, 1);
    }

    #[test]
    fn page_size_is_clamped() {
        let mut state = FilterState::default();
        state.set_page_size(0);
        assert_eq!(state.page_size, 1);
        state.set_page_size(10_000);
        assert_eq!(state.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn normalize_repairs_out_of_range_fields() {
        let mut state = FilterState {
            current_page: 0,
            page_size: 0,
            tag_ids: vec![4, 2, 4],
            ..FilterState::default()
        };
        state.normalize();
        assert_eq!(state.current_page, 1);
        assert_eq!(state.page_size, 1);
        assert_eq!(state.tag_ids, vec![4, 2]);

        let mut state = FilterState {
            current_page: 7,
            page_size: 10_000,
            ..FilterState::default()
        };
        state.normalize();
        assert_eq!(state.current_page, 7);
        assert_eq!(state.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn reset_keeps_page_size() {
        let mut state = FilterState::with_page_size(60);
        state.update_status(Some(ProjectStatus::Completed));
        state.update_search("x");
        state.set_page(4);
        state.reset();
        assert_eq!(state, FilterState::with_page_size(60));
    }

    #[test]
    fn query_mirrors_the_selection() {
        let mut state = FilterState::default();
        state.update_status(Some(ProjectStatus::Progress));
        state.update_tags([5, 5, 9]);
        state.update_search("  night sky ");
        state.set_page(2);

        let query = state.to_query();
        assert_eq!(query.status, Some(ProjectStatus::Progress));
        assert_eq!(query.tag_ids, vec![5, 9]);
        assert_eq!(query.search.as_deref(), Some("night sky"));
        assert_eq!(query.page, 2);
        assert_eq!(query.page_size, DEFAULT_PAGE_SIZE);

        state.update_search("   ");
        assert_eq!(state.to_query().search, None);
    }

    #[test]
    fn counts_active_filters() {
        let mut state = FilterState::default();
        assert_eq!(state.active_filter_count(), 0);
        state.update_company(Some(1));
        state.update_tags([1, 2, 3]);
        state.update_search("owl");
        state.update_sort(SortField::Title, SortDirection::Asc);
        assert_eq!(state.active_filter_count(), 3);
    }

    #[test]
    fn tab_counts_start_with_all() {
        let mut counts = StatusCounts::default();
        counts.add(ProjectStatus::Stash, 4);
        counts.add(ProjectStatus::Completed, 2);
        let mut state = FilterState::default();
        state.update_status(Some(ProjectStatus::Stash));

        let tabs = state.status_tab_counts(&counts);
        assert_eq!(tabs.len(), ProjectStatus::ALL.len() + 1);
        assert_eq!(tabs[0].label(), "all");
        assert_eq!(tabs[0].count, 6);
        assert!(!tabs[0].active);
        let stash = tabs.iter().find(|t| t.status == Some(ProjectStatus::Stash)).unwrap();
        assert_eq!(stash.count, 4);
        assert!(stash.active);
    }

    #[test]
    fn partial_snapshot_fills_in_defaults() {
        let state: FilterState =
            serde_json::from_value(serde_json::json!({ "status": "completed", "page_size": 10 }))
                .unwrap();
        assert_eq!(state.status, Some(ProjectStatus::Completed));
        assert_eq!(state.page_size, 10);
        assert_eq!(state.current_page, 1);
        assert_eq!(state.view_type, ViewType::Grid);
    }
}
