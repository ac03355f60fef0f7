//! Dashboard filter selection and its persistence.

mod filter;
mod session;

pub use filter::{DEFAULT_PAGE_SIZE, FilterState, MAX_PAGE_SIZE, StatusTab, ViewType};
pub use session::DashboardSession;
