pub mod config;
pub mod core;
pub mod dashboard;
pub mod error;
pub mod import;
pub mod logging;
pub mod randomizer;
pub mod retry;
pub mod slug;
pub mod stats;

pub use config::Config;
pub use crate::core::db::{LibraryDb, UserDb};
pub use error::LibraryError;
pub use stats::{YearlyStats, YearlyStatsService};
