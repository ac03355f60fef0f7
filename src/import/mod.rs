//! Spreadsheet import: header analysis, template generation and the row importer.

mod analysis;
mod fields;
mod runner;
mod template;

pub use analysis::{
    ColumnAnalysis, ColumnMapping, DuplicateColumn, MatchKind, UnmappedColumn, analyze_headers,
};
pub use fields::{ProjectField, normalize_header};
pub use runner::{ImportOptions, ImportReport, RowError, import_csv};
pub use template::template_csv;
