use std::{collections::HashMap, io::Read, str::FromStr};

use serde::Serialize;
use time::{Date, format_description::FormatItem, macros::format_description};

use crate::{
    core::db::{
        ArtistRepository, CompanyRepository, NewCompany, NewProject, NewTag, ProjectRepository,
        ProjectStatus, TagRepository, UserDb,
    },
    error::LibraryError,
    import::{
        analysis::{ColumnAnalysis, analyze_headers},
        fields::ProjectField,
    },
};

const DATE_FORMATS: [&[FormatItem<'static>]; 3] = [
    format_description!("[year]-[month]-[day]"),
    format_description!("[month padding:none]/[day padding:none]/[year]"),
    format_description!("[day padding:none].[month padding:none].[year]"),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct ImportOptions {
    /// Parse and validate every row without writing anything.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based line in the file; the header is line 1.
    pub line: u64,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub analysis: ColumnAnalysis,
    pub rows_read: u64,
    /// Rows that were (or in a dry run would have been) imported.
    pub imported: u64,
    pub project_ids: Vec<i64>,
    /// Rows with an empty title.
    pub skipped: u64,
    pub errors: Vec<RowError>,
    pub created_companies: u64,
    pub created_artists: u64,
    pub created_tags: u64,
    pub dry_run: bool,
}

/// A row turned into a project plus the names it references.
#[derive(Debug, Default)]
struct ParsedRow {
    project: NewProject,
    company: Option<String>,
    artist: Option<String>,
    tags: Vec<String>,
}

pub(crate) fn parse_flexible_date(raw: &str) -> Option<Date> {
    DATE_FORMATS
        .iter()
        .find_map(|format| Date::parse(raw, *format).ok())
}

fn parse_count<T: FromStr>(field: ProjectField, raw: &str) -> Result<T, String> {
    let cleaned: String = raw
        .trim_end_matches(|c: char| c.is_alphabetic() || c.is_whitespace())
        .chars()
        .filter(|c| !matches!(c, ',' | '_' | ' '))
        .collect();
    cleaned
        .parse()
        .map_err(|_| format!("{}: '{}' is not a whole number", field, raw))
}

fn parse_enum<T>(field: ProjectField, raw: &str) -> Result<T, String>
where
    T: FromStr<Err = LibraryError>,
{
    raw.parse().map_err(|e: LibraryError| format!("{}: {}", field, e))
}

fn split_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for name in raw.split([',', ';', '|']).map(str::trim).filter(|n| !n.is_empty()) {
        if !tags.iter().any(|t| t.eq_ignore_ascii_case(name)) {
            tags.push(name.to_string());
        }
    }
    tags
}

fn parse_row(analysis: &ColumnAnalysis, record: &csv::StringRecord) -> Result<ParsedRow, String> {
    let mut row = ParsedRow::default();
    for mapping in &analysis.mappings {
        let raw = record.get(mapping.column).unwrap_or("").trim();
        if raw.is_empty() {
            continue;
        }
        let field = mapping.field;
        let date = || parse_flexible_date(raw).ok_or_else(|| format!("{}: unrecognized date '{}'", field, raw));
        let project = &mut row.project;
        match field {
            ProjectField::Title => project.title = raw.to_string(),
            ProjectField::Status => project.status = parse_enum::<ProjectStatus>(field, raw)?,
            ProjectField::Company => row.company = Some(raw.to_string()),
            ProjectField::Artist => row.artist = Some(raw.to_string()),
            ProjectField::Width => project.width = Some(parse_count(field, raw)?),
            ProjectField::Height => project.height = Some(parse_count(field, raw)?),
            ProjectField::TotalDiamonds => project.total_diamonds = Some(parse_count(field, raw)?),
            ProjectField::KitCategory => project.kit_category = Some(parse_enum(field, raw)?),
            ProjectField::DrillShape => project.drill_shape = Some(parse_enum(field, raw)?),
            ProjectField::SourceUrl => project.source_url = Some(raw.to_string()),
            ProjectField::GeneralNotes => project.general_notes = raw.to_string(),
            ProjectField::DatePurchased => project.date_purchased = Some(date()?),
            ProjectField::DateReceived => project.date_received = Some(date()?),
            ProjectField::DateStarted => project.date_started = Some(date()?),
            ProjectField::DateCompleted => project.date_completed = Some(date()?),
            ProjectField::Tags => row.tags = split_tags(raw),
        }
    }
    Ok(row)
}

/// Name → id lookups shared across rows, creating records on first use.
#[derive(Default)]
struct ReferenceCache {
    companies: HashMap<String, i64>,
    artists: HashMap<String, i64>,
    tags: HashMap<String, i64>,
}

impl ReferenceCache {
    async fn company(&mut self, db: &UserDb, name: &str, report: &mut ImportReport) -> anyhow::Result<i64> {
        let key = name.to_lowercase();
        if let Some(id) = self.companies.get(&key) {
            return Ok(*id);
        }
        let id = match db.get_company_by_name(name).await? {
            Some(company) => company.id,
            None => {
                let company = db
                    .add_company(&NewCompany {
                        name: name.to_string(),
                        website: None,
                    })
                    .await?;
                report.created_companies += 1;
                company.id
            }
        };
        self.companies.insert(key, id);
        Ok(id)
    }

    async fn artist(&mut self, db: &UserDb, name: &str, report: &mut ImportReport) -> anyhow::Result<i64> {
        let key = name.to_lowercase();
        if let Some(id) = self.artists.get(&key) {
            return Ok(*id);
        }
        let id = match db.get_artist_by_name(name).await? {
            Some(artist) => artist.id,
            None => {
                let artist = db.add_artist(name).await?;
                report.created_artists += 1;
                artist.id
            }
        };
        self.artists.insert(key, id);
        Ok(id)
    }

    async fn tag(&mut self, db: &UserDb, name: &str, report: &mut ImportReport) -> anyhow::Result<i64> {
        let key = name.to_lowercase();
        if let Some(id) = self.tags.get(&key) {
            return Ok(*id);
        }
        let id = match db.get_tag_by_name(name).await? {
            Some(tag) => tag.id,
            None => {
                let tag = db
                    .add_tag(&NewTag {
                        name: name.to_string(),
                        color: None,
                    })
                    .await?;
                report.created_tags += 1;
                tag.id
            }
        };
        self.tags.insert(key, id);
        Ok(id)
    }
}

async fn store_row(
    db: &UserDb,
    cache: &mut ReferenceCache,
    mut row: ParsedRow,
    report: &mut ImportReport,
) -> anyhow::Result<i64> {
    if let Some(name) = &row.company {
        row.project.company_id = Some(cache.company(db, name, report).await?);
    }
    if let Some(name) = &row.artist {
        row.project.artist_id = Some(cache.artist(db, name, report).await?);
    }
    for name in &row.tags {
        row.project.tag_ids.push(cache.tag(db, name, report).await?);
    }
    Ok(db.add_project(&row.project).await?.id)
}

/// Import projects from CSV.
///
/// Fails up front when no column maps to the title. Otherwise every row is
/// attempted: rows without a title are skipped, rows that do not parse or are
/// rejected by the library are reported in [`ImportReport::errors`], and
/// referenced companies, artists and tags are created by name when missing.
pub async fn import_csv<R: Read>(
    db: &UserDb,
    reader: R,
    options: ImportOptions,
) -> anyhow::Result<ImportReport> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let analysis = analyze_headers(&headers.iter().collect::<Vec<_>>());
    if !analysis.is_importable() {
        let missing: Vec<_> = analysis.missing_required.iter().map(|f| f.name()).collect();
        return Err(LibraryError::validation(
            "csv",
            format!("no column for required field(s): {}", missing.join(", ")),
        )
        .into());
    }
    for duplicate in &analysis.duplicates {
        tracing::info!(
            header = %duplicate.header,
            field = %duplicate.field,
            chosen_column = duplicate.chosen_column,
            "ignoring duplicate column"
        );
    }

    let mut report = ImportReport {
        analysis,
        dry_run: options.dry_run,
        ..Default::default()
    };
    let mut cache = ReferenceCache::default();

    let mut last_line = 1;
    for record in csv_reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map_or(last_line + 1, |p| p.line());
                last_line = line;
                report.rows_read += 1;
                report.errors.push(RowError {
                    line,
                    message: e.to_string(),
                });
                continue;
            }
        };
        let line = record.position().map_or(last_line + 1, |p| p.line());
        last_line = line;
        if record.iter().all(str::is_empty) {
            continue;
        }
        report.rows_read += 1;

        let row = match parse_row(&report.analysis, &record) {
            Ok(row) => row,
            Err(message) => {
                report.errors.push(RowError { line, message });
                continue;
            }
        };
        if row.project.title.is_empty() {
            report.skipped += 1;
            continue;
        }
        if options.dry_run {
            report.imported += 1;
            continue;
        }

        match store_row(db, &mut cache, row, &mut report).await {
            Ok(id) => {
                report.imported += 1;
                report.project_ids.push(id);
            }
            Err(e) => match e.downcast_ref::<LibraryError>() {
                Some(domain) => report.errors.push(RowError {
                    line,
                    message: domain.to_string(),
                }),
                None => return Err(e.context(format!("Import aborted at line {}", line))),
            },
        }
    }

    tracing::info!(
        user_id = %db.user_id(),
        rows = report.rows_read,
        imported = report.imported,
        skipped = report.skipped,
        errors = report.errors.len(),
        dry_run = options.dry_run,
        "csv import finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;
    use crate::core::db::{DrillShape, KitCategory};

    fn record(fields: &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(fields.to_vec())
    }

    #[test]
    fn accepts_three_date_layouts() {
        assert_eq!(parse_flexible_date("2024-03-09"), Some(date!(2024 - 03 - 09)));
        assert_eq!(parse_flexible_date("3/9/2024"), Some(date!(2024 - 03 - 09)));
        assert_eq!(parse_flexible_date("09.03.2024"), Some(date!(2024 - 03 - 09)));
        assert_eq!(parse_flexible_date("March 9"), None);
    }

    #[test]
    fn counts_tolerate_separators_and_units() {
        assert_eq!(parse_count::<u64>(ProjectField::TotalDiamonds, "32,000"), Ok(32_000));
        assert_eq!(parse_count::<u32>(ProjectField::Width, "40 cm"), Ok(40));
        assert!(parse_count::<u32>(ProjectField::Width, "forty").is_err());
    }

    #[test]
    fn tags_split_and_dedupe() {
        assert_eq!(split_tags("Cats; animals, cats | "), vec!["Cats", "animals"]);
    }

    #[test]
    fn parses_a_full_row() {
        let analysis = analyze_headers(&[
            "Title", "Status", "Brand", "Drills", "Kit Size", "Shape", "Started", "Tags",
        ]);
        let row = parse_row(
            &analysis,
            &record(&["Owl", "WIP", "DAC", "12,500", "mini", "square", "1/2/2024", "birds, night"]),
        )
        .unwrap();
        assert_eq!(row.project.title, "Owl");
        assert_eq!(row.project.status, ProjectStatus::Progress);
        assert_eq!(row.company.as_deref(), Some("DAC"));
        assert_eq!(row.project.total_diamonds, Some(12_500));
        assert_eq!(row.project.kit_category, Some(KitCategory::Mini));
        assert_eq!(row.project.drill_shape, Some(DrillShape::Square));
        assert_eq!(row.project.date_started, Some(date!(2024 - 01 - 02)));
        assert_eq!(row.tags, vec!["birds", "night"]);
    }

    #[test]
    fn bad_value_names_the_field() {
        let analysis = analyze_headers(&["title", "date_completed"]);
        let err = parse_row(&analysis, &record(&["Owl", "yesterday"])).unwrap_err();
        assert!(err.contains("date_completed"), "{err}");
    }

    #[test]
    fn short_rows_leave_fields_empty() {
        let analysis = analyze_headers(&["title", "status", "notes"]);
        let row = parse_row(&analysis, &record(&["Owl"])).unwrap();
        assert_eq!(row.project.status, ProjectStatus::Wishlist);
        assert!(row.project.general_notes.is_empty());
    }
}
