use std::collections::BTreeMap;

use serde::Serialize;

use crate::import::fields::{ProjectField, normalize_header};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "priority")]
pub enum MatchKind {
    /// Header is the field's own name.
    Exact,
    /// Header matched the alias at this position in the field's alias list.
    Alias(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    pub field: ProjectField,
    pub column: usize,
    pub header: String,
    pub matched: MatchKind,
}

/// A header that matched a field already claimed by a better header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateColumn {
    pub field: ProjectField,
    pub column: usize,
    pub header: String,
    /// Column that won the field.
    pub chosen_column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmappedColumn {
    pub column: usize,
    pub header: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnAnalysis {
    /// Winning column per field, ordered by column.
    pub mappings: Vec<ColumnMapping>,
    pub unmapped: Vec<UnmappedColumn>,
    pub duplicates: Vec<DuplicateColumn>,
    pub missing_required: Vec<ProjectField>,
    pub missing_optional: Vec<ProjectField>,
}

impl ColumnAnalysis {
    pub fn column_for(&self, field: ProjectField) -> Option<usize> {
        self.mappings
            .iter()
            .find(|m| m.field == field)
            .map(|m| m.column)
    }

    pub fn is_importable(&self) -> bool {
        self.missing_required.is_empty()
    }
}

fn match_header(normalized: &str) -> Option<(ProjectField, MatchKind)> {
    if normalized.is_empty() {
        return None;
    }
    ProjectField::ALL.into_iter().find_map(|field| {
        if normalize_header(field.name()) == normalized {
            return Some((field, MatchKind::Exact));
        }
        field
            .aliases()
            .iter()
            .position(|alias| *alias == normalized)
            .map(|pos| (field, MatchKind::Alias(pos)))
    })
}

/// Map spreadsheet headers onto project fields.
///
/// When several headers match one field the winner is the exact name match,
/// then the alias listed earliest, then the leftmost column. The ordering is
/// total, so the outcome only depends on the header list.
pub fn analyze_headers<S: AsRef<str>>(headers: &[S]) -> ColumnAnalysis {
    let mut candidates: BTreeMap<ProjectField, Vec<(MatchKind, usize)>> = BTreeMap::new();
    let mut analysis = ColumnAnalysis::default();

    for (column, header) in headers.iter().enumerate() {
        let header = header.as_ref();
        match match_header(&normalize_header(header)) {
            Some((field, kind)) => candidates.entry(field).or_default().push((kind, column)),
            None => analysis.unmapped.push(UnmappedColumn {
                column,
                header: header.to_string(),
            }),
        }
    }

    for (field, mut matches) in candidates {
        matches.sort();
        let (matched, chosen_column) = matches[0];
        analysis.mappings.push(ColumnMapping {
            field,
            column: chosen_column,
            header: headers[chosen_column].as_ref().to_string(),
            matched,
        });
        for &(_, column) in &matches[1..] {
            analysis.duplicates.push(DuplicateColumn {
                field,
                column,
                header: headers[column].as_ref().to_string(),
                chosen_column,
            });
        }
    }
    analysis.mappings.sort_by_key(|m| m.column);
    analysis.duplicates.sort_by_key(|d| d.column);

    for field in ProjectField::ALL {
        if analysis.column_for(field).is_some() {
            continue;
        }
        if field.is_required() {
            analysis.missing_required.push(field);
        } else {
            analysis.missing_optional.push(field);
        }
    }
    analysis
}
