use std::fmt;

use serde::Serialize;

/// Project attributes a spreadsheet column can be mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectField {
    Title,
    Status,
    Company,
    Artist,
    Width,
    Height,
    TotalDiamonds,
    KitCategory,
    DrillShape,
    SourceUrl,
    GeneralNotes,
    DatePurchased,
    DateReceived,
    DateStarted,
    DateCompleted,
    Tags,
}

impl ProjectField {
    /// Matching order when a header could belong to more than one field.
    pub const ALL: [ProjectField; 16] = [
        ProjectField::Title,
        ProjectField::Status,
        ProjectField::Company,
        ProjectField::Artist,
        ProjectField::Width,
        ProjectField::Height,
        ProjectField::TotalDiamonds,
        ProjectField::KitCategory,
        ProjectField::DrillShape,
        ProjectField::SourceUrl,
        ProjectField::GeneralNotes,
        ProjectField::DatePurchased,
        ProjectField::DateReceived,
        ProjectField::DateStarted,
        ProjectField::DateCompleted,
        ProjectField::Tags,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ProjectField::Title => "title",
            ProjectField::Status => "status",
            ProjectField::Company => "company",
            ProjectField::Artist => "artist",
            ProjectField::Width => "width",
            ProjectField::Height => "height",
            ProjectField::TotalDiamonds => "total_diamonds",
            ProjectField::KitCategory => "kit_category",
            ProjectField::DrillShape => "drill_shape",
            ProjectField::SourceUrl => "source_url",
            ProjectField::GeneralNotes => "general_notes",
            ProjectField::DatePurchased => "date_purchased",
            ProjectField::DateReceived => "date_received",
            ProjectField::DateStarted => "date_started",
            ProjectField::DateCompleted => "date_completed",
            ProjectField::Tags => "tags",
        }
    }

    /// Alternative header spellings, most preferred first. Entries are already
    /// normalized (see [`normalize_header`]).
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            ProjectField::Title => &["name", "project name", "project", "painting", "kit name"],
            ProjectField::Status => &["project status", "state", "stage"],
            ProjectField::Company => &[
                "brand",
                "company name",
                "manufacturer",
                "vendor",
                "supplier",
                "store",
                "shop",
            ],
            ProjectField::Artist => &["artist name", "designer", "art by"],
            ProjectField::Width => &["width cm", "canvas width", "w"],
            ProjectField::Height => &["height cm", "canvas height", "h"],
            ProjectField::TotalDiamonds => &[
                "diamonds",
                "diamond count",
                "drills",
                "drill count",
                "total drills",
                "number of drills",
            ],
            ProjectField::KitCategory => &["category", "kit size", "kit type"],
            ProjectField::DrillShape => &["shape", "drill type", "diamond shape"],
            ProjectField::SourceUrl => &["url", "link", "source", "product url"],
            ProjectField::GeneralNotes => &["notes", "note", "comments", "description"],
            ProjectField::DatePurchased => &["purchase date", "purchased", "date bought", "order date"],
            ProjectField::DateReceived => &["received date", "received", "arrival date"],
            ProjectField::DateStarted => &["start date", "started"],
            ProjectField::DateCompleted => &[
                "completion date",
                "completed",
                "finish date",
                "finished",
                "date finished",
            ],
            ProjectField::Tags => &["tag", "labels", "keywords"],
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, ProjectField::Title)
    }
}

impl fmt::Display for ProjectField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Trim, lowercase and collapse every run of non-alphanumerics into a
/// single space: `" Total_Diamonds (#) "` becomes `"total diamonds"`.
pub fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for c in raw.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }
    out
}
