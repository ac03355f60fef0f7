use crate::import::fields::ProjectField;

fn example_value(field: ProjectField) -> &'static str {
    match field {
        ProjectField::Title => "Moonlit Harbor",
        ProjectField::Status => "progress",
        ProjectField::Company => "Diamond Art Club",
        ProjectField::Artist => "Jane Doe",
        ProjectField::Width => "40",
        ProjectField::Height => "50",
        ProjectField::TotalDiamonds => "32000",
        ProjectField::KitCategory => "full",
        ProjectField::DrillShape => "round",
        ProjectField::SourceUrl => "https://example.com/moonlit-harbor",
        ProjectField::GeneralNotes => "Gift from a friend",
        ProjectField::DatePurchased => "2024-01-15",
        ProjectField::DateReceived => "2024-01-29",
        ProjectField::DateStarted => "2024-02-03",
        ProjectField::DateCompleted => "",
        ProjectField::Tags => "seascape, night",
    }
}

/// A CSV with every importable field as a header and one filled-in row.
pub fn template_csv() -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(ProjectField::ALL.iter().map(|f| f.name()))?;
    writer.write_record(ProjectField::ALL.iter().map(|f| example_value(*f)))?;
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush template CSV: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::analyze_headers;

    #[test]
    fn template_headers_map_exactly() {
        let csv = template_csv().unwrap();
        let header_line = csv.lines().next().unwrap();
        let headers: Vec<&str> = header_line.split(',').collect();
        let analysis = analyze_headers(&headers);
        assert_eq!(analysis.mappings.len(), ProjectField::ALL.len());
        assert!(analysis.unmapped.is_empty());
        assert!(analysis.missing_optional.is_empty());
        assert!(analysis.is_importable());
    }

    #[test]
    fn template_has_one_example_row() {
        let csv = template_csv().unwrap();
        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let rows: Vec<_> = reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "Moonlit Harbor");
        assert_eq!(&rows[0][15], "seascape, night");
    }
}
