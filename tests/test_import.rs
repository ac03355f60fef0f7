//! Integration tests for CSV import into a library.

mod common;

use common::*;
use dpstash::import::{ImportOptions, ProjectField, import_csv, template_csv};
use time::macros::date;

const SPREADSHEET: &str = "\
Name,Brand,Drills,Status,Purchase Date,Tags,Painting
Owl,DAC,\"12,000\",WIP,3/9/2024,birds; night,ignored
,DAC,100,stash,,,
Fox,Dreamer,abc,stash,,,

Heron,dac,500,done,2024-05-01,Birds,
";

#[tokio::test]
async fn test_import_with_aliases() -> anyhow::Result<()> {
    let (_library, user, _temp_dir) = create_test_user_library().await;

    let report = import_csv(&user, SPREADSHEET.as_bytes(), ImportOptions::default()).await?;

    assert_eq!(report.analysis.column_for(ProjectField::Title), Some(0));
    assert_eq!(report.analysis.duplicates.len(), 1);
    assert_eq!(report.analysis.duplicates[0].header, "Painting");
    assert_eq!(report.rows_read, 4);
    assert_eq!(report.imported, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].line, 4);
    assert!(report.errors[0].message.contains("total_diamonds"));
    assert_eq!(report.created_companies, 1);
    assert_eq!(report.created_artists, 0);
    assert_eq!(report.created_tags, 2);
    assert!(!report.dry_run);

    let owl = user.get_project_by_id(report.project_ids[0]).await?.unwrap();
    assert_eq!(owl.title, "Owl");
    assert_eq!(owl.status, ProjectStatus::Progress);
    assert_eq!(owl.total_diamonds, Some(12_000));
    assert_eq!(owl.company_name.as_deref(), Some("DAC"));
    assert_eq!(owl.date_purchased, Some(date!(2024 - 03 - 09)));
    let owl_tags: Vec<_> = user
        .get_project_tags(&owl)
        .await?
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(owl_tags, vec!["birds", "night"]);

    let heron = user.get_project_by_id(report.project_ids[1]).await?.unwrap();
    assert_eq!(heron.status, ProjectStatus::Completed);
    assert_eq!(heron.company_id, owl.company_id);
    let birds = user.get_tag_by_name("birds").await?.unwrap();
    assert_eq!(birds.project_count, 2);
    Ok(())
}

#[tokio::test]
async fn test_import_reuses_existing_records() -> anyhow::Result<()> {
    let (_library, user, _temp_dir) = create_test_user_library().await;
    let company = user
        .add_company(&NewCompany {
            name: "Diamond Art Club".into(),
            website: None,
        })
        .await?;
    let artist = user.add_artist("Jane Doe").await?;

    let csv = "title,company,artist\nMoon,diamond art club,JANE DOE\nSun,Diamond Art Club,\n";
    let report = import_csv(&user, csv.as_bytes(), ImportOptions::default()).await?;

    assert_eq!(report.imported, 2);
    assert_eq!(report.created_companies, 0);
    assert_eq!(report.created_artists, 0);
    let company = user.get_company_by_id(company.id).await?.unwrap();
    assert_eq!(company.project_count, 2);
    let artist = user.get_artist_by_id(artist.id).await?.unwrap();
    assert_eq!(artist.project_count, 1);
    Ok(())
}

#[tokio::test]
async fn test_dry_run_writes_nothing() -> anyhow::Result<()> {
    let (_library, user, _temp_dir) = create_test_user_library().await;

    let report = import_csv(
        &user,
        SPREADSHEET.as_bytes(),
        ImportOptions { dry_run: true },
    )
    .await?;

    assert!(report.dry_run);
    assert_eq!(report.imported, 2);
    assert!(report.project_ids.is_empty());
    assert_eq!(report.errors.len(), 1);
    assert!(user.get_projects().await?.is_empty());
    assert!(user.get_companies().await?.is_empty());
    assert!(user.get_tags().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_rejected_rows_are_reported() -> anyhow::Result<()> {
    let (_library, user, _temp_dir) = create_test_user_library().await;
    let csv = "title,tags,status\nGood,calm,stash\nBad tag,!!!,stash\nBad status,,maybe\n";

    let report = import_csv(&user, csv.as_bytes(), ImportOptions::default()).await?;

    assert_eq!(report.imported, 1);
    let lines: Vec<_> = report.errors.iter().map(|e| e.line).collect();
    assert_eq!(lines, vec![3, 4]);
    assert!(report.errors[0].message.contains("name"));
    assert!(report.errors[1].message.contains("status"));
    assert_eq!(user.get_projects().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_title_column_fails() -> anyhow::Result<()> {
    let (_library, user, _temp_dir) = create_test_user_library().await;
    let csv = "brand,drills\nDAC,100\n";

    let err = import_csv(&user, csv.as_bytes(), ImportOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        library_error(&err),
        Some(LibraryError::Validation { field: "csv", .. })
    ));
    assert!(err.to_string().contains("title"));
    assert!(user.get_projects().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_template_imports_cleanly() -> anyhow::Result<()> {
    let (_library, user, _temp_dir) = create_test_user_library().await;
    let template = template_csv()?;

    let report = import_csv(&user, template.as_bytes(), ImportOptions::default()).await?;

    assert!(report.errors.is_empty());
    assert_eq!(report.imported, 1);
    assert!(report.analysis.unmapped.is_empty());
    let project = user.get_project_by_id(report.project_ids[0]).await?.unwrap();
    assert_eq!(project.title, "Moonlit Harbor");
    assert_eq!(project.status, ProjectStatus::Progress);
    assert_eq!(project.kit_category, Some(KitCategory::Full));
    assert_eq!(project.drill_shape, Some(DrillShape::Round));
    assert_eq!(project.date_received, Some(date!(2024 - 01 - 29)));
    assert_eq!(project.artist_name.as_deref(), Some("Jane Doe"));
    assert_eq!(user.get_project_tags(&project).await?.len(), 2);
    Ok(())
}
