use httpmock::prelude::*;
use sheet_insight::core::SheetSource;
use sheet_insight::utils::error::IngestError;
use sheet_insight::SpreadsheetSource;
use std::io::Write;
use tempfile::TempDir;

#[tokio::test]
async fn test_local_csv_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("tasks.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "Task,Owner,Status,Due").unwrap();
    writeln!(file, "Fix login,Alice,Done,2026-03-01").unwrap();
    writeln!(file, "Write docs,Bob,In Progress,2026-03-05").unwrap();

    let source = SpreadsheetSource::new().unwrap();
    let sheets = source.fetch(path.to_str().unwrap()).await.unwrap();

    assert_eq!(sheets.len(), 1);
    assert_eq!(sheets[0].name, "tasks");
    assert_eq!(sheets[0].header, vec!["Task", "Owner", "Status", "Due"]);
    assert_eq!(sheets[0].rows.len(), 2);
}

#[tokio::test]
async fn test_unsupported_extension() {
    let source = SpreadsheetSource::new().unwrap();
    let error = source.fetch("tasks.pdf").await.unwrap_err();
    assert!(matches!(error, IngestError::UnsupportedFormat(_)));
}

#[tokio::test]
async fn test_private_sheet_reports_share_hint() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/abc123/export")
            .query_param("format", "xlsx");
        then.status(403);
    });

    let source = SpreadsheetSource::new()
        .unwrap()
        .with_export_base_url(server.url(""));
    let error = source
        .fetch("https://docs.google.com/spreadsheets/d/abc123/edit#gid=0")
        .await
        .unwrap_err();

    mock.assert();
    assert!(matches!(error, IngestError::NotPublic));
    assert!(error.to_string().contains("Anyone with link"));
}

#[tokio::test]
async fn test_csv_export_fallback_when_workbook_export_fails() {
    let server = MockServer::start();
    let xlsx_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/abc123/export")
            .query_param("format", "xlsx");
        then.status(500);
    });
    let csv_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/abc123/export")
            .query_param("format", "csv");
        then.status(200)
            .header("Content-Type", "text/csv")
            .body("Task,Status\nFix login,Done\n");
    });

    let source = SpreadsheetSource::new()
        .unwrap()
        .with_export_base_url(server.url(""));
    let sheets = source
        .fetch("https://docs.google.com/spreadsheets/d/abc123/edit")
        .await
        .unwrap();

    assert_eq!(xlsx_mock.hits(), 3);
    assert_eq!(csv_mock.hits(), 1);
    assert_eq!(sheets.len(), 1);
    assert_eq!(sheets[0].name, "Sheet1");
    assert_eq!(sheets[0].header, vec!["Task", "Status"]);
}

#[tokio::test]
async fn test_unreachable_source_when_everything_fails() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/abc123/export");
        then.status(500);
    });

    let source = SpreadsheetSource::new()
        .unwrap()
        .with_export_base_url(server.url(""));
    let error = source
        .fetch("https://docs.google.com/spreadsheets/d/abc123/edit")
        .await
        .unwrap_err();

    assert!(matches!(error, IngestError::UnreachableSource(_)));
}
