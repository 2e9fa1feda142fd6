use crate::domain::model::{CellValue, RawSheet};
use crate::domain::ports::SheetSource;
use crate::utils::error::{IngestError, Result};
use async_trait::async_trait;
use calamine::{Data, Reader, Xlsx};
use reqwest::Client;
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

const GOOGLE_EXPORT_BASE: &str = "https://docs.google.com/spreadsheets/d";
const FETCH_ATTEMPTS: u32 = 3;
const FETCH_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Ingest adapter: public Google Sheets URL or a local .xlsx/.csv file
/// becomes `RawSheet`s. Reads on demand, never caches anything.
pub struct SpreadsheetSource {
    client: Client,
    export_base_url: String,
}

impl SpreadsheetSource {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0")
            .build()?;
        Ok(Self {
            client,
            export_base_url: GOOGLE_EXPORT_BASE.to_string(),
        })
    }

    /// Override the export endpoint (tests point this at a mock server).
    pub fn with_export_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.export_base_url = base_url.into();
        self
    }

    /// Google Sheets URLs look like .../spreadsheets/d/<id>/edit#gid=0.
    fn extract_sheet_id(url: &str) -> &str {
        match url.split_once("/d/") {
            Some((_, rest)) => rest.split('/').next().unwrap_or(rest),
            None => url,
        }
    }

    async fn fetch_google(&self, url: &str) -> std::result::Result<Vec<RawSheet>, IngestError> {
        let sheet_id = Self::extract_sheet_id(url);
        let export_url = format!("{}/{}/export?format=xlsx", self.export_base_url, sheet_id);

        let mut last_error = String::new();
        for attempt in 0..FETCH_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(FETCH_RETRY_DELAY).await;
            }
            match self.client.get(&export_url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let bytes = response.bytes().await.map_err(|e| {
                            IngestError::UnreachableSource(format!("body read failed: {}", e))
                        })?;
                        return parse_xlsx_bytes(&bytes);
                    }
                    if status.as_u16() == 403 {
                        return Err(IngestError::NotPublic);
                    }
                    last_error = format!("HTTP {}", status);
                    tracing::debug!(
                        "Export attempt {}/{} failed: {}",
                        attempt + 1,
                        FETCH_ATTEMPTS,
                        last_error
                    );
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::debug!(
                        "Export attempt {}/{} failed: {}",
                        attempt + 1,
                        FETCH_ATTEMPTS,
                        last_error
                    );
                }
            }
        }

        // Workbook export kept failing; the CSV export sometimes still
        // works and at least yields the first sheet.
        tracing::warn!("Workbook export failed ({}), trying CSV export", last_error);
        let csv_url = format!("{}/{}/export?format=csv", self.export_base_url, sheet_id);
        match self.client.get(&csv_url).send().await {
            Ok(response) if response.status().is_success() => {
                let bytes = response.bytes().await.map_err(|e| {
                    IngestError::UnreachableSource(format!("body read failed: {}", e))
                })?;
                let sheet = parse_csv_bytes("Sheet1", &bytes)?;
                Ok(vec![sheet])
            }
            Ok(response) => Err(IngestError::UnreachableSource(format!(
                "xlsx export: {}; csv export: HTTP {}",
                last_error,
                response.status()
            ))),
            Err(e) => Err(IngestError::UnreachableSource(format!(
                "xlsx export: {}; csv export: {}",
                last_error, e
            ))),
        }
    }

    fn read_local(&self, path: &str) -> std::result::Result<Vec<RawSheet>, IngestError> {
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "xlsx" => {
                let bytes = std::fs::read(path)
                    .map_err(|e| IngestError::UnreachableSource(format!("{}: {}", path, e)))?;
                parse_xlsx_bytes(&bytes)
            }
            "csv" => {
                let bytes = std::fs::read(path)
                    .map_err(|e| IngestError::UnreachableSource(format!("{}: {}", path, e)))?;
                let name = Path::new(path)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("Sheet1")
                    .to_string();
                Ok(vec![parse_csv_bytes(&name, &bytes)?])
            }
            other => Err(IngestError::UnsupportedFormat(format!(
                ".{} files are not supported",
                other
            ))),
        }
    }
}

#[async_trait]
impl SheetSource for SpreadsheetSource {
    async fn fetch(&self, source: &str) -> std::result::Result<Vec<RawSheet>, IngestError> {
        let sheets = if source.starts_with("http://") || source.starts_with("https://") {
            self.fetch_google(source).await?
        } else {
            self.read_local(source)?
        };
        if sheets.is_empty() {
            return Err(IngestError::EmptyDocument);
        }
        Ok(sheets)
    }
}

fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => {
            if s.trim().is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(s.clone())
            }
        }
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) => CellValue::Empty,
    }
}

fn parse_xlsx_bytes(bytes: &[u8]) -> std::result::Result<Vec<RawSheet>, IngestError> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = Xlsx::new(cursor)
        .map_err(|e| IngestError::UnsupportedFormat(format!("not a readable workbook: {}", e)))?;

    let mut sheets = Vec::new();
    for (name, range) in workbook.worksheets() {
        let mut rows = range.rows();
        let Some(header_row) = rows.next() else {
            continue; // sheet with no cells at all
        };
        let header: Vec<String> = header_row.iter().map(|c| c.to_string()).collect();
        let data_rows: Vec<Vec<CellValue>> = rows
            .map(|row| row.iter().map(cell_from_data).collect())
            .collect();
        sheets.push(RawSheet {
            name,
            header,
            rows: data_rows,
        });
    }

    if sheets.is_empty() {
        return Err(IngestError::EmptyDocument);
    }
    Ok(sheets)
}

fn parse_csv_bytes(name: &str, bytes: &[u8]) -> std::result::Result<RawSheet, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| IngestError::UnsupportedFormat(format!("bad CSV header: {}", e)))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| IngestError::UnsupportedFormat(format!("bad CSV row: {}", e)))?;
        let mut row: Vec<CellValue> = record
            .iter()
            .map(|field| {
                if field.trim().is_empty() {
                    CellValue::Empty
                } else if let Ok(n) = field.trim().parse::<f64>() {
                    CellValue::Number(n)
                } else {
                    CellValue::Text(field.to_string())
                }
            })
            .collect();
        row.resize(header.len(), CellValue::Empty);
        rows.push(row);
    }

    if header.is_empty() {
        return Err(IngestError::EmptyDocument);
    }
    Ok(RawSheet {
        name: name.to_string(),
        header,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_sheet_id() {
        assert_eq!(
            SpreadsheetSource::extract_sheet_id(
                "https://docs.google.com/spreadsheets/d/abc123/edit#gid=0"
            ),
            "abc123"
        );
        assert_eq!(SpreadsheetSource::extract_sheet_id("abc123"), "abc123");
    }

    #[test]
    fn test_parse_csv_bytes_types() {
        let csv = b"Task,Estimate,Status\nFix login,3,Done\nWrite docs,,In Progress\n";
        let sheet = parse_csv_bytes("Tasks", csv).unwrap();
        assert_eq!(sheet.header, vec!["Task", "Estimate", "Status"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0][1], CellValue::Number(3.0));
        assert_eq!(sheet.rows[1][1], CellValue::Empty);
        assert_eq!(
            sheet.rows[1][2],
            CellValue::Text("In Progress".to_string())
        );
    }

    #[test]
    fn test_parse_csv_short_rows_padded() {
        let csv = b"A,B,C\n1,2\n";
        let sheet = parse_csv_bytes("S", csv).unwrap();
        assert_eq!(sheet.rows[0].len(), 3);
        assert_eq!(sheet.rows[0][2], CellValue::Empty);
    }
}
