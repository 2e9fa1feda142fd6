use crate::domain::model::{ColumnMapping, Concept, RawSheet};
use std::collections::HashMap;

pub const MASKED: &str = "***MASKED***";

const PII_KEYWORDS: [&str; 5] = ["email", "phone", "ssn", "password", "address"];

/// Minimal, privacy-filtered slice of a sheet, safe to hand to the
/// model: bounded row count, PII columns masked, whole rows only.
#[derive(Debug, Clone)]
pub struct SamplePayload {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: usize,
    pub truncated: bool,
}

pub fn is_pii_header(header: &str) -> bool {
    let lower = header.to_lowercase();
    PII_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// Prepare a bounded sample for the model. Rows past `max_rows` are
/// never sent; `char_budget` drops further rows whole from the end,
/// never mid-record.
pub fn prepare_for_model(sheet: &RawSheet, max_rows: usize, char_budget: usize) -> SamplePayload {
    let masked: Vec<bool> = sheet.header.iter().map(|h| is_pii_header(h)).collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut spent = sheet.header.iter().map(|h| h.len() + 2).sum::<usize>();
    let mut truncated = sheet.rows.len() > max_rows;

    for row in sheet.rows.iter().take(max_rows) {
        let rendered: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                if masked.get(i).copied().unwrap_or(false) && !cell.is_empty() {
                    MASKED.to_string()
                } else {
                    cell.to_string()
                }
            })
            .collect();

        let cost: usize = rendered.iter().map(|c| c.len() + 2).sum();
        if spent + cost > char_budget && !rows.is_empty() {
            truncated = true;
            break;
        }
        spent += cost;
        rows.push(rendered);
    }

    SamplePayload {
        columns: sheet.header.clone(),
        rows,
        total_rows: sheet.data_row_count(),
        truncated,
    }
}

/// Indices of rows belonging to one user, by case-insensitive substring
/// match on the assignee column.
pub fn filter_rows_for_user(
    sheet: &RawSheet,
    assignee_column: usize,
    user_identifier: &str,
) -> Vec<usize> {
    let needle = user_identifier.to_lowercase();
    sheet
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| {
            row.get(assignee_column)
                .map(|cell| cell.to_string().to_lowercase().contains(&needle))
                .unwrap_or(false)
        })
        .map(|(i, _)| i)
        .collect()
}

/// Value counts for one column, most frequent first. Aggregates are safe
/// to share with the model; raw cells may not be.
pub fn top_values(sheet: &RawSheet, column_index: usize, limit: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in &sheet.rows {
        if let Some(cell) = row.get(column_index) {
            if !cell.is_empty() {
                *counts.entry(cell.to_string()).or_insert(0) += 1;
            }
        }
    }
    let mut pairs: Vec<(String, usize)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs.truncate(limit);
    pairs
}

/// Find the first mapping for a concept on a given sheet.
pub fn mapping_for<'a>(
    mappings: &'a [ColumnMapping],
    sheet_name: &str,
    concept: Concept,
) -> Option<&'a ColumnMapping> {
    mappings
        .iter()
        .find(|m| m.sheet_name == sheet_name && m.concept == concept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::CellValue;

    fn sheet() -> RawSheet {
        RawSheet {
            name: "Tasks".to_string(),
            header: vec![
                "Task".to_string(),
                "Owner Email".to_string(),
                "Status".to_string(),
            ],
            rows: vec![
                vec![
                    CellValue::Text("Fix login".to_string()),
                    CellValue::Text("alice@example.com".to_string()),
                    CellValue::Text("Done".to_string()),
                ],
                vec![
                    CellValue::Text("Write docs".to_string()),
                    CellValue::Text("bob@example.com".to_string()),
                    CellValue::Text("In Progress".to_string()),
                ],
                vec![
                    CellValue::Text("Ship v2".to_string()),
                    CellValue::Text("alice@example.com".to_string()),
                    CellValue::Text("In Progress".to_string()),
                ],
            ],
        }
    }

    #[test]
    fn test_pii_columns_are_masked() {
        let payload = prepare_for_model(&sheet(), 10, 10_000);
        assert_eq!(payload.rows.len(), 3);
        for row in &payload.rows {
            assert_eq!(row[1], MASKED);
        }
        // non-PII columns pass through
        assert_eq!(payload.rows[0][0], "Fix login");
    }

    #[test]
    fn test_row_cap_marks_truncation() {
        let payload = prepare_for_model(&sheet(), 2, 10_000);
        assert_eq!(payload.rows.len(), 2);
        assert!(payload.truncated);
        assert_eq!(payload.total_rows, 3);
    }

    #[test]
    fn test_char_budget_drops_whole_rows() {
        // Budget fits the header and first row only
        let payload = prepare_for_model(&sheet(), 10, 80);
        assert!(payload.truncated);
        assert!(!payload.rows.is_empty());
        for row in &payload.rows {
            assert_eq!(row.len(), 3); // never a partial record
        }
    }

    #[test]
    fn test_filter_rows_for_user() {
        let rows = filter_rows_for_user(&sheet(), 1, "Alice");
        assert_eq!(rows, vec![0, 2]);
    }

    #[test]
    fn test_top_values() {
        let values = top_values(&sheet(), 2, 5);
        assert_eq!(values[0], ("In Progress".to_string(), 2));
        assert_eq!(values[1], ("Done".to_string(), 1));
    }
}
