use serde::{Deserialize, Serialize};

/// A single cell as it arrives from the source. The source format gives
/// no type guarantees, so everything beyond "text or number" stays text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Empty,
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse().ok(),
            CellValue::Empty => None,
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Empty => Ok(()),
        }
    }
}

/// One sheet as ingested: header row plus data rows. Immutable after
/// ingest; every downstream stage only reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl RawSheet {
    /// Rows that contain at least one non-empty cell.
    pub fn data_row_count(&self) -> usize {
        self.rows
            .iter()
            .filter(|row| row.iter().any(|cell| !cell.is_empty()))
            .count()
    }

    pub fn column_count(&self) -> usize {
        self.header.len()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetRelevance {
    pub sheet_name: String,
    pub is_relevant: bool,
    pub reason: String,
}

/// Closed vocabulary of column roles. The model proposes a tag, but the
/// rest of the system only ever sees this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concept {
    Status,
    Assignee,
    Date,
    Priority,
    Category,
    NumericMetric,
    FreeText,
    Unknown,
}

impl Concept {
    pub fn parse(tag: &str) -> Option<Concept> {
        match tag.trim().to_lowercase().as_str() {
            "status" => Some(Concept::Status),
            "assignee" | "owner" => Some(Concept::Assignee),
            "date" | "due_date" | "duedate" => Some(Concept::Date),
            "priority" => Some(Concept::Priority),
            "category" => Some(Concept::Category),
            "numeric_metric" | "numericmetric" | "metric" | "number" => {
                Some(Concept::NumericMetric)
            }
            "free_text" | "freetext" | "text" | "notes" => Some(Concept::FreeText),
            "unknown" | "none" => Some(Concept::Unknown),
            _ => None,
        }
    }

    /// Tie-break priority: more specific concepts win when two are
    /// equally plausible. Higher is more specific.
    pub fn specificity(&self) -> u8 {
        match self {
            Concept::Date => 7,
            Concept::Status => 6,
            Concept::Priority => 5,
            Concept::Assignee => 4,
            Concept::Category => 3,
            Concept::NumericMetric => 2,
            Concept::FreeText => 1,
            Concept::Unknown => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Concept::Status => "status",
            Concept::Assignee => "assignee",
            Concept::Date => "date",
            Concept::Priority => "priority",
            Concept::Category => "category",
            Concept::NumericMetric => "numeric_metric",
            Concept::FreeText => "free_text",
            Concept::Unknown => "unknown",
        }
    }
}

/// Semantic interpretation of one column of one sheet.
/// Invariant: confidence in [0,1]; concept is Unknown whenever the
/// confidence fell below the configured threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub sheet_name: String,
    pub column_index: usize,
    pub header_text: String,
    pub concept: Concept,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetKind {
    CountByCategory,
    TrendOverTime,
    GroupedTable,
    MetricCard,
}

/// Reference into the ColumnMapping set; resolvable by (sheet, index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub sheet_name: String,
    pub column_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetSpec {
    pub kind: WidgetKind,
    pub source_columns: Vec<ColumnRef>,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSpec {
    pub widgets: Vec<WidgetSpec>,
}

/// Aggregated values for one widget, computed locally from rows. The
/// rendering layer consumes these as-is; no model call is involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetData {
    pub title: String,
    pub kind: WidgetKind,
    pub series: Vec<(String, f64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRef {
    pub sheet_name: String,
    pub row_index: usize,
}

/// A grounded answer. `unanswerable` is a valid outcome, not an error;
/// it holds exactly when `supporting_rows` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question_text: String,
    pub grounded_value: Option<String>,
    pub supporting_rows: Vec<RowRef>,
    pub confidence: f64,
    pub unanswerable: bool,
}

/// Everything one pipeline run produces. Dropped at session end; nothing
/// is persisted anywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub relevances: Vec<SheetRelevance>,
    pub mappings: Vec<ColumnMapping>,
    pub dashboard: DashboardSpec,
    pub widget_data: Vec<WidgetData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concept_parse_aliases() {
        assert_eq!(Concept::parse("Status"), Some(Concept::Status));
        assert_eq!(Concept::parse("owner"), Some(Concept::Assignee));
        assert_eq!(Concept::parse("due_date"), Some(Concept::Date));
        assert_eq!(Concept::parse("none"), Some(Concept::Unknown));
        assert_eq!(Concept::parse("banana"), None);
    }

    #[test]
    fn test_specificity_order() {
        // date > status > priority > assignee > category > numeric > free text > unknown
        let order = [
            Concept::Date,
            Concept::Status,
            Concept::Priority,
            Concept::Assignee,
            Concept::Category,
            Concept::NumericMetric,
            Concept::FreeText,
            Concept::Unknown,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].specificity() > pair[1].specificity());
        }
    }

    #[test]
    fn test_data_row_count_skips_blank_rows() {
        let sheet = RawSheet {
            name: "Tasks".to_string(),
            header: vec!["Task".to_string(), "Status".to_string()],
            rows: vec![
                vec![
                    CellValue::Text("Fix login".to_string()),
                    CellValue::Text("Done".to_string()),
                ],
                vec![CellValue::Empty, CellValue::Text("  ".to_string())],
            ],
        };
        assert_eq!(sheet.data_row_count(), 1);
    }
}
