use crate::domain::model::{
    ColumnMapping, ColumnRef, Concept, DashboardSpec, RawSheet, WidgetData, WidgetKind, WidgetSpec,
};
use crate::utils::privacy;
use chrono::{Duration, NaiveDate};
use std::collections::BTreeMap;

/// Hard cap on widget count; rule-table over-generation is trimmed by
/// priority, status and date widgets first.
const MAX_WIDGETS: usize = 8;
const MAX_CATEGORY_SLICES: usize = 12;

/// Derives the dashboard layout from the concept-mapped columns. This is
/// a deterministic rule pass, not a model call: the layout stays stable
/// and auditable across runs.
pub struct DashboardBuilder;

impl DashboardBuilder {
    pub fn build(mappings: &[ColumnMapping]) -> DashboardSpec {
        let mut widgets: Vec<(u8, WidgetSpec)> = Vec::new();

        for mapping in mappings {
            let column = ColumnRef {
                sheet_name: mapping.sheet_name.clone(),
                column_index: mapping.column_index,
            };
            match mapping.concept {
                Concept::Status => widgets.push((
                    0,
                    WidgetSpec {
                        kind: WidgetKind::CountByCategory,
                        source_columns: vec![column],
                        title: format!("Count by {}", mapping.header_text),
                    },
                )),
                Concept::Date => widgets.push((
                    1,
                    WidgetSpec {
                        kind: WidgetKind::TrendOverTime,
                        source_columns: vec![column],
                        title: format!("Trend over {}", mapping.header_text),
                    },
                )),
                Concept::Priority | Concept::Category => widgets.push((
                    2,
                    WidgetSpec {
                        kind: WidgetKind::CountByCategory,
                        source_columns: vec![column],
                        title: format!("Count by {}", mapping.header_text),
                    },
                )),
                Concept::NumericMetric => widgets.push((
                    3,
                    WidgetSpec {
                        kind: WidgetKind::MetricCard,
                        source_columns: vec![column],
                        title: format!("Total {}", mapping.header_text),
                    },
                )),
                Concept::Assignee | Concept::FreeText | Concept::Unknown => {}
            }
        }

        // assignee + status on the same sheet makes a per-person table
        for assignee in mappings.iter().filter(|m| m.concept == Concept::Assignee) {
            if let Some(status) =
                privacy::mapping_for(mappings, &assignee.sheet_name, Concept::Status)
            {
                widgets.push((
                    1,
                    WidgetSpec {
                        kind: WidgetKind::GroupedTable,
                        source_columns: vec![
                            ColumnRef {
                                sheet_name: assignee.sheet_name.clone(),
                                column_index: assignee.column_index,
                            },
                            ColumnRef {
                                sheet_name: status.sheet_name.clone(),
                                column_index: status.column_index,
                            },
                        ],
                        title: format!("{} by {}", status.header_text, assignee.header_text),
                    },
                ));
            }
        }

        widgets.sort_by_key(|(priority, _)| *priority);
        let mut widgets: Vec<WidgetSpec> = widgets.into_iter().map(|(_, w)| w).collect();
        widgets.truncate(MAX_WIDGETS);

        if widgets.is_empty() {
            // The dashboard must never render nothing: raw preview over
            // whatever columns exist, however weakly interpreted.
            let preview_columns: Vec<ColumnRef> = mappings
                .iter()
                .filter(|m| matches!(m.concept, Concept::FreeText | Concept::Unknown))
                .map(|m| ColumnRef {
                    sheet_name: m.sheet_name.clone(),
                    column_index: m.column_index,
                })
                .collect();
            widgets.push(WidgetSpec {
                kind: WidgetKind::GroupedTable,
                source_columns: preview_columns,
                title: "Raw data preview".to_string(),
            });
        }

        DashboardSpec { widgets }
    }

    /// Compute the aggregates each widget renders. Local arithmetic
    /// only; the model never sees or produces these numbers.
    pub fn compute_widget_data(sheets: &[RawSheet], spec: &DashboardSpec) -> Vec<WidgetData> {
        spec.widgets
            .iter()
            .map(|widget| {
                let series = match widget.kind {
                    WidgetKind::CountByCategory => widget
                        .source_columns
                        .first()
                        .and_then(|c| resolve_sheet(sheets, &c.sheet_name).map(|s| (s, c)))
                        .map(|(sheet, column)| {
                            privacy::top_values(sheet, column.column_index, MAX_CATEGORY_SLICES)
                                .into_iter()
                                .map(|(value, count)| (value, count as f64))
                                .collect()
                        })
                        .unwrap_or_default(),
                    WidgetKind::TrendOverTime => widget
                        .source_columns
                        .first()
                        .and_then(|c| resolve_sheet(sheets, &c.sheet_name).map(|s| (s, c)))
                        .map(|(sheet, column)| date_histogram(sheet, column.column_index))
                        .unwrap_or_default(),
                    WidgetKind::MetricCard => widget
                        .source_columns
                        .first()
                        .and_then(|c| resolve_sheet(sheets, &c.sheet_name).map(|s| (s, c)))
                        .map(|(sheet, column)| {
                            let values: Vec<f64> = sheet
                                .rows
                                .iter()
                                .filter_map(|row| row.get(column.column_index))
                                .filter_map(|cell| cell.as_number())
                                .collect();
                            vec![
                                ("sum".to_string(), values.iter().sum()),
                                ("count".to_string(), values.len() as f64),
                            ]
                        })
                        .unwrap_or_default(),
                    WidgetKind::GroupedTable => grouped_counts(sheets, &widget.source_columns),
                };
                WidgetData {
                    title: widget.title.clone(),
                    kind: widget.kind,
                    series,
                }
            })
            .collect()
    }
}

fn resolve_sheet<'a>(sheets: &'a [RawSheet], name: &str) -> Option<&'a RawSheet> {
    sheets.iter().find(|s| s.name == name)
}

/// Counts per calendar day, sorted chronologically. Unparseable cells
/// are skipped rather than bucketed into a junk category.
fn date_histogram(sheet: &RawSheet, column_index: usize) -> Vec<(String, f64)> {
    let mut buckets: BTreeMap<NaiveDate, f64> = BTreeMap::new();
    for row in &sheet.rows {
        if let Some(cell) = row.get(column_index) {
            if let Some(date) = parse_date(&cell.to_string()) {
                *buckets.entry(date).or_insert(0.0) += 1.0;
            }
        }
    }
    buckets
        .into_iter()
        .map(|(date, count)| (date.format("%Y-%m-%d").to_string(), count))
        .collect()
}

/// Best-effort date parsing: common textual formats, then Excel serial
/// numbers (days since 1899-12-30).
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    const FORMATS: [&str; 5] = ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
    for format in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    if let Ok(serial) = trimmed.parse::<f64>() {
        if (20_000.0..80_000.0).contains(&serial) {
            let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
            return epoch.checked_add_signed(Duration::days(serial as i64));
        }
    }
    None
}

fn grouped_counts(sheets: &[RawSheet], columns: &[ColumnRef]) -> Vec<(String, f64)> {
    let (Some(first), Some(second)) = (columns.first(), columns.get(1)) else {
        return Vec::new();
    };
    if first.sheet_name != second.sheet_name {
        return Vec::new();
    }
    let Some(sheet) = resolve_sheet(sheets, &first.sheet_name) else {
        return Vec::new();
    };
    let mut buckets: BTreeMap<String, f64> = BTreeMap::new();
    for row in &sheet.rows {
        let group = row
            .get(first.column_index)
            .map(|c| c.to_string())
            .unwrap_or_default();
        let value = row
            .get(second.column_index)
            .map(|c| c.to_string())
            .unwrap_or_default();
        if group.trim().is_empty() && value.trim().is_empty() {
            continue;
        }
        *buckets.entry(format!("{} / {}", group, value)).or_insert(0.0) += 1.0;
    }
    buckets.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::CellValue;

    fn mapping(
        sheet: &str,
        index: usize,
        header: &str,
        concept: Concept,
        confidence: f64,
    ) -> ColumnMapping {
        ColumnMapping {
            sheet_name: sheet.to_string(),
            column_index: index,
            header_text: header.to_string(),
            concept,
            confidence,
        }
    }

    #[test]
    fn test_rule_table_emits_expected_widgets() {
        let mappings = vec![
            mapping("Tasks", 0, "Task", Concept::FreeText, 0.9),
            mapping("Tasks", 1, "Owner", Concept::Assignee, 0.9),
            mapping("Tasks", 2, "Status", Concept::Status, 0.95),
            mapping("Tasks", 3, "Due", Concept::Date, 0.9),
        ];
        let spec = DashboardBuilder::build(&mappings);

        let kinds: Vec<WidgetKind> = spec.widgets.iter().map(|w| w.kind).collect();
        assert!(kinds.contains(&WidgetKind::CountByCategory));
        assert!(kinds.contains(&WidgetKind::TrendOverTime));
        assert!(kinds.contains(&WidgetKind::GroupedTable));

        // status widget first by priority and titled around the header
        assert_eq!(spec.widgets[0].kind, WidgetKind::CountByCategory);
        assert!(spec.widgets[0].title.contains("Status"));
        let trend = spec
            .widgets
            .iter()
            .find(|w| w.kind == WidgetKind::TrendOverTime)
            .unwrap();
        assert!(trend.title.contains("Due"));
    }

    #[test]
    fn test_no_widget_references_unknown_columns() {
        let mappings = vec![
            mapping("Tasks", 0, "Status", Concept::Status, 0.9),
            mapping("Tasks", 1, "Mystery", Concept::Unknown, 0.2),
        ];
        let spec = DashboardBuilder::build(&mappings);
        for widget in &spec.widgets {
            for column in &widget.source_columns {
                let resolved = mappings
                    .iter()
                    .find(|m| {
                        m.sheet_name == column.sheet_name && m.column_index == column.column_index
                    })
                    .unwrap();
                assert_ne!(resolved.concept, Concept::Unknown);
            }
        }
    }

    #[test]
    fn test_fallback_widget_when_nothing_mapped() {
        let mappings = vec![
            mapping("Tasks", 0, "A", Concept::Unknown, 0.1),
            mapping("Tasks", 1, "B", Concept::Unknown, 0.2),
        ];
        let spec = DashboardBuilder::build(&mappings);
        assert_eq!(spec.widgets.len(), 1);
        assert_eq!(spec.widgets[0].kind, WidgetKind::GroupedTable);
        assert_eq!(spec.widgets[0].source_columns.len(), 2);
    }

    #[test]
    fn test_dashboard_never_empty() {
        let spec = DashboardBuilder::build(&[]);
        assert!(!spec.widgets.is_empty());
    }

    #[test]
    fn test_widget_cap() {
        let mut mappings = Vec::new();
        for i in 0..12 {
            mappings.push(mapping("Tasks", i, &format!("Metric {}", i), Concept::NumericMetric, 0.9));
        }
        let spec = DashboardBuilder::build(&mappings);
        assert_eq!(spec.widgets.len(), 8);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(parse_date("2026-03-14"), Some(expected));
        assert_eq!(parse_date("14/03/2026"), Some(expected));
        assert!(parse_date("not a date").is_none());
        // Excel serial for 2024-01-01
        assert_eq!(
            parse_date("45292"),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
    }

    #[test]
    fn test_count_by_category_aggregation() {
        let sheet = RawSheet {
            name: "Tasks".to_string(),
            header: vec!["Status".to_string()],
            rows: vec![
                vec![CellValue::Text("Done".to_string())],
                vec![CellValue::Text("Done".to_string())],
                vec![CellValue::Text("In Progress".to_string())],
            ],
        };
        let mappings = vec![mapping("Tasks", 0, "Status", Concept::Status, 0.9)];
        let spec = DashboardBuilder::build(&mappings);
        let data = DashboardBuilder::compute_widget_data(&[sheet], &spec);
        assert_eq!(data[0].series[0], ("Done".to_string(), 2.0));
    }
}
