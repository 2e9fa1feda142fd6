use crate::core::prompt;
use crate::domain::model::{Answer, ColumnMapping, Concept, RawSheet, RowRef};
use crate::domain::ports::{CompletionGateway, CompletionRequest, OutputShape};
use crate::utils::privacy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

const MAX_MATCHING_ROWS: usize = 10;
const MAX_DISTINCT_VALUES: usize = 20;

fn pending_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)pending|in.?progress|ongoing|todo|open").unwrap())
}

fn completed_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)completed|done|finished|closed").unwrap())
}

const STOPWORDS: [&str; 20] = [
    "the", "and", "for", "are", "is", "how", "many", "much", "what", "which", "who", "when",
    "where", "why", "all", "any", "with", "have", "has", "was",
];

/// Answers free-form questions, grounded strictly in the rows and
/// aggregates handed to the model. Gateway failure falls back to a
/// locally computed answer; the user always gets an Answer object.
pub struct QuestionInterpreter<'a, G: CompletionGateway> {
    gateway: &'a G,
    prompt_char_budget: usize,
}

struct QuestionContext {
    text: String,
    matching_rows: Vec<RowRef>,
    status_breakdown: Vec<(String, usize)>,
    total_rows: usize,
}

impl<'a, G: CompletionGateway> QuestionInterpreter<'a, G> {
    pub fn new(gateway: &'a G, prompt_char_budget: usize) -> Self {
        Self {
            gateway,
            prompt_char_budget,
        }
    }

    pub async fn answer(
        &self,
        question: &str,
        sheets: &[RawSheet],
        mappings: &[ColumnMapping],
    ) -> Answer {
        let context = self.extract_context(question, sheets, mappings);

        match self.ask_model(question, sheets, &context).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Question answering failed ({}), using local fallback", e);
                self.fallback_answer(question, &context)
            }
        }
    }

    /// Pull the data the question is actually about: term-matched rows,
    /// status breakdown, distinct values per mapped concept. Mirrors
    /// what a careful analyst would gather before answering.
    fn extract_context(
        &self,
        question: &str,
        sheets: &[RawSheet],
        mappings: &[ColumnMapping],
    ) -> QuestionContext {
        let terms: Vec<String> = question
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
            .map(|t| t.to_string())
            .collect();

        let mut matching_rows: Vec<RowRef> = Vec::new();
        for sheet in sheets {
            for (row_index, row) in sheet.rows.iter().enumerate() {
                let hit = row.iter().any(|cell| {
                    let text = cell.to_string().to_lowercase();
                    terms.iter().any(|t| text.contains(t.as_str()))
                });
                if hit {
                    matching_rows.push(RowRef {
                        sheet_name: sheet.name.clone(),
                        row_index,
                    });
                }
            }
        }

        let mut lines: Vec<String> = Vec::new();
        let total_rows: usize = sheets.iter().map(|s| s.data_row_count()).sum();
        lines.push(format!("Total rows across sheets: {}", total_rows));

        let mut status_breakdown: Vec<(String, usize)> = Vec::new();
        for sheet in sheets {
            if let Some(status) = privacy::mapping_for(mappings, &sheet.name, Concept::Status) {
                status_breakdown = privacy::top_values(sheet, status.column_index, MAX_DISTINCT_VALUES);
                let rendered: Vec<String> = status_breakdown
                    .iter()
                    .map(|(value, count)| format!("{}: {}", value, count))
                    .collect();
                lines.push(format!(
                    "Status breakdown for '{}': {}",
                    sheet.name,
                    rendered.join(", ")
                ));
            }
            for mapping in mappings
                .iter()
                .filter(|m| m.sheet_name == sheet.name && m.concept != Concept::Unknown)
            {
                let values: Vec<String> =
                    privacy::top_values(sheet, mapping.column_index, MAX_DISTINCT_VALUES)
                        .into_iter()
                        .map(|(value, _)| value)
                        .collect();
                lines.push(format!(
                    "Distinct values of {} '{}' ({}): {}",
                    mapping.concept.as_str(),
                    mapping.header_text,
                    sheet.name,
                    values.join(", ")
                ));
            }
        }

        if !terms.is_empty() {
            lines.push(format!(
                "Rows matching [{}]: {}",
                terms.join(", "),
                matching_rows.len()
            ));
            for row_ref in matching_rows.iter().take(MAX_MATCHING_ROWS) {
                if let Some(sheet) = sheets.iter().find(|s| s.name == row_ref.sheet_name) {
                    let cells: Vec<String> = sheet.header.iter().zip(
                        sheet.rows[row_ref.row_index].iter(),
                    )
                    .map(|(header, cell)| {
                        if privacy::is_pii_header(header) && !cell.is_empty() {
                            format!("{}: {}", header, privacy::MASKED)
                        } else {
                            format!("{}: {}", header, cell)
                        }
                    })
                    .collect();
                    lines.push(format!(
                        "  {} row {}: {}",
                        row_ref.sheet_name,
                        row_ref.row_index,
                        cells.join(", ")
                    ));
                }
            }
        }

        let mut text = lines.join("\n");
        if text.len() > self.prompt_char_budget {
            // drop trailing lines whole until the budget fits
            while text.len() > self.prompt_char_budget {
                match text.rfind('\n') {
                    Some(pos) => text.truncate(pos),
                    None => break,
                }
            }
            tracing::debug!("Question context truncated to fit the prompt budget");
        }

        QuestionContext {
            text,
            matching_rows,
            status_breakdown,
            total_rows,
        }
    }

    async fn ask_model(
        &self,
        question: &str,
        sheets: &[RawSheet],
        context: &QuestionContext,
    ) -> std::result::Result<Answer, crate::utils::error::GatewayError> {
        let row_counts: HashMap<String, usize> = sheets
            .iter()
            .map(|s| (s.name.clone(), s.rows.len()))
            .collect();

        let shape = OutputShape::new(
            "grounded_answer",
            "{ \"answer\": string or null, \"supporting_rows\": [ { \"sheet\": string, \"row\": integer } ], \"confidence\": number, \"unanswerable\": boolean }",
            move |value| {
                let unanswerable = value
                    .get("unanswerable")
                    .and_then(|v| v.as_bool())
                    .ok_or_else(|| "missing boolean 'unanswerable'".to_string())?;
                if value.get("confidence").and_then(|v| v.as_f64()).is_none() {
                    return Err("missing numeric 'confidence'".to_string());
                }
                let rows = value
                    .get("supporting_rows")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| "missing 'supporting_rows' array".to_string())?;
                // Out-of-bounds row references are malformed output, not
                // a tolerable approximation.
                for entry in rows {
                    let sheet = entry
                        .get("sheet")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| "supporting row missing string 'sheet'".to_string())?;
                    let row = entry
                        .get("row")
                        .and_then(|v| v.as_u64())
                        .ok_or_else(|| "supporting row missing integer 'row'".to_string())?;
                    let count = row_counts
                        .get(sheet)
                        .ok_or_else(|| format!("unknown sheet '{}' in supporting_rows", sheet))?;
                    if row as usize >= *count {
                        return Err(format!(
                            "row {} out of bounds for sheet '{}' ({} rows)",
                            row, sheet, count
                        ));
                    }
                }
                if unanswerable != rows.is_empty() {
                    return Err(
                        "unanswerable must be true exactly when supporting_rows is empty"
                            .to_string(),
                    );
                }
                Ok(())
            },
        );

        let output = self
            .gateway
            .complete(CompletionRequest {
                system_message: prompt::QUESTION_SYSTEM.to_string(),
                prompt: prompt::question_prompt(question, &context.text),
                shape,
            })
            .await?;

        let supporting_rows: Vec<RowRef> = output["supporting_rows"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter_map(|entry| {
                        Some(RowRef {
                            sheet_name: entry.get("sheet")?.as_str()?.to_string(),
                            row_index: entry.get("row")?.as_u64()? as usize,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        // the invariant holds even if the model drifted: no rows, no answer
        let unanswerable = supporting_rows.is_empty();
        Ok(Answer {
            question_text: question.to_string(),
            grounded_value: if unanswerable {
                None
            } else {
                output["answer"].as_str().map(|s| s.to_string())
            },
            supporting_rows,
            confidence: output["confidence"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0),
            unanswerable,
        })
    }

    /// Local answer from aggregates when the model is unreachable.
    fn fallback_answer(&self, question: &str, context: &QuestionContext) -> Answer {
        let q = question.to_lowercase();

        let from_breakdown = |pattern: &Regex, label: &str| -> Option<String> {
            if context.status_breakdown.is_empty() {
                return None;
            }
            let count: usize = context
                .status_breakdown
                .iter()
                .filter(|(value, _)| pattern.is_match(value))
                .map(|(_, count)| count)
                .sum();
            Some(format!(
                "{} {} rows out of {} total",
                count, label, context.total_rows
            ))
        };

        let grounded_value = if q.contains("pending") || q.contains("progress") || q.contains("open")
        {
            from_breakdown(pending_pattern(), "pending")
        } else if q.contains("completed") || q.contains("done") || q.contains("finished") {
            from_breakdown(completed_pattern(), "completed")
        } else if !context.matching_rows.is_empty() {
            Some(format!(
                "{} rows match the question terms",
                context.matching_rows.len()
            ))
        } else {
            None
        };

        let supporting_rows: Vec<RowRef> = if grounded_value.is_some() {
            context
                .matching_rows
                .iter()
                .take(MAX_MATCHING_ROWS)
                .cloned()
                .collect()
        } else {
            Vec::new()
        };

        let unanswerable = supporting_rows.is_empty();
        Answer {
            question_text: question.to_string(),
            grounded_value: if unanswerable { None } else { grounded_value },
            supporting_rows,
            confidence: if unanswerable { 0.0 } else { 0.3 },
            unanswerable,
        }
    }
}
