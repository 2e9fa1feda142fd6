//! Prompt assembly for the four agents. Templates are fixed strings;
//! only the sample blocks vary, and those are bounded and
//! privacy-filtered before they get here.

use crate::utils::privacy::SamplePayload;

pub const CLASSIFIER_SYSTEM: &str = "You are analyzing a spreadsheet workbook.

For every sheet listed, decide whether it is relevant for tracking work, tasks, issues, or progress. Legends, lookup tables, and unrelated data are not relevant.

Return ONLY valid JSON in this format:

{
  \"sheets\": [
    { \"name\": \"<sheet name>\", \"relevant\": true or false, \"reason\": \"short explanation\" }
  ]
}

Include one entry per sheet, in the order given. Do not guess: if a sheet does not look useful, mark relevant=false.";

pub const INTERPRETER_SYSTEM: &str = "You are interpreting one sheet of a spreadsheet used to track work.

For each column, pick the single best concept from this fixed vocabulary:
- status: progress or state of a task
- assignee: who the task belongs to
- date: creation date, due date, or any other date
- priority: importance level
- category: a grouping label with few distinct values
- numeric_metric: a number worth aggregating (counts, estimates, errors)
- free_text: titles, notes, descriptions
- unknown: none of the above fits

Return ONLY valid JSON in this format:

{
  \"columns\": [
    { \"index\": <0-based column index>, \"concept\": \"<concept>\", \"confidence\": <0.0 to 1.0> }
  ]
}

Include one entry per column, in header order. Report low confidence honestly rather than guessing.";

pub const QUESTION_SYSTEM: &str = "You are a data analyst. Answer the user's question using ONLY the rows and aggregates provided. Never invent values that are not present.

Return ONLY valid JSON in this format:

{
  \"answer\": \"<answer text>\" or null,
  \"supporting_rows\": [ { \"sheet\": \"<sheet name>\", \"row\": <0-based row index> } ],
  \"confidence\": <0.0 to 1.0>,
  \"unanswerable\": true or false
}

If the question cannot be grounded in the provided data, set unanswerable=true, answer=null and supporting_rows=[]. Otherwise list the rows the answer rests on.";

/// Render a sample block the way the model reads best:
/// one `Row N: header: value, ...` line per row.
pub fn format_sample(payload: &SamplePayload) -> String {
    if payload.rows.is_empty() {
        return "No data".to_string();
    }
    let mut lines = Vec::with_capacity(payload.rows.len());
    for (i, row) in payload.rows.iter().enumerate() {
        let cells: Vec<String> = payload
            .columns
            .iter()
            .zip(row.iter())
            .map(|(header, value)| format!("{}: {}", header, value))
            .collect();
        lines.push(format!("  Row {}: {}", i + 1, cells.join(", ")));
    }
    lines.join("\n")
}

pub fn classifier_prompt(entries: &[(String, SamplePayload)]) -> String {
    let mut blocks = Vec::with_capacity(entries.len());
    for (name, payload) in entries {
        blocks.push(format!(
            "Sheet Name: {}\nColumns: {}\nSample Rows:\n{}\nTotal Rows: {}",
            name,
            payload.columns.join(", "),
            format_sample(payload),
            payload.total_rows,
        ));
    }
    format!(
        "Analyze these sheets:\n\n{}\n\nWhich sheets are relevant for work tracking?",
        blocks.join("\n\n---\n\n")
    )
}

pub fn interpreter_prompt(sheet_name: &str, payload: &SamplePayload) -> String {
    let columns: Vec<String> = payload
        .columns
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{}: {}", i, h))
        .collect();
    format!(
        "Analyze this sheet:\n\nSheet: {}\n\nColumns (index: header):\n{}\n\nSample Rows:\n{}\n\nAssign one concept and a confidence to every column.",
        sheet_name,
        columns.join("\n"),
        format_sample(payload),
    )
}

pub fn question_prompt(question: &str, context: &str) -> String {
    format!(
        "Question: \"{}\"\n\nAvailable data:\n{}\n\nAnswer strictly from the data above.",
        question, context
    )
}

/// Repair re-prompt: quote the malformed output back with the schema
/// reminder, exactly once per call.
pub fn repair_prompt(original_prompt: &str, malformed: &str, schema_reminder: &str) -> String {
    format!(
        "{}\n\nYour previous reply did not match the required JSON shape.\n\nPrevious reply:\n{}\n\nRequired shape:\n{}\n\nReturn ONLY corrected valid JSON.",
        original_prompt, malformed, schema_reminder
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sample_pairs_headers_with_values() {
        let payload = SamplePayload {
            columns: vec!["Task".to_string(), "Status".to_string()],
            rows: vec![vec!["Fix login".to_string(), "Done".to_string()]],
            total_rows: 1,
            truncated: false,
        };
        let block = format_sample(&payload);
        assert!(block.contains("Row 1: Task: Fix login, Status: Done"));
    }

    #[test]
    fn test_format_sample_empty() {
        let payload = SamplePayload {
            columns: vec!["Task".to_string()],
            rows: vec![],
            total_rows: 0,
            truncated: false,
        };
        assert_eq!(format_sample(&payload), "No data");
    }
}
