use crate::core::prompt;
use crate::domain::model::{ColumnMapping, Concept, RawSheet};
use crate::domain::ports::{CompletionGateway, CompletionRequest, OutputShape};
use crate::utils::error::GatewayError;
use crate::utils::privacy;
use regex::Regex;
use std::sync::OnceLock;

/// Headers like "Column3" or "Unnamed: 2" carry no semantics; samples
/// alone cannot be trusted to supply them.
fn positional_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(column|unnamed|field|col)[\s_:.\-]*\d*$").unwrap())
}

pub fn is_untrusted_header(header: &str) -> bool {
    let trimmed = header.trim();
    trimmed.is_empty() || positional_header().is_match(trimmed)
}

/// Maps every column of one relevant sheet to a concept with a
/// confidence. One gateway call per sheet; failure degrades the whole
/// sheet to Unknown instead of killing the pipeline.
pub struct ColumnInterpreter<'a, G: CompletionGateway> {
    gateway: &'a G,
    confidence_threshold: f64,
    sample_rows: usize,
    prompt_char_budget: usize,
}

impl<'a, G: CompletionGateway> ColumnInterpreter<'a, G> {
    pub fn new(
        gateway: &'a G,
        confidence_threshold: f64,
        sample_rows: usize,
        prompt_char_budget: usize,
    ) -> Self {
        Self {
            gateway,
            confidence_threshold,
            sample_rows,
            prompt_char_budget,
        }
    }

    pub async fn interpret(&self, sheet: &RawSheet) -> Vec<ColumnMapping> {
        match self.interpret_inner(sheet).await {
            Ok(mappings) => mappings,
            Err(e) => {
                tracing::warn!(
                    "Column interpretation failed for sheet '{}' ({}), degrading to unknown",
                    sheet.name,
                    e
                );
                self.all_unknown(sheet)
            }
        }
    }

    fn all_unknown(&self, sheet: &RawSheet) -> Vec<ColumnMapping> {
        sheet
            .header
            .iter()
            .enumerate()
            .map(|(i, header)| ColumnMapping {
                sheet_name: sheet.name.clone(),
                column_index: i,
                header_text: header.clone(),
                concept: Concept::Unknown,
                confidence: 0.0,
            })
            .collect()
    }

    async fn interpret_inner(
        &self,
        sheet: &RawSheet,
    ) -> std::result::Result<Vec<ColumnMapping>, GatewayError> {
        let payload = privacy::prepare_for_model(sheet, self.sample_rows, self.prompt_char_budget);
        if payload.truncated {
            tracing::debug!(
                "Sample for sheet '{}' truncated to fit the prompt budget",
                sheet.name
            );
        }

        let column_count = sheet.column_count();
        let shape = OutputShape::new(
            "column_concepts",
            "{ \"columns\": [ { \"index\": integer, \"concept\": string, \"confidence\": number } ] }",
            move |value| {
                let items = value
                    .get("columns")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| "missing 'columns' array".to_string())?;
                if items.is_empty() {
                    return Err("'columns' is empty".to_string());
                }
                for item in items {
                    let index = item
                        .get("index")
                        .and_then(|v| v.as_u64())
                        .ok_or_else(|| "entry missing integer 'index'".to_string())?;
                    if index as usize >= column_count {
                        return Err(format!(
                            "column index {} out of range ({} columns)",
                            index, column_count
                        ));
                    }
                    if item.get("concept").and_then(|v| v.as_str()).is_none() {
                        return Err("entry missing string 'concept'".to_string());
                    }
                    if item.get("confidence").and_then(|v| v.as_f64()).is_none() {
                        return Err("entry missing numeric 'confidence'".to_string());
                    }
                }
                Ok(())
            },
        );

        let output = self
            .gateway
            .complete(CompletionRequest {
                system_message: prompt::INTERPRETER_SYSTEM.to_string(),
                prompt: prompt::interpreter_prompt(&sheet.name, &payload),
                shape,
            })
            .await?;

        let items = output["columns"].as_array().cloned().unwrap_or_default();

        // One candidate per column. Duplicate indices are tie-broken by
        // confidence, then by concept specificity (date > status > ...).
        let mut candidates: Vec<Option<(Concept, f64)>> = vec![None; column_count];
        for item in &items {
            let index = item["index"].as_u64().unwrap_or(0) as usize;
            let raw_confidence = item["confidence"].as_f64().unwrap_or(0.0);
            let concept = item["concept"]
                .as_str()
                .and_then(Concept::parse)
                .unwrap_or(Concept::Unknown);

            if !(0.0..=1.0).contains(&raw_confidence) {
                tracing::warn!(
                    "Validation error: confidence {} out of range for column {} of '{}', clamping",
                    raw_confidence,
                    index,
                    sheet.name
                );
            }
            let confidence = raw_confidence.clamp(0.0, 1.0);

            let replace = match candidates[index] {
                None => true,
                Some((current, current_confidence)) => {
                    confidence > current_confidence
                        || (confidence == current_confidence
                            && concept.specificity() > current.specificity())
                }
            };
            if replace {
                candidates[index] = Some((concept, confidence));
            }
        }

        let mappings = sheet
            .header
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let (mut concept, confidence) = candidates[i].unwrap_or((Concept::Unknown, 0.0));
                if is_untrusted_header(header) {
                    concept = Concept::Unknown;
                } else if confidence < self.confidence_threshold {
                    // Never silently coerce a weak guess into a concept
                    concept = Concept::Unknown;
                }
                ColumnMapping {
                    sheet_name: sheet.name.clone(),
                    column_index: i,
                    header_text: header.clone(),
                    concept,
                    confidence,
                }
            })
            .collect();

        Ok(mappings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untrusted_headers() {
        assert!(is_untrusted_header(""));
        assert!(is_untrusted_header("   "));
        assert!(is_untrusted_header("Column3"));
        assert!(is_untrusted_header("column 12"));
        assert!(is_untrusted_header("Unnamed: 2"));
        assert!(!is_untrusted_header("Status"));
        assert!(!is_untrusted_header("Due Date"));
    }
}
