use crate::core::prompt;
use crate::domain::model::{RawSheet, SheetRelevance};
use crate::domain::ports::{CompletionGateway, CompletionRequest, OutputShape};
use crate::utils::privacy;

/// Relevance sample stays small: sheet name, headers, first few rows.
const CLASSIFIER_SAMPLE_ROWS: usize = 3;

/// Decides which sheets are worth interpreting. One batched gateway call
/// for all non-empty sheets; empty sheets never reach the model.
pub struct SheetClassifier<'a, G: CompletionGateway> {
    gateway: &'a G,
    prompt_char_budget: usize,
}

impl<'a, G: CompletionGateway> SheetClassifier<'a, G> {
    pub fn new(gateway: &'a G, prompt_char_budget: usize) -> Self {
        Self {
            gateway,
            prompt_char_budget,
        }
    }

    pub async fn classify(&self, sheets: &[RawSheet]) -> Vec<SheetRelevance> {
        let mut verdicts: Vec<Option<SheetRelevance>> = vec![None; sheets.len()];
        let mut undecided: Vec<(usize, &RawSheet)> = Vec::new();

        for (i, sheet) in sheets.iter().enumerate() {
            if sheet.data_row_count() == 0 {
                tracing::debug!("Sheet '{}' has no data rows, skipping model call", sheet.name);
                verdicts[i] = Some(SheetRelevance {
                    sheet_name: sheet.name.clone(),
                    is_relevant: false,
                    reason: "sheet contains no data rows".to_string(),
                });
            } else {
                undecided.push((i, sheet));
            }
        }

        if !undecided.is_empty() {
            match self.classify_batch(&undecided).await {
                Ok(batch) => {
                    for ((i, _), verdict) in undecided.iter().zip(batch) {
                        verdicts[*i] = Some(verdict);
                    }
                }
                Err(e) => {
                    // Fail-open: downstream tolerates noisy sheets, not a dead pipeline
                    tracing::warn!("Sheet classification failed ({}), keeping all sheets", e);
                    for (i, sheet) in &undecided {
                        verdicts[*i] = Some(SheetRelevance {
                            sheet_name: sheet.name.clone(),
                            is_relevant: true,
                            reason: "classifier unavailable, kept by fail-open policy".to_string(),
                        });
                    }
                }
            }
        }

        verdicts.into_iter().flatten().collect()
    }

    async fn classify_batch(
        &self,
        sheets: &[(usize, &RawSheet)],
    ) -> std::result::Result<Vec<SheetRelevance>, crate::utils::error::GatewayError> {
        let per_sheet_budget = self.prompt_char_budget / sheets.len().max(1);
        let entries: Vec<(String, privacy::SamplePayload)> = sheets
            .iter()
            .map(|(_, sheet)| {
                (
                    sheet.name.clone(),
                    privacy::prepare_for_model(sheet, CLASSIFIER_SAMPLE_ROWS, per_sheet_budget),
                )
            })
            .collect();

        if entries.iter().any(|(_, p)| p.truncated) {
            tracing::debug!("Classifier sample truncated to fit the prompt budget");
        }

        let expected = sheets.len();
        let shape = OutputShape::new(
            "sheet_relevance",
            "{ \"sheets\": [ { \"name\": string, \"relevant\": boolean, \"reason\": string } ] }",
            move |value| {
                let items = value
                    .get("sheets")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| "missing 'sheets' array".to_string())?;
                if items.len() != expected {
                    return Err(format!("expected {} entries, got {}", expected, items.len()));
                }
                for item in items {
                    if item.get("name").and_then(|v| v.as_str()).is_none() {
                        return Err("entry missing string 'name'".to_string());
                    }
                    if item.get("relevant").and_then(|v| v.as_bool()).is_none() {
                        return Err("entry missing boolean 'relevant'".to_string());
                    }
                }
                Ok(())
            },
        );

        let output = self
            .gateway
            .complete(CompletionRequest {
                system_message: prompt::CLASSIFIER_SYSTEM.to_string(),
                prompt: prompt::classifier_prompt(&entries),
                shape,
            })
            .await?;

        let items = output["sheets"].as_array().cloned().unwrap_or_default();
        let verdicts = sheets
            .iter()
            .map(|(_, sheet)| {
                let found = items.iter().find(|item| {
                    item.get("name").and_then(|v| v.as_str()) == Some(sheet.name.as_str())
                });
                match found {
                    Some(item) => SheetRelevance {
                        sheet_name: sheet.name.clone(),
                        is_relevant: item["relevant"].as_bool().unwrap_or(true),
                        reason: item
                            .get("reason")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string(),
                    },
                    // No verdict for this sheet: same fail-open stance as a whole-call failure
                    None => SheetRelevance {
                        sheet_name: sheet.name.clone(),
                        is_relevant: true,
                        reason: "no verdict returned, kept by fail-open policy".to_string(),
                    },
                }
            })
            .collect();

        Ok(verdicts)
    }
}
