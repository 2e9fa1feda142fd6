use crate::domain::model::RawSheet;
use crate::utils::error::{GatewayError, IngestError};
use async_trait::async_trait;

/// Structural description of the JSON a completion must return. The
/// gateway runs `check` before reporting success; `schema_reminder` is
/// what the repair re-prompt quotes back to the model.
pub struct OutputShape {
    pub name: &'static str,
    pub schema_reminder: &'static str,
    pub check: Box<dyn Fn(&serde_json::Value) -> Result<(), String> + Send + Sync>,
}

impl OutputShape {
    pub fn new(
        name: &'static str,
        schema_reminder: &'static str,
        check: impl Fn(&serde_json::Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            schema_reminder,
            check: Box::new(check),
        }
    }
}

pub struct CompletionRequest {
    pub system_message: String,
    pub prompt: String,
    pub shape: OutputShape,
}

/// The single narrow seam to the hosted model. One outbound call per
/// `complete`; no caching, no persistence of responses.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<serde_json::Value, GatewayError>;
}

/// Ingest port: a source string (public sheet URL or local workbook
/// path) becomes sheets. The adapter owns transport and format details.
#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn fetch(&self, source: &str) -> std::result::Result<Vec<RawSheet>, IngestError>;
}

/// Tuning parameters the pipeline reads. Thresholds and budgets are
/// configuration inputs, not hard-coded constants.
pub trait InterpreterSettings: Send + Sync {
    fn confidence_threshold(&self) -> f64;
    fn sample_rows(&self) -> usize;
    fn prompt_char_budget(&self) -> usize;
    fn concurrent_sheets(&self) -> usize;
}
