use crate::core::classifier::SheetClassifier;
use crate::core::dashboard::DashboardBuilder;
use crate::core::interpreter::ColumnInterpreter;
use crate::core::question::QuestionInterpreter;
use crate::domain::model::{Answer, ColumnMapping, Concept, PipelineReport, RawSheet, RowRef};
use crate::domain::ports::{CompletionGateway, InterpreterSettings};
use crate::utils::privacy;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Snapshot of the tuning parameters for one run. Copied out of the
/// provider so spawned tasks need no borrow of it.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub confidence_threshold: f64,
    pub sample_rows: usize,
    pub prompt_char_budget: usize,
    pub concurrent_sheets: usize,
}

impl EngineSettings {
    pub fn from_provider(provider: &dyn InterpreterSettings) -> Self {
        Self {
            confidence_threshold: provider.confidence_threshold(),
            sample_rows: provider.sample_rows(),
            prompt_char_budget: provider.prompt_char_budget(),
            concurrent_sheets: provider.concurrent_sheets().max(1),
        }
    }
}

/// Orchestrates the interpretation pipeline: classify sheets, interpret
/// columns, derive the dashboard. Stateless across runs; everything it
/// produces lives in the returned report.
pub struct InsightEngine<G: CompletionGateway + 'static> {
    gateway: Arc<G>,
    settings: EngineSettings,
}

impl<G: CompletionGateway + 'static> InsightEngine<G> {
    pub fn new(gateway: Arc<G>, settings: EngineSettings) -> Self {
        Self { gateway, settings }
    }

    pub async fn run(&self, sheets: &[RawSheet]) -> PipelineReport {
        tracing::info!("🔍 Classifying {} sheets", sheets.len());
        let classifier = SheetClassifier::new(&*self.gateway, self.settings.prompt_char_budget);
        let relevances = classifier.classify(sheets).await;

        let relevant: Vec<RawSheet> = sheets
            .iter()
            .filter(|sheet| {
                relevances
                    .iter()
                    .any(|r| r.sheet_name == sheet.name && r.is_relevant)
            })
            .cloned()
            .collect();
        tracing::info!(
            "📋 {} of {} sheets judged relevant",
            relevant.len(),
            sheets.len()
        );

        let mappings = self.interpret_sheets(&relevant).await;
        tracing::info!("🧭 Interpreted {} columns", mappings.len());

        let dashboard = DashboardBuilder::build(&mappings);
        let widget_data = DashboardBuilder::compute_widget_data(&relevant, &dashboard);
        tracing::info!("📊 Dashboard has {} widgets", dashboard.widgets.len());

        PipelineReport {
            relevances,
            mappings,
            dashboard,
            widget_data,
        }
    }

    /// Column interpretation is the one legitimate parallelism point:
    /// sheets are independent and each call produces a disjoint mapping
    /// subset. Bounded to respect the model API's rate limits.
    async fn interpret_sheets(&self, sheets: &[RawSheet]) -> Vec<ColumnMapping> {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrent_sheets));
        let mut tasks: JoinSet<(usize, Vec<ColumnMapping>)> = JoinSet::new();

        for (index, sheet) in sheets.iter().cloned().enumerate() {
            let gateway = Arc::clone(&self.gateway);
            let semaphore = Arc::clone(&semaphore);
            let settings = self.settings;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let interpreter = ColumnInterpreter::new(
                    &*gateway,
                    settings.confidence_threshold,
                    settings.sample_rows,
                    settings.prompt_char_budget,
                );
                (index, interpreter.interpret(&sheet).await)
            });
        }

        let mut by_sheet: Vec<(usize, Vec<ColumnMapping>)> = Vec::with_capacity(sheets.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => by_sheet.push(entry),
                Err(e) => tracing::error!("Interpreter task panicked: {}", e),
            }
        }
        by_sheet.sort_by_key(|(index, _)| *index);
        by_sheet.into_iter().flat_map(|(_, m)| m).collect()
    }

    pub async fn answer(
        &self,
        question: &str,
        sheets: &[RawSheet],
        mappings: &[ColumnMapping],
    ) -> Answer {
        let interpreter =
            QuestionInterpreter::new(&*self.gateway, self.settings.prompt_char_budget);
        interpreter.answer(question, sheets, mappings).await
    }

    /// Restrict sheets to one user's rows. Sheets without an assignee
    /// mapping pass through whole; there is nothing to filter on.
    pub fn filter_sheets_for_user(
        &self,
        sheets: &[RawSheet],
        mappings: &[ColumnMapping],
        user_identifier: &str,
    ) -> Vec<RawSheet> {
        sheets
            .iter()
            .map(|sheet| {
                match privacy::mapping_for(mappings, &sheet.name, Concept::Assignee) {
                    Some(assignee) => {
                        let keep = privacy::filter_rows_for_user(
                            sheet,
                            assignee.column_index,
                            user_identifier,
                        );
                        RawSheet {
                            name: sheet.name.clone(),
                            header: sheet.header.clone(),
                            rows: keep.into_iter().map(|i| sheet.rows[i].clone()).collect(),
                        }
                    }
                    None => sheet.clone(),
                }
            })
            .collect()
    }

    /// Rows belonging to one user across all sheets that carry an
    /// assignee column.
    pub fn rows_for_user(
        &self,
        sheets: &[RawSheet],
        mappings: &[ColumnMapping],
        user_identifier: &str,
    ) -> Vec<RowRef> {
        let mut rows = Vec::new();
        for sheet in sheets {
            if let Some(assignee) = privacy::mapping_for(mappings, &sheet.name, Concept::Assignee)
            {
                for row_index in
                    privacy::filter_rows_for_user(sheet, assignee.column_index, user_identifier)
                {
                    rows.push(RowRef {
                        sheet_name: sheet.name.clone(),
                        row_index,
                    });
                }
            }
        }
        rows
    }
}
