pub mod classifier;
pub mod dashboard;
pub mod engine;
pub mod interpreter;
pub mod prompt;
pub mod question;

pub use crate::domain::model::{
    Answer, CellValue, ColumnMapping, Concept, DashboardSpec, PipelineReport, RawSheet, RowRef,
    SheetRelevance, WidgetData, WidgetKind, WidgetSpec,
};
pub use crate::domain::ports::{
    CompletionGateway, CompletionRequest, InterpreterSettings, OutputShape, SheetSource,
};
pub use crate::utils::error::Result;
