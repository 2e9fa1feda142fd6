pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::gateway::{GatewaySettings, GroqGateway};
pub use adapters::sheets::SpreadsheetSource;
pub use config::{CliConfig, SettingsFile};
pub use core::engine::{EngineSettings, InsightEngine};
pub use utils::error::{GatewayError, IngestError, InsightError, Result};
