use crate::domain::ports::InterpreterSettings;
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_range, validate_url, Validate,
};
use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "sheet-insight")]
#[command(about = "Schema-agnostic dashboards and Q&A over arbitrary spreadsheets")]
pub struct CliConfig {
    /// Public Google Sheets URL or a local .xlsx/.csv file
    #[arg(long)]
    pub source: String,

    /// Free-form question to answer after the pipeline runs
    #[arg(long)]
    pub question: Option<String>,

    /// Restrict the Q&A view to one user's rows (matched on the assignee column)
    #[arg(long)]
    pub user: Option<String>,

    /// Optional TOML settings file overriding the defaults below
    #[arg(long)]
    pub settings: Option<String>,

    #[arg(long, default_value = "0.5")]
    pub confidence_threshold: f64,

    #[arg(long, default_value = "5")]
    pub sample_rows: usize,

    #[arg(long, default_value = "3")]
    pub concurrent_sheets: usize,

    #[arg(long, default_value = "6000")]
    pub prompt_char_budget: usize,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl InterpreterSettings for CliConfig {
    fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    fn sample_rows(&self) -> usize {
        self.sample_rows
    }

    fn prompt_char_budget(&self) -> usize {
        self.prompt_char_budget
    }

    fn concurrent_sheets(&self) -> usize {
        self.concurrent_sheets
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("source", &self.source)?;
        if self.source.starts_with("http") {
            validate_url("source", &self.source)?;
        }
        validate_range("confidence_threshold", self.confidence_threshold, 0.0, 1.0)?;
        validate_positive_number("sample_rows", self.sample_rows, 1)?;
        validate_positive_number("concurrent_sheets", self.concurrent_sheets, 1)?;
        validate_positive_number("prompt_char_budget", self.prompt_char_budget, 500)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CliConfig {
        CliConfig {
            source: "tasks.xlsx".to_string(),
            question: None,
            user: None,
            settings: None,
            confidence_threshold: 0.5,
            sample_rows: 5,
            concurrent_sheets: 3,
            prompt_char_budget: 6000,
            verbose: false,
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut c = config();
        c.confidence_threshold = 1.5;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_bad_url_source() {
        let mut c = config();
        c.source = "http://".to_string();
        assert!(c.validate().is_err());
    }
}
