use crate::adapters::gateway::GatewaySettings;
use crate::config::cli::CliConfig;
use crate::utils::error::{InsightError, Result};
use crate::utils::validation::{validate_range, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Optional TOML settings file. Anything present overrides the CLI
/// defaults; anything absent keeps them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    pub pipeline: Option<PipelineSection>,
    pub gateway: Option<GatewaySection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSection {
    pub confidence_threshold: Option<f64>,
    pub sample_rows: Option<usize>,
    pub concurrent_sheets: Option<usize>,
    pub prompt_char_budget: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewaySection {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
}

impl SettingsFile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let settings: SettingsFile =
            toml::from_str(&content).map_err(|e| InsightError::ConfigError {
                message: format!("cannot parse settings file: {}", e),
            })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_to(&self, config: &mut CliConfig) {
        if let Some(pipeline) = &self.pipeline {
            if let Some(v) = pipeline.confidence_threshold {
                config.confidence_threshold = v;
            }
            if let Some(v) = pipeline.sample_rows {
                config.sample_rows = v;
            }
            if let Some(v) = pipeline.concurrent_sheets {
                config.concurrent_sheets = v;
            }
            if let Some(v) = pipeline.prompt_char_budget {
                config.prompt_char_budget = v;
            }
        }
    }

    pub fn apply_to_gateway(&self, settings: &mut GatewaySettings) {
        if let Some(gateway) = &self.gateway {
            if let Some(v) = &gateway.model {
                settings.model = v.clone();
            }
            if let Some(v) = &gateway.base_url {
                settings.base_url = v.clone();
            }
            if let Some(v) = gateway.timeout_seconds {
                settings.timeout_seconds = v;
            }
            if let Some(v) = gateway.max_retries {
                settings.max_retries = v;
            }
        }
    }
}

impl Validate for SettingsFile {
    fn validate(&self) -> Result<()> {
        if let Some(pipeline) = &self.pipeline {
            if let Some(threshold) = pipeline.confidence_threshold {
                validate_range("confidence_threshold", threshold, 0.0, 1.0)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_override() {
        let settings: SettingsFile = toml::from_str(
            r#"
            [pipeline]
            confidence_threshold = 0.7
            "#,
        )
        .unwrap();
        let mut config = CliConfig {
            source: "tasks.xlsx".to_string(),
            question: None,
            user: None,
            settings: None,
            confidence_threshold: 0.5,
            sample_rows: 5,
            concurrent_sheets: 3,
            prompt_char_budget: 6000,
            verbose: false,
        };
        settings.apply_to(&mut config);
        assert_eq!(config.confidence_threshold, 0.7);
        assert_eq!(config.sample_rows, 5);
    }

    #[test]
    fn test_threshold_validated() {
        let settings: SettingsFile = toml::from_str(
            r#"
            [pipeline]
            confidence_threshold = 2.0
            "#,
        )
        .unwrap();
        assert!(settings.validate().is_err());
    }
}
