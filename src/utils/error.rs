use thiserror::Error;

/// Failure modes of the model completion gateway. Handled inside the
/// owning agent; never propagates past it (each agent has a documented
/// degradation path).
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("model endpoint unavailable after {attempts} attempts: {message}")]
    Unavailable { attempts: u32, message: String },

    #[error("model output does not conform to the '{shape}' shape: {message}")]
    MalformedOutput { shape: String, message: String },
}

/// Ingest failures are fatal: the pipeline does not start without data.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("source unreachable: {0}")]
    UnreachableSource(String),

    #[error("sheet is not public. Go to File > Share > Anyone with link can view")]
    NotPublic,

    #[error("unsupported source format: {0}")]
    UnsupportedFormat(String),

    #[error("document contains no sheets")]
    EmptyDocument,
}

#[derive(Error, Debug)]
pub enum InsightError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Workbook parsing error: {0}")]
    WorkbookError(#[from] calamine::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

pub type Result<T> = std::result::Result<T, InsightError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Data,
    Configuration,
    System,
}

impl InsightError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            InsightError::Gateway(_) | InsightError::ApiError(_) => ErrorCategory::Network,
            InsightError::Ingest(IngestError::UnreachableSource(_))
            | InsightError::Ingest(IngestError::NotPublic) => ErrorCategory::Network,
            InsightError::Ingest(_)
            | InsightError::CsvError(_)
            | InsightError::WorkbookError(_)
            | InsightError::SerializationError(_)
            | InsightError::ValidationError { .. } => ErrorCategory::Data,
            InsightError::ConfigError { .. }
            | InsightError::MissingConfigError { .. }
            | InsightError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            InsightError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // Agents degrade gateway failures before they can surface here
            InsightError::Gateway(_) => ErrorSeverity::Medium,
            InsightError::Ingest(_) => ErrorSeverity::High,
            InsightError::ApiError(_) => ErrorSeverity::Medium,
            InsightError::ValidationError { .. } => ErrorSeverity::Low,
            InsightError::ConfigError { .. }
            | InsightError::MissingConfigError { .. }
            | InsightError::InvalidConfigValueError { .. } => ErrorSeverity::High,
            InsightError::CsvError(_)
            | InsightError::WorkbookError(_)
            | InsightError::SerializationError(_) => ErrorSeverity::High,
            InsightError::IoError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            InsightError::Gateway(GatewayError::Unavailable { .. }) => {
                "Check network connectivity and GROQ_API_KEY, then retry".to_string()
            }
            InsightError::Gateway(GatewayError::MalformedOutput { .. }) => {
                "Retry the run; persistent failures may need a different GROQ_MODEL".to_string()
            }
            InsightError::Ingest(IngestError::NotPublic) => {
                "Open the sheet's share settings and allow anyone with the link to view".to_string()
            }
            InsightError::Ingest(IngestError::UnreachableSource(_)) => {
                "Check the URL and your internet connection".to_string()
            }
            InsightError::Ingest(IngestError::UnsupportedFormat(_)) => {
                "Provide a Google Sheets URL or an .xlsx/.csv file".to_string()
            }
            InsightError::Ingest(IngestError::EmptyDocument) => {
                "The workbook has no sheets with data; check the source".to_string()
            }
            InsightError::MissingConfigError { field } => {
                format!("Set {} in the environment or settings file", field)
            }
            InsightError::InvalidConfigValueError { field, .. } => {
                format!("Correct the value of {} and re-run", field)
            }
            _ => "Check the logs above for details".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            InsightError::Ingest(e) => format!("Could not read the spreadsheet: {}", e),
            InsightError::Gateway(e) => format!("The AI model could not be reached: {}", e),
            InsightError::ConfigError { message } => format!("Configuration problem: {}", message),
            InsightError::MissingConfigError { field } => {
                format!("Missing configuration: {}", field)
            }
            InsightError::InvalidConfigValueError { field, reason, .. } => {
                format!("Invalid {}: {}", field, reason)
            }
            other => format!("{}", other),
        }
    }
}
