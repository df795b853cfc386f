use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeasibilityError {
    #[error("Spreadsheet is empty or the monthly data sheet was not found")]
    EmptyInput,

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Invalid period '{0}': expected YYYY-MM")]
    InvalidPeriod(String),

    #[error("Invalid configuration value for {field}: {details}")]
    InvalidConfig { field: String, details: String },

    #[error("Version '{0}' not found in history")]
    VersionNotFound(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl FeasibilityError {
    /// True for the errors that reject an upload before normalization.
    pub fn is_blocking_ingestion_error(&self) -> bool {
        matches!(self, Self::EmptyInput | Self::MissingColumns(_))
    }
}

pub type Result<T> = std::result::Result<T, FeasibilityError>;
