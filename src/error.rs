use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to connect to Chrome: {0}")]
    ConnectionFailed(String),

    #[error("Failed to launch Chrome: {0}")]
    LaunchFailed(String),

    #[error("No tab matching '{0}' is open")]
    PageNotFound(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Script evaluation failed: {0}")]
    ScriptFailed(String),

    #[error("No page available")]
    NoPage,

    #[error("CDP error: {0}")]
    CdpError(#[from] chromiumoxide::error::CdpError),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

/// Failures of the key-value persistence capability.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage payload is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend rejected the operation: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("Invalid insertion template: {0}")]
    Template(#[from] minijinja::Error),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV export produced invalid UTF-8")]
    Utf8,
}
