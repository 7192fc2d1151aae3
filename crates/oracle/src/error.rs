//! Error types for the acceptance oracle

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Dev server failed to start: {0}")]
    ServerStartup(String),

    #[error("Dev server health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Scenario parse error: {0}")]
    SpecParse(String),

    #[error("Invalid expectation on '{selector}': {reason}")]
    InvalidExpectation { selector: String, reason: String },

    #[error("Invalid tolerance: {0}")]
    InvalidTolerance(String),

    #[error("Invalid name '{0}': must be non-empty and free of path separators")]
    InvalidName(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML encode error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Baseline persist error: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl OracleError {
    /// Whether this error means the page never reached the awaited state
    pub fn is_timeout(&self) -> bool {
        matches!(self, OracleError::Timeout(_))
    }
}

pub type OracleResult<T> = Result<T, OracleError>;
