use crate::models::PipelineStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Missing required configuration: {}", .0.join(", "))]
    ConfigMissing(Vec<String>),

    #[error("Invalid value for {key}: {value:?}")]
    ConfigInvalid { key: String, value: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Could not connect to the portal: {0}")]
    Connection(String),

    #[error("Request to the portal failed: {0}")]
    RequestError(reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Browser render command failed: {0}")]
    Renderer(String),

    #[error("Notification delivery failed: {0}")]
    Notify(String),
}

impl From<reqwest::Error> for ScraperError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScraperError::Timeout(err.to_string())
        } else if err.is_connect() {
            ScraperError::Connection(err.to_string())
        } else {
            ScraperError::RequestError(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;

/// A pipeline step that ended the run, with the error text kept for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub status: PipelineStatus,
    pub detail: String,
}

impl Failure {
    pub fn new(status: PipelineStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    /// Classifies a transport error: timeouts and connection failures get
    /// their own status, anything else is unexpected.
    pub fn from_transport(err: ScraperError) -> Self {
        let status = match err {
            ScraperError::Timeout(_) => PipelineStatus::NetworkTimeout,
            ScraperError::Connection(_) => PipelineStatus::ConnectionError,
            _ => PipelineStatus::UnexpectedError,
        };
        Self::new(status, err.to_string())
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.detail)
    }
}
