use std::time::Duration;

use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium launch failed: {0}")]
    Launch(String),
    #[error("cdp error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("navigation to {url} did not settle: {reason}")]
    Navigation { url: String, reason: String },
    #[error("timeout after {waited:?} waiting for {target}")]
    Timeout { target: String, waited: Duration },
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("page script failed: {0}")]
    Script(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl BrowserError {
    pub fn timeout(target: impl Into<String>, waited: Duration) -> Self {
        BrowserError::Timeout {
            target: target.into(),
            waited,
        }
    }

    /// Transient page states that optional steps are allowed to swallow.
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            BrowserError::Timeout { .. } | BrowserError::ElementNotFound(_)
        )
    }
}

impl From<tokio::task::JoinError> for BrowserError {
    fn from(err: tokio::task::JoinError) -> Self {
        BrowserError::Unexpected(err.to_string())
    }
}
