mod gmail;
mod message;

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

pub use gmail::{AccessToken, GmailNotifier, StoredToken};
pub use message::{
    availability_message, encode_raw, encode_subject, EmailMessage, RETRY_ESCALATION_MESSAGE,
    STRUCTURE_CHANGED_MESSAGE, TEST_MESSAGE,
};

pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("authorization failed: {0}")]
    Authorization(String),
    #[error("delivery rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Delivers a plain-text message to the operator. Callers treat a failure as
/// logged-and-dropped; implementations must not retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> NotifyResult<()>;
}
