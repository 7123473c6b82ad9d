mod auth;
mod availability;
mod metrics;
mod navigation;
mod orchestrator;
mod retry;
mod session;

use thiserror::Error;
use tracing::debug;

use crate::browser::{BrowserError, BrowserResult};
use crate::otp::OtpError;

pub use auth::AuthenticationFlow;
pub use availability::{
    interpret, AvailabilityResult, LocationOption, AVAILABILITY_FIELD, NAME_FIELD,
    NO_AVAILABILITY,
};
pub use metrics::{CheckerMetrics, MetricsHandle};
pub use navigation::{AdvanceStep, NavigationFlow};
pub use orchestrator::{AvailabilityChecker, RunOutcome, RunReport};
pub use retry::{RetryOutcome, RetryPolicy, RetryableStep, MAX_RETRY_ATTEMPTS};
pub use session::{Session, Step};

pub type CheckResult<T> = Result<T, CheckError>;

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("federated login entry point missing: {0}")]
    LoginEntryPointMissing(#[source] BrowserError),
    #[error("credential field missing: {0}")]
    CredentialFieldMissing(#[source] BrowserError),
    #[error("location menu missing: {0}")]
    LocationMenuMissing(#[source] BrowserError),
    #[error("advance step failed after reload and retry: {source}")]
    AdvanceExhausted {
        #[source]
        source: BrowserError,
        notified: bool,
    },
    #[error("one-time code: {0}")]
    OneTimeCode(#[from] OtpError),
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

impl CheckError {
    /// The operator was already told about this failure where it happened.
    pub fn already_escalated(&self) -> bool {
        matches!(self, CheckError::AdvanceExhausted { .. })
    }
}

/// Maps absence (timeout, missing element) to a structural error and keeps
/// every other driver failure as-is.
pub(crate) fn missing_as(
    wrap: fn(BrowserError) -> CheckError,
) -> impl Fn(BrowserError) -> CheckError {
    move |err| {
        if err.is_absence() {
            wrap(err)
        } else {
            CheckError::Browser(err)
        }
    }
}

/// Optional sub-steps: absence is not an error.
pub(crate) fn tolerate(result: BrowserResult<()>, label: &str) -> BrowserResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.is_absence() => {
            debug!(step = label, error = %err, "optional step skipped");
            Ok(false)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn absence_maps_to_structural_error() {
        let map = missing_as(CheckError::LocationMenuMissing);
        let err = map(BrowserError::timeout("button#button3", Duration::from_secs(60)));
        assert!(matches!(err, CheckError::LocationMenuMissing(_)));
        let err = map(BrowserError::Unexpected("target closed".into()));
        assert!(matches!(err, CheckError::Browser(_)));
    }

    #[test]
    fn tolerate_swallows_only_absence() {
        assert!(tolerate(Ok(()), "banner").unwrap());
        assert!(!tolerate(Err(BrowserError::ElementNotFound("x".into())), "banner").unwrap());
        assert!(tolerate(Err(BrowserError::Script("boom".into())), "banner").is_err());
    }
}
