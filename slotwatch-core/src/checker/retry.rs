use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::browser::{BrowserResult, PageStepExecutor};
use crate::notify::{Notifier, RETRY_ESCALATION_MESSAGE};

use super::metrics::MetricsHandle;
use super::session::Session;
use super::{CheckError, CheckResult};

pub const MAX_RETRY_ATTEMPTS: u8 = 1;

/// A page step that may be replayed after a full reload.
#[async_trait]
pub trait RetryableStep: Send + Sync {
    fn name(&self) -> &str;

    async fn attempt(&self, page: &dyn PageStepExecutor) -> BrowserResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    pub attempts: usize,
}

/// One reload-and-replay, then escalation to the operator. The retry budget
/// lives on the [`Session`], so a run gets at most one reload in total.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    reload_url: String,
    reload_timeout: Duration,
}

impl RetryPolicy {
    pub fn new(reload_url: impl Into<String>, reload_timeout: Duration) -> Self {
        Self {
            reload_url: reload_url.into(),
            reload_timeout,
        }
    }

    pub async fn run(
        &self,
        session: &mut Session,
        step: &dyn RetryableStep,
        notifier: &dyn Notifier,
        metrics: &MetricsHandle,
    ) -> CheckResult<RetryOutcome> {
        let mut attempts = 0usize;
        loop {
            attempts += 1;
            let error = match step.attempt(session.page()).await {
                Ok(()) => {
                    if attempts > 1 {
                        info!(step = step.name(), attempts, "step succeeded after reload");
                    }
                    return Ok(RetryOutcome { attempts });
                }
                Err(error) => error,
            };

            if session.begin_retry() {
                warn!(step = step.name(), error = %error, "step failed; reloading portal and retrying once");
                metrics.record(|m| m.record_reload());
                if let Err(reload) = session
                    .page()
                    .navigate(&self.reload_url, self.reload_timeout)
                    .await
                {
                    // The replay will surface the broken page on its own.
                    warn!(error = %reload, "reload before retry did not settle");
                }
                continue;
            }

            error!(step = step.name(), error = %error, "step failed after retry; escalating");
            let notified = match notifier.send(RETRY_ESCALATION_MESSAGE).await {
                Ok(()) => true,
                Err(err) => {
                    error!(error = %err, "escalation notification failed");
                    false
                }
            };
            metrics.record(|m| m.record_notification(notified));
            return Err(CheckError::AdvanceExhausted {
                source: error,
                notified,
            });
        }
    }
}
