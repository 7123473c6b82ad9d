use serde::Serialize;
use tracing::{debug, warn};

use crate::browser::{BrowserResult, PageStepExecutor};

use super::retry::MAX_RETRY_ATTEMPTS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Step {
    Init,
    QueueWait,
    ConsentDismissed,
    FederatedLoginStarted,
    CredentialsEntered,
    TwoFactorEntered,
    PostLoginNav,
    LocationMenuOpen,
    Extracted,
    Done,
    Failed,
}

/// Browser page plus progress for a single run. Closing consumes the session,
/// so it can be released only once.
pub struct Session {
    page: Box<dyn PageStepExecutor>,
    step: Step,
    failed_at: Option<Step>,
    retry_attempt: u8,
}

impl Session {
    pub fn new(page: Box<dyn PageStepExecutor>) -> Self {
        Self {
            page,
            step: Step::Init,
            failed_at: None,
            retry_attempt: 0,
        }
    }

    pub fn page(&self) -> &dyn PageStepExecutor {
        self.page.as_ref()
    }

    pub fn step(&self) -> Step {
        self.step
    }

    pub fn retry_attempt(&self) -> u8 {
        self.retry_attempt
    }

    /// Moves forward only; a backward request is ignored.
    pub fn advance(&mut self, next: Step) {
        if next < self.step {
            warn!(current = ?self.step, requested = ?next, "ignoring backward step transition");
            return;
        }
        debug!(from = ?self.step, to = ?next, "step");
        self.step = next;
    }

    pub fn fail(&mut self) {
        if self.failed_at.is_none() {
            self.failed_at = Some(self.step);
        }
        self.step = Step::Failed;
    }

    /// The step the run was on when it first failed.
    pub fn failed_at(&self) -> Option<Step> {
        self.failed_at
    }

    /// Spends one retry from the run's budget; false once it is used up.
    pub(crate) fn begin_retry(&mut self) -> bool {
        if self.retry_attempt >= MAX_RETRY_ATTEMPTS {
            return false;
        }
        self.retry_attempt += 1;
        true
    }

    pub async fn close(mut self) -> BrowserResult<()> {
        self.page.close().await
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("step", &self.step)
            .field("failed_at", &self.failed_at)
            .field("retry_attempt", &self.retry_attempt)
            .finish_non_exhaustive()
    }
}
