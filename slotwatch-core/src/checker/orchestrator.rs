use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::browser::{DomPredicate, SessionFactory};
use crate::config::{Credentials, SlotwatchConfig, TimeoutSection};
use crate::notify::{
    availability_message, Notifier, NotifyResult, STRUCTURE_CHANGED_MESSAGE, TEST_MESSAGE,
};
use crate::otp::OneTimeCodeGenerator;

use super::auth::AuthenticationFlow;
use super::availability::{interpret, LocationOption};
use super::metrics::MetricsHandle;
use super::navigation::NavigationFlow;
use super::retry::RetryPolicy;
use super::session::{Session, Step};
use super::{CheckError, CheckResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Available {
        detail: String,
        location: Option<String>,
        delivered: bool,
    },
    NoAvailability {
        locations: usize,
    },
    /// The menu opened but rendered no readable entries.
    NoData,
    Failed {
        at: Step,
        reason: String,
        notified: bool,
    },
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed { .. })
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Available {
                detail,
                location,
                delivered,
            } => {
                write!(f, "available: {detail}")?;
                if let Some(location) = location {
                    write!(f, " at {location}")?;
                }
                if !delivered {
                    f.write_str(" (notification not delivered)")?;
                }
                Ok(())
            }
            RunOutcome::NoAvailability { locations } => {
                write!(f, "no availability across {locations} locations")
            }
            RunOutcome::NoData => f.write_str("location menu was empty"),
            RunOutcome::Failed {
                at,
                reason,
                notified,
            } => {
                write!(f, "failed at {at:?}: {reason}")?;
                if *notified {
                    f.write_str(" (operator notified)")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: RunOutcome,
    pub final_step: Step,
    pub retry_attempts: u8,
}

/// Drives one check from portal entry to notification. Every run opens its
/// own browser session and closes it before returning.
pub struct AvailabilityChecker {
    config: Arc<SlotwatchConfig>,
    credentials: Credentials,
    sessions: Arc<dyn SessionFactory>,
    notifier: Arc<dyn Notifier>,
    otp: Arc<dyn OneTimeCodeGenerator>,
    retry: RetryPolicy,
    metrics: MetricsHandle,
    screenshot_path: PathBuf,
}

impl AvailabilityChecker {
    pub fn new(
        config: Arc<SlotwatchConfig>,
        credentials: Credentials,
        sessions: Arc<dyn SessionFactory>,
        notifier: Arc<dyn Notifier>,
        otp: Arc<dyn OneTimeCodeGenerator>,
    ) -> Self {
        let retry = RetryPolicy::new(
            config.portal.entry_url.clone(),
            TimeoutSection::secs(config.timeouts.navigation_seconds),
        );
        let screenshot_path = PathBuf::from(&config.diagnostics.screenshot_path);
        Self {
            config,
            credentials,
            sessions,
            notifier,
            otp,
            retry,
            metrics: MetricsHandle::default(),
            screenshot_path,
        }
    }

    pub fn with_screenshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.screenshot_path = path.into();
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsHandle) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }

    /// Never fails: every error, panic included, ends up in the report.
    pub async fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("check_run", run_id = %run_id);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid) -> RunReport {
        let started_at = Utc::now();
        let clock = Instant::now();
        self.metrics.record(|m| m.record_run_started());
        info!("availability check started");

        let page = match self.sessions.open().await {
            Ok(page) => page,
            Err(err) => {
                error!(error = %err, "browser session could not be opened");
                self.metrics.record(|m| m.record_run_failed());
                return RunReport {
                    run_id,
                    started_at,
                    duration_ms: elapsed_ms(clock),
                    outcome: RunOutcome::Failed {
                        at: Step::Init,
                        reason: err.to_string(),
                        notified: false,
                    },
                    final_step: Step::Failed,
                    retry_attempts: 0,
                };
            }
        };

        let mut session = Session::new(page);
        let notifier = RunNotifier::new(self.notifier.as_ref());
        let checked = AssertUnwindSafe(self.check(&mut session, &notifier))
            .catch_unwind()
            .await;
        let outcome = match checked {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                self.recover_from_panic(&mut session, &notifier, reason).await
            }
        };

        let final_step = session.step();
        let retry_attempts = session.retry_attempt();
        if let Err(err) = session.close().await {
            warn!(error = %err, "browser session did not close cleanly");
        }

        let duration_ms = elapsed_ms(clock);
        info!(outcome = %outcome, duration_ms, "availability check finished");
        RunReport {
            run_id,
            started_at,
            duration_ms,
            outcome,
            final_step,
            retry_attempts,
        }
    }

    async fn check(&self, session: &mut Session, notifier: &RunNotifier<'_>) -> RunOutcome {
        match self.drive(session, notifier).await {
            Ok(options) => self.conclude(session, notifier, &options).await,
            Err(err) => self.handle_failure(session, notifier, err).await,
        }
    }

    async fn recover_from_panic(
        &self,
        session: &mut Session,
        notifier: &RunNotifier<'_>,
        reason: String,
    ) -> RunOutcome {
        let at = session.failed_at().unwrap_or_else(|| session.step());
        error!(step = ?at, reason = %reason, "availability check panicked");
        if session.failed_at().is_none() {
            self.metrics.record(|m| m.record_run_failed());
        }
        session.fail();

        let notified = if notifier.attempted() {
            notifier.delivered()
        } else {
            AssertUnwindSafe(self.notify(notifier, STRUCTURE_CHANGED_MESSAGE))
                .catch_unwind()
                .await
                .unwrap_or(false)
        };
        RunOutcome::Failed {
            at,
            reason,
            notified,
        }
    }

    async fn drive(
        &self,
        session: &mut Session,
        notifier: &dyn Notifier,
    ) -> CheckResult<Vec<LocationOption>> {
        self.enter_portal(session).await?;

        AuthenticationFlow {
            selectors: &self.config.selectors,
            timeouts: &self.config.timeouts,
            credentials: &self.credentials,
            otp: self.otp.as_ref(),
        }
        .run(session)
        .await?;

        NavigationFlow {
            selectors: &self.config.selectors,
            timeouts: &self.config.timeouts,
            retry: &self.retry,
            notifier,
            metrics: &self.metrics,
        }
        .run(session)
        .await
    }

    async fn enter_portal(&self, session: &mut Session) -> CheckResult<()> {
        let portal = &self.config.portal;
        let timeouts = &self.config.timeouts;

        session
            .page()
            .navigate(&portal.entry_url, TimeoutSection::secs(timeouts.navigation_seconds))
            .await?;
        let detect = TimeoutSection::secs(timeouts.queue_detect_seconds);
        if !detect.is_zero() {
            sleep(detect).await;
        }
        session.advance(Step::QueueWait);

        let url = session.page().current_url().await?;
        if in_queue(&url, &portal.queue_domain) {
            info!(url = %url, "queueing wall detected; waiting to be let through");
            session
                .page()
                .wait_for_predicate(
                    &DomPredicate::HostOutside(portal.queue_domain.clone()),
                    TimeoutSection::secs(timeouts.queue_wait_seconds),
                )
                .await?;
            info!("left the queue");
        }
        Ok(())
    }

    async fn conclude(
        &self,
        session: &mut Session,
        notifier: &dyn Notifier,
        options: &[LocationOption],
    ) -> RunOutcome {
        let result = interpret(options);
        session.advance(Step::Done);

        if options.is_empty() {
            warn!("location menu rendered no entries");
            return RunOutcome::NoData;
        }
        if !result.available {
            info!(locations = options.len(), "no availability");
            return RunOutcome::NoAvailability {
                locations: options.len(),
            };
        }

        self.metrics.record(|m| m.record_availability());
        let target = &self.config.portal.target_location;
        if let Some(location) = result.location.as_deref() {
            if !location.eq_ignore_ascii_case(target) {
                // Reported anyway: the menu is not filtered by location name.
                info!(location, target = %target, "availability found at a location other than the target");
            }
        }
        info!(detail = %result.detail_text, "availability found");
        let delivered = self
            .notify(notifier, &availability_message(target, &result.detail_text))
            .await;
        RunOutcome::Available {
            detail: result.detail_text,
            location: result.location,
            delivered,
        }
    }

    async fn handle_failure(
        &self,
        session: &mut Session,
        notifier: &dyn Notifier,
        err: CheckError,
    ) -> RunOutcome {
        let at = session.step();
        error!(step = ?at, error = %err, "availability check failed");
        session.fail();
        self.metrics.record(|m| m.record_run_failed());

        let notified = match &err {
            CheckError::AdvanceExhausted { notified, .. } => *notified,
            CheckError::LocationMenuMissing(_) => {
                self.capture_screenshot(session).await;
                self.notify(notifier, STRUCTURE_CHANGED_MESSAGE).await
            }
            _ => self.notify(notifier, STRUCTURE_CHANGED_MESSAGE).await,
        };
        RunOutcome::Failed {
            at,
            reason: err.to_string(),
            notified,
        }
    }

    async fn capture_screenshot(&self, session: &Session) {
        match session.page().screenshot(&self.screenshot_path).await {
            Ok(()) => info!(path = %self.screenshot_path.display(), "saved diagnostic screenshot"),
            Err(err) => warn!(error = %err, "diagnostic screenshot failed"),
        }
    }

    /// Best effort: a delivery failure is logged and reported as `false`.
    async fn notify(&self, notifier: &dyn Notifier, message: &str) -> bool {
        match notifier.send(message).await {
            Ok(()) => {
                self.metrics.record(|m| m.record_notification(true));
                info!("operator notified");
                true
            }
            Err(err) => {
                self.metrics.record(|m| m.record_notification(false));
                error!(error = %err, "notification delivery failed");
                false
            }
        }
    }

    pub async fn send_test_notification(&self) -> NotifyResult<()> {
        let result = self.notifier.send(TEST_MESSAGE).await;
        self.metrics
            .record(|m| m.record_notification(result.is_ok()));
        match &result {
            Ok(()) => info!("test notification sent"),
            Err(err) => error!(error = %err, "test notification failed"),
        }
        result
    }
}

/// Per-run view of the notifier that remembers whether the operator was
/// already contacted, so a late panic does not send a second email.
struct RunNotifier<'a> {
    inner: &'a dyn Notifier,
    attempted: AtomicBool,
    delivered: AtomicBool,
}

impl<'a> RunNotifier<'a> {
    fn new(inner: &'a dyn Notifier) -> Self {
        Self {
            inner,
            attempted: AtomicBool::new(false),
            delivered: AtomicBool::new(false),
        }
    }

    fn attempted(&self) -> bool {
        self.attempted.load(Ordering::SeqCst)
    }

    fn delivered(&self) -> bool {
        self.delivered.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RunNotifier<'_> {
    async fn send(&self, message: &str) -> NotifyResult<()> {
        self.attempted.store(true, Ordering::SeqCst);
        let result = self.inner.send(message).await;
        if result.is_ok() {
            self.delivered.store(true, Ordering::SeqCst);
        }
        result
    }
}

fn in_queue(current: &str, queue_domain: &str) -> bool {
    match url::Url::parse(current) {
        Ok(url) => url
            .host_str()
            .map(|host| host == queue_domain || host.ends_with(&format!(".{queue_domain}")))
            .unwrap_or(false),
        Err(_) => current.contains(queue_domain),
    }
}

fn elapsed_ms(clock: Instant) -> u64 {
    u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
