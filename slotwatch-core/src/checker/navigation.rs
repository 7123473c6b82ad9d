use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::browser::{BrowserResult, ClickTarget, DomPredicate, FieldSelector, PageStepExecutor};
use crate::config::{SelectorSection, TimeoutSection};
use crate::notify::Notifier;

use super::availability::{LocationOption, AVAILABILITY_FIELD, NAME_FIELD};
use super::metrics::MetricsHandle;
use super::retry::{RetryPolicy, RetryableStep};
use super::session::{Session, Step};
use super::{missing_as, tolerate, CheckError, CheckResult};

/// Waits until at least two action buttons are rendered, clicks the second
/// and waits for the navigation it triggers.
#[derive(Debug, Clone)]
pub struct AdvanceStep {
    pub button: String,
    pub settle: Duration,
    pub buttons_timeout: Duration,
    pub navigation_timeout: Duration,
}

impl AdvanceStep {
    pub fn from_config(selectors: &SelectorSection, timeouts: &TimeoutSection) -> Self {
        Self {
            button: selectors.action_button.clone(),
            settle: TimeoutSection::secs(timeouts.advance_settle_seconds),
            buttons_timeout: TimeoutSection::secs(timeouts.advance_buttons_seconds),
            navigation_timeout: TimeoutSection::secs(timeouts.advance_navigation_seconds),
        }
    }
}

#[async_trait]
impl RetryableStep for AdvanceStep {
    fn name(&self) -> &str {
        "advance"
    }

    async fn attempt(&self, page: &dyn PageStepExecutor) -> BrowserResult<()> {
        // Fixed fallback: the screen gives no signal that its buttons are wired up.
        if !self.settle.is_zero() {
            sleep(self.settle).await;
        }
        page.wait_for_predicate(
            &DomPredicate::count_at_least(&self.button, 2),
            self.buttons_timeout,
        )
        .await?;
        let before = page.navigation_marker().await?;
        page.click(&ClickTarget::nth(&self.button, 1)).await?;
        page.wait_for_navigation(&before, self.navigation_timeout).await?;
        info!("advanced past interstitial screen");
        Ok(())
    }
}

/// Post-login sub-sequence ending in the extracted location list.
pub struct NavigationFlow<'a> {
    pub selectors: &'a SelectorSection,
    pub timeouts: &'a TimeoutSection,
    pub retry: &'a RetryPolicy,
    pub notifier: &'a dyn Notifier,
    pub metrics: &'a MetricsHandle,
}

impl NavigationFlow<'_> {
    pub async fn run(&self, session: &mut Session) -> CheckResult<Vec<LocationOption>> {
        let sel = self.selectors;
        let t = self.timeouts;

        let advance = AdvanceStep::from_config(sel, t);
        self.retry
            .run(session, &advance, self.notifier, self.metrics)
            .await?;

        session
            .page()
            .wait_for_selector(&sel.action_button, TimeoutSection::secs(t.continue_button_seconds))
            .await?;
        let before = session.page().navigation_marker().await?;
        session
            .page()
            .click(&ClickTarget::nth(&sel.action_button, 0))
            .await?;
        let moved = session
            .page()
            .wait_for_navigation(&before, TimeoutSection::secs(t.advance_navigation_seconds))
            .await;
        tolerate(moved, "continue navigation")?;
        info!("reached booking screen");

        let menu_missing = missing_as(CheckError::LocationMenuMissing);
        session
            .page()
            .wait_for_selector(&sel.location_menu, TimeoutSection::secs(t.location_menu_seconds))
            .await
            .map_err(&menu_missing)?;
        session
            .page()
            .click(&ClickTarget::selector(&sel.location_menu))
            .await
            .map_err(&menu_missing)?;
        session.advance(Step::LocationMenuOpen);
        info!("location menu opened");

        self.settle_menu(session.page()).await;

        let fields = [
            FieldSelector::new(NAME_FIELD, &sel.location_name),
            FieldSelector::new(AVAILABILITY_FIELD, &sel.location_availability),
        ];
        let records = session
            .page()
            .extract_text(&sel.menu_container, &sel.menu_item, &fields)
            .await;
        let options = records
            .iter()
            .filter_map(|record| {
                let option = LocationOption::from_record(record);
                if option.is_none() {
                    debug!(?record, "skipping menu entry without availability label");
                }
                option
            })
            .collect::<Vec<_>>();
        session.advance(Step::Extracted);
        info!(locations = options.len(), "extracted location options");
        Ok(options)
    }

    /// Polls the rendered item count until it is non-zero and unchanged
    /// between two polls; the configured settle time is the ceiling.
    async fn settle_menu(&self, page: &dyn PageStepExecutor) {
        let ceiling = TimeoutSection::secs(self.timeouts.menu_settle_seconds);
        let poll = self.timeouts.menu_poll();
        let start = Instant::now();
        let mut previous = None;
        loop {
            let count = page
                .extract_text(&self.selectors.menu_container, &self.selectors.menu_item, &[])
                .await
                .len();
            if count > 0 && previous == Some(count) {
                debug!(count, waited_ms = start.elapsed().as_millis() as u64, "menu settled");
                return;
            }
            previous = Some(count);
            if start.elapsed() >= ceiling {
                if count == 0 {
                    warn!(waited = ?ceiling, "menu still empty at settle ceiling");
                }
                return;
            }
            sleep(poll).await;
        }
    }
}
