use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::page::ScreenshotParams;
use serde::Deserialize;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::automation::{BrowserAutomation, BrowserContext, BrowserLauncher};
use super::error::{BrowserError, BrowserResult};
use super::executor::{
    extraction_script, ClickTarget, DomPredicate, ExtractedRecord, FieldSelector,
    NavigationMarker, PageStepExecutor, SessionFactory,
};

const POLL_START: Duration = Duration::from_millis(100);
const POLL_CAP: Duration = Duration::from_secs(1);
const QUIET_WINDOW: Duration = Duration::from_millis(500);
const QUIET_CEILING: Duration = Duration::from_secs(10);
const LOAD_STATE_SCRIPT: &str = "({ complete: document.readyState === 'complete', resources: performance.getEntriesByType('resource').length })";

#[derive(Debug, Deserialize)]
struct LoadState {
    complete: bool,
    resources: u64,
}

impl LoadState {
    fn quiet_since(&self, previous: Option<u64>) -> bool {
        self.complete && previous == Some(self.resources)
    }

    fn count_to_compare(&self) -> Option<u64> {
        self.complete.then_some(self.resources)
    }
}

/// One Chromium instance with a single page, driven through
/// [`PageStepExecutor`].
pub struct ChromiumSession {
    context: BrowserContext,
    automation: Option<BrowserAutomation>,
}

impl ChromiumSession {
    pub async fn start(launcher: &BrowserLauncher) -> BrowserResult<Self> {
        let automation = launcher.launch().await?;
        match automation.new_context().await {
            Ok(context) => Ok(Self {
                context,
                automation: Some(automation),
            }),
            Err(err) => {
                automation.shutdown().await?;
                Err(err)
            }
        }
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, script: &str) -> BrowserResult<T> {
        self.context
            .page()
            .evaluate(script)
            .await?
            .into_value()
            .map_err(|err| BrowserError::Script(format!("failed to decode script result: {err}")))
    }

    /// Waits until the document is complete and no resource request started
    /// during one quiet window. Gives up silently after `ceiling`.
    async fn settle(&self, ceiling: Duration) {
        let start = Instant::now();
        let mut last_count = None;
        loop {
            match self.evaluate::<LoadState>(LOAD_STATE_SCRIPT).await {
                Ok(state) if state.quiet_since(last_count) => return,
                Ok(state) => last_count = state.count_to_compare(),
                Err(_) => last_count = None,
            }
            if start.elapsed() >= ceiling {
                debug!(?ceiling, "page still loading resources; continuing");
                return;
            }
            sleep(QUIET_WINDOW).await;
        }
    }
}

fn remaining(limit: Duration, start: Instant) -> Duration {
    limit.saturating_sub(start.elapsed()).min(QUIET_CEILING)
}

async fn poll_until<F, Fut>(target: &str, limit: Duration, mut check: F) -> BrowserResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let mut interval = POLL_START;
    loop {
        if check().await {
            return Ok(());
        }
        if start.elapsed() >= limit {
            return Err(BrowserError::timeout(target, limit));
        }
        sleep(interval).await;
        interval = (interval * 2).min(POLL_CAP);
    }
}

#[async_trait]
impl PageStepExecutor for ChromiumSession {
    async fn navigate(&self, url: &str, limit: Duration) -> BrowserResult<()> {
        let start = Instant::now();
        match timeout(limit, self.context.goto(url)).await {
            Ok(Ok(())) => {
                self.settle(remaining(limit, start)).await;
                Ok(())
            }
            Ok(Err(err)) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: err.to_string(),
            }),
            Err(_) => Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: format!("not settled after {limit:?}"),
            }),
        }
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.context.page().url().await?.unwrap_or_default())
    }

    async fn wait_for_selector(&self, selector: &str, limit: Duration) -> BrowserResult<()> {
        let page = self.context.page();
        poll_until(selector, limit, || async move {
            page.find_element(selector).await.is_ok()
        })
        .await
    }

    async fn wait_for_predicate(
        &self,
        predicate: &DomPredicate,
        limit: Duration,
    ) -> BrowserResult<()> {
        let script = predicate.script();
        let script = script.as_str();
        poll_until(&predicate.describe(), limit, || async move {
            // Evaluation fails while a navigation swaps the document; treat as not yet.
            self.evaluate::<bool>(script).await.unwrap_or(false)
        })
        .await
    }

    async fn navigation_marker(&self) -> BrowserResult<NavigationMarker> {
        self.evaluate(NavigationMarker::SCRIPT).await
    }

    async fn wait_for_navigation(
        &self,
        from: &NavigationMarker,
        limit: Duration,
    ) -> BrowserResult<()> {
        let start = Instant::now();
        poll_until("navigation", limit, || async move {
            match self.evaluate::<NavigationMarker>(NavigationMarker::SCRIPT).await {
                Ok(current) => current.moved_from(from),
                Err(_) => false,
            }
        })
        .await?;
        self.settle(remaining(limit, start)).await;
        Ok(())
    }

    async fn click(&self, target: &ClickTarget) -> BrowserResult<()> {
        let clicked: bool = self.evaluate(&target.script()).await?;
        if clicked {
            debug!(target = %target.describe(), "clicked");
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(target.describe()))
        }
    }

    async fn type_text(&self, selector: &str, text: &str) -> BrowserResult<()> {
        let element = self
            .context
            .page()
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;
        element.click().await?;
        element.type_str(text).await?;
        Ok(())
    }

    async fn extract_text(
        &self,
        container: &str,
        item: &str,
        fields: &[FieldSelector],
    ) -> Vec<ExtractedRecord> {
        let script = extraction_script(container, item, fields);
        match self.evaluate::<Vec<ExtractedRecord>>(&script).await {
            Ok(records) => records,
            Err(err) => {
                warn!(container, item, error = %err, "text extraction failed; treating as empty");
                Vec::new()
            }
        }
    }

    async fn screenshot(&self, path: &Path) -> BrowserResult<()> {
        let params = ScreenshotParams::builder().full_page(true).build();
        let bytes = self.context.page().screenshot(params).await?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn close(&mut self) -> BrowserResult<()> {
        match self.automation.take() {
            Some(automation) => automation.shutdown().await,
            None => Ok(()),
        }
    }
}

pub struct ChromiumSessionFactory {
    launcher: BrowserLauncher,
}

impl ChromiumSessionFactory {
    pub fn new(launcher: BrowserLauncher) -> Self {
        Self { launcher }
    }
}

#[async_trait]
impl SessionFactory for ChromiumSessionFactory {
    async fn open(&self) -> BrowserResult<Box<dyn PageStepExecutor>> {
        let session = ChromiumSession::start(&self.launcher).await?;
        Ok(Box::new(session))
    }
}
