#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::Notify;

use slotwatch_core::browser::{
    BrowserError, BrowserResult, ClickTarget, DomPredicate, ExtractedRecord, FieldSelector,
    NavigationMarker, PageStepExecutor, SessionFactory,
};
use slotwatch_core::checker::{AvailabilityChecker, AVAILABILITY_FIELD, NAME_FIELD};
use slotwatch_core::config::{load_config, Credentials, SlotwatchConfig};
use slotwatch_core::notify::{Notifier, NotifyError, NotifyResult};
use slotwatch_core::otp::{OneTimeCodeGenerator, OtpError};

pub const QUEUE_URL: &str = "https://rsaie.queue-it.net/?c=rsaie&e=myroadsafety";
pub const USERNAME: &str = "driver@example.com";
pub const PASSWORD: &str = "correct horse battery staple";
pub const OTP_CODE: &str = "123456";

pub fn fixture_config() -> SlotwatchConfig {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/slotwatch.toml");
    load_config(path).expect("fixture config parses")
}

pub fn credentials() -> Credentials {
    Credentials::new(USERNAME, PASSWORD, "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ")
}

pub fn location(name: &str, availability: Option<&str>) -> ExtractedRecord {
    ExtractedRecord::from_pairs([(NAME_FIELD, Some(name)), (AVAILABILITY_FIELD, availability)])
}

/// Galway and Cork full, Dublin open.
pub fn mixed_menu() -> Vec<ExtractedRecord> {
    vec![
        location("Carnmore, Galway", Some("No availability")),
        location("Dublin (Finglas)", Some("2 slots")),
        location("Cork", Some("No availability")),
    ]
}

#[derive(Debug, Default)]
struct PortalState {
    missing: HashSet<String>,
    queued: bool,
    queue_stuck: bool,
    advance_failures: usize,
    fail_entry_navigation: bool,
    panic_on: Option<String>,
    inert_click: Option<(ClickTarget, usize)>,
    menu: Vec<ExtractedRecord>,
    current_url: String,
    /// Bumped whenever the page loads a new document.
    document: u32,
    calls: Vec<String>,
    navigations: Vec<String>,
    typed: Vec<(String, String)>,
    clicks: Vec<ClickTarget>,
    screenshots: Vec<PathBuf>,
    closes: usize,
}

/// Scripted stand-in for the portal. Every page opened from it shares state,
/// so tests can inspect what the flow did after the run.
#[derive(Debug, Clone, Default)]
pub struct FakePortal {
    state: Arc<Mutex<PortalState>>,
}

impl FakePortal {
    pub fn new(menu: Vec<ExtractedRecord>) -> Self {
        let portal = Self::default();
        portal.state().menu = menu;
        portal
    }

    fn state(&self) -> MutexGuard<'_, PortalState> {
        self.state.lock().unwrap()
    }

    pub fn without(self, selector: &str) -> Self {
        self.state().missing.insert(selector.to_string());
        self
    }

    pub fn queued(self) -> Self {
        self.state().queued = true;
        self
    }

    pub fn stuck_in_queue(self) -> Self {
        {
            let mut state = self.state();
            state.queued = true;
            state.queue_stuck = true;
        }
        self
    }

    pub fn failing_advance(self, times: usize) -> Self {
        self.state().advance_failures = times;
        self
    }

    pub fn failing_entry(self) -> Self {
        self.state().fail_entry_navigation = true;
        self
    }

    /// The next `times` clicks on `target` land but the page stays put.
    pub fn inert_click(self, target: ClickTarget, times: usize) -> Self {
        self.state().inert_click = Some((target, times));
        self
    }

    pub fn panicking_on(self, selector: &str) -> Self {
        self.state().panic_on = Some(selector.to_string());
        self
    }

    pub fn page(&self) -> FakePage {
        FakePage {
            portal: self.clone(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state().navigations.clone()
    }

    pub fn typed(&self) -> Vec<(String, String)> {
        self.state().typed.clone()
    }

    pub fn clicks(&self) -> Vec<ClickTarget> {
        self.state().clicks.clone()
    }

    pub fn screenshots(&self) -> Vec<PathBuf> {
        self.state().screenshots.clone()
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }
}

pub struct FakePage {
    portal: FakePortal,
}

impl FakePage {
    fn maybe_panic(&self, selector: &str) {
        let scripted = self.portal.state().panic_on.as_deref() == Some(selector);
        if scripted {
            panic!("scripted panic while waiting for {selector}");
        }
    }
}

fn target_selector(target: &ClickTarget) -> &str {
    match target {
        ClickTarget::Selector(selector) => selector,
        ClickTarget::Nth { selector, .. } => selector,
        ClickTarget::WithText { selector, .. } => selector,
    }
}

#[async_trait]
impl PageStepExecutor for FakePage {
    async fn navigate(&self, url: &str, _timeout: Duration) -> BrowserResult<()> {
        let mut state = self.portal.state();
        state.calls.push(format!("navigate {url}"));
        if state.fail_entry_navigation {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_RESET".into(),
            });
        }
        state.navigations.push(url.to_string());
        state.document += 1;
        state.current_url = if state.queued {
            QUEUE_URL.to_string()
        } else {
            url.to_string()
        };
        Ok(())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.portal.state().current_url.clone())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> BrowserResult<()> {
        self.maybe_panic(selector);
        let mut state = self.portal.state();
        state.calls.push(format!("wait {selector}"));
        if state.missing.contains(selector) {
            return Err(BrowserError::timeout(selector, timeout));
        }
        Ok(())
    }

    async fn wait_for_predicate(
        &self,
        predicate: &DomPredicate,
        timeout: Duration,
    ) -> BrowserResult<()> {
        let mut state = self.portal.state();
        state.calls.push(format!("wait {}", predicate.describe()));
        match predicate {
            DomPredicate::CountAtLeast { selector, .. } => {
                if state.missing.contains(selector) {
                    return Err(BrowserError::timeout(predicate.describe(), timeout));
                }
                if state.advance_failures > 0 {
                    state.advance_failures -= 1;
                    return Err(BrowserError::timeout(predicate.describe(), timeout));
                }
                Ok(())
            }
            DomPredicate::HostOutside(_) => {
                if state.queue_stuck {
                    return Err(BrowserError::timeout(predicate.describe(), timeout));
                }
                state.queued = false;
                state.current_url = "https://myroadsafety.rsa.ie/portal/".to_string();
                Ok(())
            }
        }
    }

    async fn navigation_marker(&self) -> BrowserResult<NavigationMarker> {
        let state = self.portal.state();
        Ok(NavigationMarker::new(
            state.current_url.clone(),
            f64::from(state.document),
        ))
    }

    async fn wait_for_navigation(
        &self,
        from: &NavigationMarker,
        timeout: Duration,
    ) -> BrowserResult<()> {
        let current = self.navigation_marker().await?;
        self.portal.state().calls.push("wait navigation".to_string());
        if current.moved_from(from) {
            Ok(())
        } else {
            Err(BrowserError::timeout("navigation", timeout))
        }
    }

    async fn click(&self, target: &ClickTarget) -> BrowserResult<()> {
        let mut state = self.portal.state();
        state.calls.push(format!("click {}", target.describe()));
        if state.missing.contains(target_selector(target)) {
            return Err(BrowserError::ElementNotFound(target.describe()));
        }
        state.clicks.push(target.clone());
        let held = match &mut state.inert_click {
            Some((inert, times)) if *inert == *target && *times > 0 => {
                *times -= 1;
                true
            }
            _ => false,
        };
        if !held {
            state.document += 1;
        }
        Ok(())
    }

    /// Typing stands in for the portal's submit-on-input fields.
    async fn type_text(&self, selector: &str, text: &str) -> BrowserResult<()> {
        let mut state = self.portal.state();
        if state.missing.contains(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        state.typed.push((selector.to_string(), text.to_string()));
        state.document += 1;
        Ok(())
    }

    async fn extract_text(
        &self,
        container: &str,
        _item: &str,
        fields: &[FieldSelector],
    ) -> Vec<ExtractedRecord> {
        let state = self.portal.state();
        if state.missing.contains(container) {
            return Vec::new();
        }
        if fields.is_empty() {
            return vec![ExtractedRecord::default(); state.menu.len()];
        }
        state.menu.clone()
    }

    async fn screenshot(&self, path: &Path) -> BrowserResult<()> {
        self.portal.state().screenshots.push(path.to_path_buf());
        Ok(())
    }

    async fn close(&mut self) -> BrowserResult<()> {
        self.portal.state().closes += 1;
        Ok(())
    }
}

/// Hands out pages from one [`FakePortal`], optionally held back by a gate.
pub struct CountingFactory {
    portal: FakePortal,
    opens: AtomicUsize,
    fail: bool,
    gate: Option<Arc<Notify>>,
}

impl CountingFactory {
    pub fn new(portal: FakePortal) -> Self {
        Self {
            portal,
            opens: AtomicUsize::new(0),
            fail: false,
            gate: None,
        }
    }

    pub fn failing(portal: FakePortal) -> Self {
        Self {
            fail: true,
            ..Self::new(portal)
        }
    }

    pub fn gated(portal: FakePortal, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(portal)
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for CountingFactory {
    async fn open(&self) -> BrowserResult<Box<dyn PageStepExecutor>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(BrowserError::Launch("chromium binary not found".into()));
        }
        Ok(Box::new(self.portal.page()))
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    fail: bool,
    panic: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str) -> NotifyResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.panic {
            panic!("mail transport crashed");
        }
        if self.fail {
            return Err(NotifyError::Rejected {
                status: 503,
                body: "backend unavailable".into(),
            });
        }
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FixedOtp {
    calls: AtomicUsize,
}

impl FixedOtp {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OneTimeCodeGenerator for FixedOtp {
    fn generate(&self, _secret: &SecretString) -> Result<String, OtpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(OTP_CODE.to_string())
    }
}

pub struct Harness {
    pub config: Arc<SlotwatchConfig>,
    pub portal: FakePortal,
    pub factory: Arc<CountingFactory>,
    pub notifier: Arc<RecordingNotifier>,
    pub otp: Arc<FixedOtp>,
}

impl Harness {
    pub fn new(portal: FakePortal) -> Self {
        let factory = Arc::new(CountingFactory::new(portal.clone()));
        Self::with_parts(portal, factory, RecordingNotifier::default())
    }

    pub fn with_parts(
        portal: FakePortal,
        factory: Arc<CountingFactory>,
        notifier: RecordingNotifier,
    ) -> Self {
        Self {
            config: Arc::new(fixture_config()),
            portal,
            factory,
            notifier: Arc::new(notifier),
            otp: Arc::new(FixedOtp::default()),
        }
    }

    pub fn checker(&self) -> AvailabilityChecker {
        AvailabilityChecker::new(
            Arc::clone(&self.config),
            credentials(),
            self.factory.clone(),
            self.notifier.clone(),
            self.otp.clone(),
        )
        .with_screenshot_path("diagnostics/error-screenshot.png")
    }
}
