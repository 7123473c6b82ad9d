use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig as ChromiumConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::cdp::browser_protocol::target::CreateTargetParams;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ChromiumSection, SlotwatchConfig};

use super::error::{BrowserError, BrowserResult};
use super::profile::BrowserProfile;

#[derive(Debug, Clone)]
pub struct ViewportSpec {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct BrowserLauncher {
    chromium: ChromiumSection,
    user_agent: String,
    profile_root: PathBuf,
}

impl BrowserLauncher {
    pub fn new(config: &SlotwatchConfig) -> Self {
        Self {
            chromium: config.chromium.clone(),
            user_agent: config.portal.user_agent.clone(),
            profile_root: std::env::temp_dir().join("slotwatch-profiles"),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn launch(&self) -> BrowserResult<BrowserAutomation> {
        let profile = BrowserProfile::allocate(&self.profile_root)?;
        let viewport = self.select_viewport();
        let chromium_config = self.build_chromium_config(&profile, &viewport)?;
        info!(
            profile = %profile.id(),
            width = viewport.width,
            height = viewport.height,
            headless = self.chromium.headless,
            "Launching Chromium instance"
        );

        let (browser, mut handler) = match Browser::launch(chromium_config).await {
            Ok(pair) => pair,
            Err(err) => {
                profile.remove().await;
                return Err(BrowserError::Launch(err.to_string()));
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(error = %err, "Chromium handler reported error");
                }
            }
        });

        Ok(BrowserAutomation {
            browser,
            profile,
            handler_task: Some(handler_task),
            user_agent: self.user_agent.clone(),
        })
    }

    fn select_viewport(&self) -> ViewportSpec {
        let [width, height] = self.chromium.window_size;
        let jitter = self.chromium.viewport_jitter_pixels as i32;
        let mut rng = rand::thread_rng();
        let width = (width as i32 + rng.gen_range(-jitter..=jitter)).clamp(640, 2560) as u32;
        let height = (height as i32 + rng.gen_range(-jitter..=jitter)).clamp(480, 1600) as u32;
        ViewportSpec { width, height }
    }

    fn build_chromium_config(
        &self,
        profile: &BrowserProfile,
        viewport: &ViewportSpec,
    ) -> BrowserResult<ChromiumConfig> {
        let mut builder = ChromiumConfig::builder()
            .user_data_dir(profile.path())
            .viewport(ChromiumViewport {
                width: viewport.width,
                height: viewport.height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: viewport.width >= viewport.height,
                has_touch: false,
            });

        if let Some(executable) = &self.chromium.executable_path {
            builder = builder.chrome_executable(executable);
        }
        if !self.chromium.headless {
            builder = builder.with_head();
        }
        if !self.chromium.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(timeout) = self.chromium.request_timeout_seconds {
            builder = builder.request_timeout(Duration::from_secs(timeout));
        }

        let mut args = vec![
            format!("--user-agent={}", self.user_agent),
            format!("--window-size={},{}", viewport.width, viewport.height),
            "--no-first-run".to_string(),
            "--disable-features=AutomationControlled".to_string(),
            "--password-store=basic".to_string(),
        ];
        if self.chromium.disable_gpu {
            args.push("--disable-gpu".into());
        }
        builder = builder.args(args);

        builder.build().map_err(BrowserError::Configuration)
    }
}

#[derive(Debug)]
pub struct BrowserAutomation {
    browser: Browser,
    profile: BrowserProfile,
    handler_task: Option<JoinHandle<()>>,
    user_agent: String,
}

impl BrowserAutomation {
    pub async fn new_context(&self) -> BrowserResult<BrowserContext> {
        let params = CreateTargetParams::new("about:blank");
        let page = self.browser.new_page(params).await?;
        self.configure_page(&page).await?;
        Ok(BrowserContext { page })
    }

    pub async fn shutdown(mut self) -> BrowserResult<()> {
        info!(profile = %self.profile.id(), "Shutting down Chromium instance");
        if let Err(err) = self.browser.close().await {
            warn!(error = %err, "Failed to close browser gracefully");
        }
        if let Some(handle) = self.handler_task.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "Browser handler join error");
            }
        }
        self.profile.remove().await;
        Ok(())
    }

    async fn configure_page(&self, page: &Page) -> BrowserResult<()> {
        page.enable_stealth_mode_with_agent(&self.user_agent)
            .await?;
        let params = SetUserAgentOverrideParams::builder()
            .user_agent(self.user_agent.clone())
            .build()
            .map_err(BrowserError::Configuration)?;
        page.set_user_agent(params).await?;
        Ok(())
    }
}

impl Drop for BrowserAutomation {
    fn drop(&mut self) {
        if let Some(handle) = &self.handler_task {
            if !handle.is_finished() {
                warn!(
                    profile = %self.profile.id(),
                    "BrowserAutomation dropped without explicit shutdown"
                );
            }
        }
    }
}

#[derive(Debug)]
pub struct BrowserContext {
    page: Page,
}

impl BrowserContext {
    pub fn page(&self) -> &Page {
        &self.page
    }

    pub async fn goto(&self, url: &str) -> BrowserResult<()> {
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.page.goto(params).await?;
        self.page.wait_for_navigation().await?;
        Ok(())
    }
}
