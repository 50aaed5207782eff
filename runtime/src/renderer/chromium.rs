//! Chromium renderer over the DevTools protocol.
//!
//! One browser process serves every capture. Each context is a separate
//! CDP browser context (its own cookie jar and storage) with a single page,
//! emulating the marketplace's locale, timezone and `Accept-Language`.

use super::{ContextOptions, NavigationResult, PageSnapshot, RenderContext, Renderer};
use crate::config::BrowserConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{BrowserContextId, CloseParams};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
    SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Binary names tried on `PATH` when no explicit path is configured.
const CHROMIUM_BINARIES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Locate a Chromium binary: `<home>/chromium/chrome`, then `PATH`.
pub fn find_chromium(home: &std::path::Path) -> Option<PathBuf> {
    let local = home.join("chromium").join("chrome");
    if local.exists() {
        return Some(local);
    }
    CHROMIUM_BINARIES
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// Shared headless Chromium process.
pub struct ChromiumRenderer {
    browser: Arc<Browser>,
    user_agent: String,
    handler: Mutex<Option<JoinHandle<()>>>,
}

impl ChromiumRenderer {
    /// Launch Chromium. `home` is searched for a bundled binary when the
    /// config does not name one.
    pub async fn launch(config: &BrowserConfig, home: &std::path::Path) -> Result<Self> {
        let executable = config
            .chromium_path
            .clone()
            .or_else(|| find_chromium(home))
            .ok_or_else(|| anyhow!("Chromium not found; set browser.chromium_path or ARGUS_CHROMIUM_PATH"))?;

        let mut builder = CdpBrowserConfig::builder()
            .chrome_executable(&executable)
            .window_size(config.window_width, config.window_height)
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled");
        if !config.headless {
            builder = builder.with_head();
        }
        if config.no_sandbox {
            builder = builder.no_sandbox();
        }
        let cdp_config = builder
            .build()
            .map_err(|e| anyhow!("invalid browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .with_context(|| format!("failed to launch Chromium at {}", executable.display()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "cdp handler error");
                }
            }
        });

        let user_agent = browser
            .user_agent()
            .await
            .context("failed to read browser user agent")?
            .replace("HeadlessChrome", "Chrome");

        info!(path = %executable.display(), "chromium launched");
        Ok(Self {
            browser: Arc::new(browser),
            user_agent,
            handler: Mutex::new(Some(handler_task)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self, options: &ContextOptions) -> Result<Box<dyn RenderContext>> {
        let created = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .context("failed to create browser context")?;

        let mut context = ChromiumContext {
            browser: Arc::clone(&self.browser),
            context_id: Some(created.result.browser_context_id.clone()),
            page: None,
        };

        match context.open_page(options, &self.user_agent).await {
            Ok(page) => {
                context.page = Some(page);
                Ok(Box::new(context))
            }
            Err(e) => {
                if let Err(close_err) = context.close().await {
                    warn!(error = %close_err, "failed to dispose half-open context");
                }
                Err(e)
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        if let Err(e) = self.browser.execute(CloseParams::default()).await {
            // The connection usually drops before the reply arrives.
            debug!(error = %e, "browser close returned error");
        }
        let handler = self
            .handler
            .lock()
            .map_err(|_| anyhow!("renderer handler lock poisoned"))?
            .take();
        if let Some(task) = handler {
            task.abort();
        }
        info!("chromium stopped");
        Ok(())
    }
}

/// One CDP browser context with a single page.
struct ChromiumContext {
    browser: Arc<Browser>,
    context_id: Option<BrowserContextId>,
    page: Option<Page>,
}

impl ChromiumContext {
    async fn open_page(&self, options: &ContextOptions, user_agent: &str) -> Result<Page> {
        let context_id = self
            .context_id
            .clone()
            .ok_or_else(|| anyhow!("browser context already disposed"))?;
        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id)
            .build()
            .map_err(|e| anyhow!("invalid target params: {e}"))?;
        let page = self
            .browser
            .new_page(target)
            .await
            .context("failed to open page")?;

        let (width, height) = options.viewport;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(width),
            i64::from(height),
            1.0,
            false,
        ))
        .await?;
        page.execute(SetTimezoneOverrideParams::new(options.timezone.clone()))
            .await
            .with_context(|| format!("failed to set timezone {}", options.timezone))?;
        page.execute(SetLocaleOverrideParams {
            locale: Some(options.locale.clone()),
        })
        .await
        .with_context(|| format!("failed to set locale {}", options.locale))?;
        let ua = SetUserAgentOverrideParams::builder()
            .user_agent(user_agent)
            .accept_language(options.accept_language.clone())
            .build()
            .map_err(|e| anyhow!("invalid user agent params: {e}"))?;
        page.execute(ua).await?;

        Ok(page)
    }

    fn page(&self) -> Result<&Page> {
        self.page.as_ref().ok_or_else(|| anyhow!("render context is closed"))
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<NavigationResult> {
        let started = Instant::now();
        let page = self.page()?;
        tokio::time::timeout(timeout, page.goto(url))
            .await
            .map_err(|_| anyhow!("navigation timed out after {} ms", timeout.as_millis()))?
            .with_context(|| format!("navigation to {url} failed"))?;

        let final_url = page.url().await?.unwrap_or_else(|| url.to_string());
        Ok(NavigationResult {
            final_url,
            load_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> Result<bool> {
        let page = self.page()?;
        let deadline = Instant::now() + timeout;
        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn snapshot(&mut self) -> Result<PageSnapshot> {
        let page = self.page()?;
        let final_url = page.url().await?.unwrap_or_default();
        let title = page.get_title().await?.unwrap_or_default();
        let html = page.content().await.context("failed to read page content")?;
        Ok(PageSnapshot {
            final_url,
            title,
            html,
        })
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>> {
        let page = self.page()?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        page.screenshot(params).await.context("page screenshot failed")
    }

    async fn element_screenshot(&mut self, selector: &str) -> Result<Option<Vec<u8>>> {
        let page = self.page()?;
        let Ok(element) = page.find_element(selector).await else {
            return Ok(None);
        };
        let bytes = element
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .with_context(|| format!("element screenshot failed for {selector}"))?;
        Ok(Some(bytes))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!(error = %e, "page close failed");
            }
        }
        if let Some(id) = self.context_id.take() {
            self.browser
                .execute(DisposeBrowserContextParams::new(id))
                .await
                .context("failed to dispose browser context")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_chromium_prefers_home_binary() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("chromium");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("chrome"), b"").unwrap();
        assert_eq!(find_chromium(dir.path()), Some(bin.join("chrome")));
    }
}
