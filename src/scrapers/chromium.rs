//! Chromium page driver using chromiumoxide.

use super::browser::{BrowserLauncher, BrowserOptions, PageDriver};
use crate::constants::USER_AGENT;
use crate::error::{CapacityError, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const LAUNCH_ARGS: [&str; 12] = [
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-blink-features=AutomationControlled",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-ipc-flooding-protection",
    "--force-color-profile=srgb",
    "--metrics-recording-only",
    "--no-first-run",
];

/// Runs before any page script: hides automation markers and swallows dialogs.
const STEALTH_JS: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    window.chrome = { runtime: {}, loadTimes: function(){}, csi: function(){} };
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    Object.defineProperty(navigator, 'languages', { get: () => ['ko-KR', 'ko', 'en-US', 'en'] });
    Object.defineProperty(navigator, 'language', { get: () => 'ko-KR' });
    window.alert = function() {};
    window.confirm = function() { return false; };
    window.prompt = function() { return null; };
"#;

const SYSTEM_CHROMIUM: [&str; 4] = ["chromium", "chromium-browser", "google-chrome", "google-chrome-stable"];

fn find_system_chromium() -> Option<PathBuf> {
    SYSTEM_CHROMIUM.iter().find_map(|name| which::which(name).ok())
}

pub struct ChromiumLauncher {
    options: BrowserOptions,
}

impl ChromiumLauncher {
    pub fn new(options: BrowserOptions) -> Self {
        Self { options }
    }

    fn config(&self, executable: Option<&PathBuf>) -> Result<BrowserConfig> {
        let mut builder = BrowserConfig::builder()
            .viewport(Some(Viewport {
                width: 1400,
                height: 900,
                ..Default::default()
            }))
            .args(LAUNCH_ARGS)
            .arg(format!("--user-agent={USER_AGENT}"))
            .arg("--lang=ko-KR")
            .request_timeout(self.options.page_load_timeout);
        if !self.options.headless {
            builder = builder.with_head();
        }
        if let Some(path) = executable {
            builder = builder.chrome_executable(path);
        }
        builder
            .build()
            .map_err(|e| CapacityError::EngineUnavailable(format!("browser config error: {e}")))
    }

    async fn start(&self, executable: Option<&PathBuf>) -> Result<(Browser, JoinHandle<()>)> {
        let (browser, mut handler) = Browser::launch(self.config(executable)?)
            .await
            .map_err(|e| CapacityError::scraper(format!("Chromium 실행 실패: {e}")))?;
        let handle = tokio::spawn(async move { while handler.next().await.is_some() {} });
        Ok((browser, handle))
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>> {
        // Configured or bundled binary first, then whatever Chromium is on PATH
        let (browser, handle) = match self.start(self.options.executable.as_ref()).await {
            Ok(started) => started,
            Err(first) => {
                warn!("Chromium launch failed: {}", first);
                let Some(system) = find_system_chromium() else {
                    return Err(CapacityError::EngineUnavailable(
                        "Chromium 브라우저를 실행할 수 없습니다. chromium 설치 또는 CHROMIUM_PATH 설정을 확인하세요.".into(),
                    ));
                };
                info!("Retrying with system Chromium at {}", system.display());
                self.start(Some(&system)).await.map_err(|e| {
                    CapacityError::EngineUnavailable(format!("브라우저 실행 실패 (시스템 chromium 포함): {e}"))
                })?
            }
        };

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handle.abort();
                return Err(CapacityError::scraper(format!("failed to create page: {e}")));
            }
        };
        if let Err(e) = page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_JS)).await {
            debug!("stealth script injection failed: {}", e);
        }

        Ok(Box::new(ChromiumPage {
            browser,
            page,
            handle,
        }))
    }
}

pub struct ChromiumPage {
    browser: Browser,
    page: Page,
    handle: JoinHandle<()>,
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(CapacityError::scraper(format!("navigation failed: {e}"))),
            Err(_) => Err(CapacityError::scraper(format!(
                "navigation timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| CapacityError::scraper(format!("JS execution failed: {e}")))?;
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| CapacityError::scraper(format!("failed to read page content: {e}")))
    }

    async fn click(&self, element_id: &str) -> Result<bool> {
        let Ok(element) = self.page.find_element(format!("#{element_id}")).await else {
            return Ok(false);
        };
        element
            .click()
            .await
            .map_err(|e| CapacityError::scraper(format!("click on #{element_id} failed: {e}")))?;
        Ok(true)
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            debug!("browser close failed: {}", e);
        }
        self.handle.abort();
        Ok(())
    }
}
