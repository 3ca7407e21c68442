//! Browser seam for DOM automation.
//!
//! Defines the `BrowserLauncher` and `PageDriver` traits that abstract over
//! the browser engine (Chromium via chromiumoxide when the `browser` feature is on).

use crate::config::Settings;
use crate::error::{CapacityError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A single browser page.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for DOMContentLoaded, bounded by `timeout`.
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<()>;
    /// Evaluate a JavaScript expression; promises are awaited, `undefined` becomes null.
    async fn evaluate(&self, script: &str) -> Result<Value>;
    /// Full page HTML.
    async fn content(&self) -> Result<String>;
    /// Click the element with this DOM id. `false` when it does not exist.
    async fn click(&self, element_id: &str) -> Result<bool>;
    /// Close the page and its browser.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Starts browsers and hands out pages.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn PageDriver>>;
}

/// Launch settings shared by browser backends
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub headless: bool,
    pub page_load_timeout: Duration,
    pub executable: Option<PathBuf>,
}

impl BrowserOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            headless: settings.browser_headless,
            page_load_timeout: settings.page_load_timeout(),
            executable: settings.chromium_path.clone(),
        }
    }
}

/// Launcher used when the crate is built without a browser backend.
pub struct NoopLauncher;

#[async_trait]
impl BrowserLauncher for NoopLauncher {
    async fn launch(&self) -> Result<Box<dyn PageDriver>> {
        Err(CapacityError::EngineUnavailable(
            "브라우저 드라이버가 설치되어 있지 않습니다. `--features browser`로 빌드하세요.".into(),
        ))
    }
}

/// Pick the best available launcher for this build.
#[cfg(feature = "browser")]
pub fn default_launcher(settings: &Settings) -> Arc<dyn BrowserLauncher> {
    Arc::new(super::chromium::ChromiumLauncher::new(BrowserOptions::from_settings(settings)))
}

#[cfg(not(feature = "browser"))]
pub fn default_launcher(_settings: &Settings) -> Arc<dyn BrowserLauncher> {
    Arc::new(NoopLauncher)
}
