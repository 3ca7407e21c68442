//! KEPCO ON (online.kepco.co.kr) spare-capacity scraper.
//!
//! Two layers, tried in order:
//! 1. replay of the portal's internal `retrieveMeshNo` API over an HTTP session
//! 2. DOM automation of the WebSquare form in a real browser

pub mod dom;
pub mod session;

use crate::address::split_sigungu;
use crate::config::Settings;
use crate::constants::DEBUG_DIR_NAME;
use crate::error::{CapacityError, Result};
use crate::scrapers::browser::{default_launcher, BrowserLauncher};
use crate::types::{CapacityRecord, OnlineRegion};
use dom::{DomAutomation, DomTiming, PortalForm, WebSquareForm};
use session::PortalSession;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub struct KepcoOnlineScraper {
    url: String,
    http_timeout: Duration,
    page_load_timeout: Duration,
    timing: DomTiming,
    launcher: Arc<dyn BrowserLauncher>,
    debug_dir: PathBuf,
}

impl KepcoOnlineScraper {
    pub fn new(url: impl Into<String>, launcher: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            url: url.into(),
            http_timeout: Duration::from_secs(30),
            page_load_timeout: Duration::from_secs(40),
            timing: DomTiming::default(),
            launcher,
            debug_dir: std::env::temp_dir().join(DEBUG_DIR_NAME),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::with_url(settings, &settings.kepco_online_url)
    }

    /// Same settings, different portal entry page.
    pub fn with_url(settings: &Settings, url: &str) -> Self {
        let timing = DomTiming {
            search_result: settings.result_timeout(),
            ..DomTiming::default()
        };
        Self::new(url, default_launcher(settings))
            .with_page_load_timeout(settings.page_load_timeout())
            .with_timing(timing)
    }

    pub fn with_page_load_timeout(mut self, timeout: Duration) -> Self {
        self.page_load_timeout = timeout;
        self.http_timeout = timeout;
        self
    }

    pub fn with_timing(mut self, timing: DomTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = dir.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_via_internal_api(&self, region: &OnlineRegion) -> Result<Vec<CapacityRecord>> {
        let session = PortalSession::open(&self.url, self.http_timeout).await?;
        Ok(session.fetch_capacity(region).await)
    }

    async fn fetch_via_dom(&self, region: &OnlineRegion) -> Result<Vec<CapacityRecord>> {
        let driver = self.launcher.launch().await?;
        let mut form = WebSquareForm::new(driver, self.page_load_timeout);

        let result = DomAutomation::new(&mut form, self.timing.clone())
            .run(&self.url, region)
            .await;
        if result.is_err() {
            self.save_debug_snapshot(&form, &region.label()).await;
        }
        if let Err(e) = form.close().await {
            warn!("browser close failed: {}", e);
        }
        result
    }

    /// Dump page HTML for post-mortem; failures are only logged.
    async fn save_debug_snapshot(&self, form: &dyn PortalForm, label: &str) {
        let html = match form.html().await {
            Ok(html) => html,
            Err(e) => {
                warn!("debug snapshot skipped: {}", e);
                return;
            }
        };
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let name = format!("{}_{}.html", label.replace(char::is_whitespace, "_"), stamp);
        let path = self.debug_dir.join(name);
        match fs::create_dir_all(&self.debug_dir).and_then(|_| fs::write(&path, html)) {
            Ok(()) => info!("Saved debug snapshot to {}", path.display()),
            Err(e) => warn!("debug snapshot write failed: {}", e),
        }
    }

    /// L1 then L2. Both failing yields one error listing every layer's failure.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch_capacity(&self, region: &OnlineRegion) -> Result<Vec<CapacityRecord>> {
        let label = region.label();
        let mut errors = Vec::new();

        match self.fetch_via_internal_api(region).await {
            Ok(records) if !records.is_empty() => return Ok(records),
            Ok(_) => info!("L1 internal API returned nothing for '{}'", label),
            Err(e) => {
                warn!("L1 internal API failed: {}", e);
                errors.push(format!("L1(JS API): {}", e.message()));
            }
        }

        let dom_err = match self.fetch_via_dom(region).await {
            Ok(records) => return Ok(records),
            Err(e) => e,
        };
        warn!("L2 DOM automation failed: {}", dom_err);
        errors.push(format!("L2(DOM): {}", dom_err.message()));

        let message = format!("'{}' 조회 실패 (모든 전략 소진).\n{}", label, errors.join("\n"));
        if dom_err.is_unavailable() {
            // No browser: retrying would only repeat the same failure
            return Err(CapacityError::EngineUnavailable(message));
        }
        Err(CapacityError::scraper(message))
    }

    /// Region-form entry point; a combined sigungu such as "천안시 서북구" is split into si and gu.
    pub async fn fetch_capacity_by_region(
        &self,
        sido: &str,
        sigungu: &str,
        dong: &str,
        li: &str,
        jibun: &str,
    ) -> Result<Vec<CapacityRecord>> {
        let (si, gu) = split_sigungu(sigungu, sido);
        let region = OnlineRegion {
            sido: sido.to_string(),
            si,
            gu,
            dong: dong.to_string(),
            li: li.to_string(),
            jibun: jibun.to_string(),
        };
        self.fetch_capacity(&region).await
    }
}
