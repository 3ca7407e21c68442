//! DOM automation of the portal's WebSquare address form.

use crate::constants::{
    ALL, BUNJI_OPTION_TIMEOUT_MS, MAX_SEARCH_CLICKS, POLL_INTERVAL_MS, SEARCH_BUTTON_ID, SEARCH_BUTTON_TEXT,
    SEARCH_RESULT_TIMEOUT_MS, SELECT_BUNJI, SELECT_GU, SELECT_LI, SELECT_LIDONG,
    SELECT_OPTION_TIMEOUT_MS, SELECT_PLACEHOLDER, SELECT_SI, SELECT_SIDO, WS_READY_TIMEOUT_MS,
};
use crate::constants::result_ready_ids;
use crate::error::{CapacityError, Result};
use crate::normalize::{extract_dom_fields, record_from_dom_fields};
use crate::scrapers::browser::PageDriver;
use crate::types::{CapacityRecord, OnlineRegion};
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// The operations the automation needs from the address form.
#[async_trait]
pub trait PortalForm: Send + Sync {
    async fn load(&mut self, url: &str) -> Result<()>;
    /// Whether the WebSquare runtime (`$w`) is up.
    async fn websquare_ready(&self) -> Result<bool>;
    /// Visible option texts of a select, in order.
    async fn select_options(&self, select_id: &str) -> Result<Vec<String>>;
    /// Choose the option with this label. `false` when nothing was selected.
    async fn set_select(&self, select_id: &str, label: &str) -> Result<bool>;
    async fn click(&self, element_id: &str) -> Result<bool>;
    /// Click the first button whose text contains `text`.
    async fn click_button_with_text(&self, text: &str) -> Result<bool>;
    /// Whether any of these elements has non-empty text.
    async fn any_text(&self, element_ids: &[&str]) -> Result<bool>;
    async fn html(&self) -> Result<String>;
}

/// Wait budgets for the automation
#[derive(Debug, Clone)]
pub struct DomTiming {
    pub websquare_ready: Duration,
    pub select_options: Duration,
    pub bunji_options: Duration,
    pub search_result: Duration,
    pub poll_interval: Duration,
    /// Pause after a selection or click so the form can react
    pub settle: Duration,
    pub max_search_clicks: u32,
}

impl Default for DomTiming {
    fn default() -> Self {
        Self {
            websquare_ready: Duration::from_millis(WS_READY_TIMEOUT_MS),
            select_options: Duration::from_millis(SELECT_OPTION_TIMEOUT_MS),
            bunji_options: Duration::from_millis(BUNJI_OPTION_TIMEOUT_MS),
            search_result: Duration::from_millis(SEARCH_RESULT_TIMEOUT_MS),
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            settle: Duration::from_millis(500),
            max_search_clicks: MAX_SEARCH_CLICKS,
        }
    }
}

fn is_placeholder(option: &str) -> bool {
    option.is_empty() || option == SELECT_PLACEHOLDER || option.ends_with(SELECT_PLACEHOLDER)
}

fn meaningful(options: &[String]) -> Vec<&str> {
    options
        .iter()
        .map(|o| o.trim())
        .filter(|o| !is_placeholder(o))
        .collect()
}

/// Match `value` against option texts: exact, then option contains value, then value contains option.
pub fn find_best_option(value: &str, options: &[String]) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    let candidates = meaningful(options);
    candidates
        .iter()
        .find(|o| **o == value)
        .or_else(|| candidates.iter().find(|o| o.contains(value)))
        .or_else(|| candidates.iter().find(|o| value.contains(**o)))
        .map(|o| o.to_string())
}

/// Poll `check` until it yields true or `timeout` passes.
async fn poll_until<F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(true) = check().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(interval).await;
    }
}

/// Runs the form: cascade selects, bunji, search clicks, result parsing.
pub struct DomAutomation<'a, F: PortalForm + ?Sized> {
    form: &'a mut F,
    timing: DomTiming,
}

impl<'a, F: PortalForm + ?Sized> DomAutomation<'a, F> {
    pub fn new(form: &'a mut F, timing: DomTiming) -> Self {
        Self { form, timing }
    }

    async fn wait_for_options(&self, select_id: &str, timeout: Duration) -> bool {
        let form = &*self.form;
        poll_until(timeout, self.timing.poll_interval, || async move {
            let options = form.select_options(select_id).await?;
            Ok(!meaningful(&options).is_empty())
        })
        .await
    }

    async fn settle(&self) {
        if !self.timing.settle.is_zero() {
            tokio::time::sleep(self.timing.settle).await;
        }
    }

    /// Fill sido → si → gu → lidong → li, skipping levels that are empty or "전체".
    pub async fn select_address(&self, region: &OnlineRegion) -> Result<()> {
        let steps = [
            ("sido", SELECT_SIDO, region.sido.as_str()),
            ("si", SELECT_SI, region.si.as_str()),
            ("gu", SELECT_GU, region.gu.as_str()),
            ("lidong", SELECT_LIDONG, region.dong.as_str()),
            ("li", SELECT_LI, region.li.as_str()),
        ];

        for (name, select_id, value) in steps {
            let value = value.trim();
            if value.is_empty() || value == ALL {
                continue;
            }
            if !self.wait_for_options(select_id, self.timing.select_options).await {
                debug!("'{}' options did not load within the wait budget", name);
            }

            let options = self.form.select_options(select_id).await?;
            if meaningful(&options).is_empty() {
                return Err(CapacityError::scraper(format!(
                    "'{name}' select 옵션 로딩 실패 (봇탐지/차단 가능)"
                )));
            }
            let Some(label) = find_best_option(value, &options) else {
                let sample: Vec<&str> = meaningful(&options).into_iter().take(10).collect();
                return Err(CapacityError::scraper(format!(
                    "'{name}' 옵션에서 '{value}'을(를) 찾지 못했습니다. 후보: {sample:?}"
                )));
            };
            if !self.form.set_select(select_id, &label).await? {
                return Err(CapacityError::scraper(format!("'{name}' 선택 실패: '{label}'")));
            }
            debug!("Selected {} = {}", name, label);
            self.settle().await;
        }
        Ok(())
    }

    /// Pick the lot number. Never fails the lookup.
    pub async fn select_bunji(&self, jibun: &str) {
        if !self.wait_for_options(SELECT_BUNJI, self.timing.bunji_options).await {
            debug!("bunji options did not load");
        }
        let options = match self.form.select_options(SELECT_BUNJI).await {
            Ok(options) => options,
            Err(e) => {
                warn!("bunji select unavailable: {}", e);
                return;
            }
        };
        if options.len() <= 1 {
            return;
        }

        let jibun = jibun.trim();
        let label = if !jibun.is_empty() && options.iter().any(|o| o.trim() == jibun) {
            jibun.to_string()
        } else {
            options[1].trim().to_string()
        };
        match self.form.set_select(SELECT_BUNJI, &label).await {
            Ok(true) => {
                debug!("Selected bunji = {}", label);
                self.settle().await;
            }
            Ok(false) => warn!("bunji '{}' could not be selected", label),
            Err(e) => warn!("bunji selection failed: {}", e),
        }
    }

    /// Click search until a result field fills in.
    pub async fn search(&self) -> Result<bool> {
        let ids = result_ready_ids();
        let form = &*self.form;
        for click in 1..=self.timing.max_search_clicks {
            if !self.form.click(SEARCH_BUTTON_ID).await?
                && !self.form.click_button_with_text(SEARCH_BUTTON_TEXT).await?
            {
                return Err(CapacityError::scraper("검색 버튼을 찾을 수 없습니다."));
            }
            let ids = &ids;
            let ready = poll_until(self.timing.search_result, self.timing.poll_interval, || async move {
                form.any_text(ids).await
            })
            .await;
            if ready {
                debug!("Results appeared after {} click(s)", click);
                return Ok(true);
            }
            warn!("No results after search click {}/{}", click, self.timing.max_search_clicks);
            self.settle().await;
        }
        Ok(false)
    }

    pub async fn parse_results(&self) -> Result<Vec<CapacityRecord>> {
        let html = self.form.html().await?;
        Ok(record_from_dom_fields(&extract_dom_fields(&html)))
    }

    /// Full L2 run against `url`.
    pub async fn run(&mut self, url: &str, region: &OnlineRegion) -> Result<Vec<CapacityRecord>> {
        self.form.load(url).await?;

        let form = &*self.form;
        if !poll_until(self.timing.websquare_ready, self.timing.poll_interval, || async move {
            form.websquare_ready().await
        })
        .await
        {
            warn!("WebSquare runtime not detected; continuing");
        }

        self.select_address(region).await?;
        self.select_bunji(&region.jibun).await;
        self.search().await?;

        let records = self.parse_results().await?;
        if records.is_empty() {
            return Err(CapacityError::scraper(format!(
                "'{}' 검색 결과를 DOM에서 찾지 못했습니다.",
                region.label()
            )));
        }
        info!("L2 DOM automation returned {} records", records.len());
        Ok(records)
    }
}

fn js_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

/// WebSquare component id behind a native select: `mf_wfm_layout_sbx_sido_input_0` -> `wfm_layout_sbx_sido`.
pub fn websquare_component_id(select_id: &str) -> &str {
    let id = select_id.strip_prefix("mf_").unwrap_or(select_id);
    id.strip_suffix("_input_0").unwrap_or(id)
}

/// `PortalForm` over a live page, talking to WebSquare through injected JavaScript.
pub struct WebSquareForm {
    driver: Box<dyn PageDriver>,
    page_load_timeout: Duration,
}

impl WebSquareForm {
    pub fn new(driver: Box<dyn PageDriver>, page_load_timeout: Duration) -> Self {
        Self {
            driver,
            page_load_timeout,
        }
    }

    pub async fn close(self) -> Result<()> {
        self.driver.close().await
    }
}

#[async_trait]
impl PortalForm for WebSquareForm {
    async fn load(&mut self, url: &str) -> Result<()> {
        self.driver.goto(url, self.page_load_timeout).await
    }

    async fn websquare_ready(&self) -> Result<bool> {
        let value = self
            .driver
            .evaluate("typeof $w !== 'undefined' && typeof $w.getComponentById === 'function'")
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn select_options(&self, select_id: &str) -> Result<Vec<String>> {
        let script = format!(
            "(() => {{ const el = document.getElementById({id}); \
             if (!el || !el.options) return []; \
             return Array.from(el.options).map(o => (o.text || '').trim()); }})()",
            id = js_string(select_id)
        );
        let value = self.driver.evaluate(&script).await?;
        Ok(value
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default())
    }

    async fn set_select(&self, select_id: &str, label: &str) -> Result<bool> {
        // WebSquare item scan first so its change handlers fire, then the native element
        let script = format!(
            "(() => {{ const label = {label}; \
             try {{ if (typeof $w !== 'undefined') {{ \
               const comp = $w.getComponentById({comp_id}); \
               if (comp) {{ \
                 const count = comp.getItemCount ? comp.getItemCount() : 0; \
                 for (let i = 0; i < count; i++) {{ \
                   const text = comp.getItemText ? String(comp.getItemText(i) || '') : ''; \
                   if (text && (text === label || text.indexOf(label) >= 0 || label.indexOf(text) >= 0)) {{ \
                     comp.setSelectedIndex(i); return 'ws_api'; }} \
                 }} \
                 if (typeof comp.setValue === 'function') {{ comp.setValue(label); return 'ws_setValue'; }} \
               }} }} \
             }} catch (e) {{}} \
             const el = document.getElementById({id}); \
             if (!el || !el.options) return ''; \
             const texts = Array.from(el.options).map(o => (o.text || '').trim()); \
             let idx = texts.indexOf(label); \
             if (idx < 0) idx = texts.findIndex(t => t && t.indexOf(label) >= 0); \
             if (idx < 0) return ''; \
             el.selectedIndex = idx; \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return 'native'; }})()",
            comp_id = js_string(websquare_component_id(select_id)),
            id = js_string(select_id),
            label = js_string(label)
        );
        let value = self.driver.evaluate(&script).await?;
        let method = value.as_str().unwrap_or_default();
        if method.is_empty() {
            warn!("could not select '{}' on {}", label, select_id);
            return Ok(false);
        }
        debug!("Selected '{}' on {} via {}", label, select_id, method);
        Ok(true)
    }

    async fn click(&self, element_id: &str) -> Result<bool> {
        self.driver.click(element_id).await
    }

    async fn click_button_with_text(&self, text: &str) -> Result<bool> {
        let script = format!(
            "(() => {{ const text = {text}; \
             for (const b of document.querySelectorAll('button, input[type=button], a[role=\"button\"], div[role=\"button\"]')) {{ \
               if ((b.textContent || b.value || '').includes(text)) {{ b.click(); return true; }} }} \
             return false; }})()",
            text = js_string(text)
        );
        Ok(self.driver.evaluate(&script).await?.as_bool().unwrap_or(false))
    }

    async fn any_text(&self, element_ids: &[&str]) -> Result<bool> {
        let ids = Value::from(element_ids.to_vec()).to_string();
        let script = format!(
            "(() => {{ for (const id of {ids}) {{ const el = document.getElementById(id); \
             if (el && (el.innerText || el.textContent || '').trim()) return true; }} \
             return false; }})()"
        );
        Ok(self.driver.evaluate(&script).await?.as_bool().unwrap_or(false))
    }

    async fn html(&self) -> Result<String> {
        self.driver.content().await
    }
}
