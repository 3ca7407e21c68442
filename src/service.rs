//! Retry and engine fallback around the scrapers, plus the API-first lookup.

use crate::address::{parse_keyword_to_region, BdongTable};
use crate::apis::KepcoApiClient;
use crate::config::{seconds, Settings};
use crate::constants::{
    ALL, BOT_DETECTION_DELAY_SECONDS, BOT_KEYWORDS, MAX_RETRIES, OPENAPI_SOURCE, RETRY_DELAY_SECONDS,
};
use crate::error::{CapacityError, Result};
use crate::scrapers::{default_engines, KepcoOnlineScraper};
use crate::types::{CapacityEngine, CapacityRecord, OnlineRegion, RegionInfo};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Source label for lookups answered by the online scraper directly
pub const ONLINE_LABEL: &str = "kepco_online";
const BROWSER_FAILURE_HEADER: &str = "모든 브라우저 자동화 엔진이 실패했습니다.";
const BROWSER_FAILURE_HINT: &str =
    "해결: Chromium 설치 여부와 `--features browser` 빌드, CHROMIUM_PATH 설정을 확인하세요.";

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub bot_detection_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            retry_delay: Duration::from_secs_f64(RETRY_DELAY_SECONDS),
            bot_detection_delay: Duration::from_secs_f64(BOT_DETECTION_DELAY_SECONDS),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_attempts: settings.retry.max_attempts,
            retry_delay: seconds(settings.retry.delay_seconds),
            bot_detection_delay: seconds(settings.retry.bot_detection_delay_seconds),
        }
    }

    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            retry_delay: Duration::ZERO,
            bot_detection_delay: Duration::ZERO,
        }
    }
}

/// Whether the failure looks like the portal pushing back on automation.
pub fn is_bot_detection_error(err: &CapacityError) -> bool {
    let text = err.message().to_lowercase();
    BOT_KEYWORDS.iter().any(|kw| text.contains(kw))
}

/// Linear backoff: the base delay (longer for bot detection) times the attempt number.
pub fn retry_delay(policy: &RetryPolicy, err: &CapacityError, attempt: u32) -> Duration {
    let base = if is_bot_detection_error(err) {
        policy.bot_detection_delay
    } else {
        policy.retry_delay
    };
    base.saturating_mul(attempt)
}

/// Run `op` up to `policy.max_attempts` times. Unavailable-engine errors abort at once;
/// otherwise the last error is returned.
pub async fn retry_with_policy<T, F, Fut>(label: &str, policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        info!("[{}] attempt {}/{}", label, attempt, max_attempts);
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if err.is_unavailable() {
            error!("[{}] engine unavailable, not retrying: {}", label, err);
            return Err(err);
        }
        if attempt >= max_attempts {
            error!("[{}] failed after {} attempts: {}", label, max_attempts, err);
            return Err(err);
        }

        let delay = retry_delay(policy, &err, attempt);
        if is_bot_detection_error(&err) {
            warn!("[{}] bot detection suspected, waiting {:?}: {}", label, delay, err);
        } else {
            warn!("[{}] attempt {} failed, retrying in {:?}: {}", label, attempt, delay, err);
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        attempt += 1;
    }
}

/// Browser-engine fallback chain with per-engine retries.
pub struct ScraperService {
    engines: Vec<Box<dyn CapacityEngine>>,
    online: Arc<KepcoOnlineScraper>,
    policy: RetryPolicy,
}

impl ScraperService {
    pub fn new(
        engines: Vec<Box<dyn CapacityEngine>>,
        online: Arc<KepcoOnlineScraper>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            engines,
            online,
            policy,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            default_engines(settings),
            Arc::new(KepcoOnlineScraper::from_settings(settings)),
            RetryPolicy::from_settings(settings),
        )
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Engine names in the order they are tried.
    pub fn engine_order(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.engine_name()).collect()
    }

    pub async fn run_engine_with_retry(
        &self,
        engine: &dyn CapacityEngine,
        keyword: &str,
    ) -> Result<Vec<CapacityRecord>> {
        retry_with_policy(engine.engine_name(), &self.policy, move || engine.fetch_by_keyword(keyword)).await
    }

    /// Like `fetch_capacity_by_browser`, also naming the engine that answered.
    pub async fn fetch_with_engine(&self, keyword: &str) -> Result<(&'static str, Vec<CapacityRecord>)> {
        let mut failures = Vec::new();
        for engine in &self.engines {
            let name = engine.engine_name();
            info!("Trying engine '{}'", name);
            match self.run_engine_with_retry(engine.as_ref(), keyword).await {
                Ok(records) => {
                    info!("Engine '{}' returned {} records", name, records.len());
                    return Ok((name, records));
                }
                Err(e) => {
                    warn!("Engine '{}' failed, falling back: {}", name, e);
                    failures.push(format!("  - {}: {}", name, e.message()));
                }
            }
        }

        let mut lines = vec![BROWSER_FAILURE_HEADER.to_string()];
        lines.extend(failures);
        lines.push(BROWSER_FAILURE_HINT.to_string());
        Err(CapacityError::scraper(lines.join("\n")))
    }

    /// Try each engine in order; the first success wins, even with zero records.
    #[instrument(skip(self))]
    pub async fn fetch_capacity_by_browser(&self, keyword: &str) -> Result<Vec<CapacityRecord>> {
        self.fetch_with_engine(keyword).await.map(|(_, records)| records)
    }

    /// Region-form lookup on the online scraper under the retry policy.
    #[instrument(skip(self))]
    pub async fn fetch_capacity_by_online(
        &self,
        sido: &str,
        sigungu: &str,
        dong: &str,
        ri: &str,
        jibun: &str,
    ) -> Result<Vec<CapacityRecord>> {
        let online = &self.online;
        retry_with_policy(ONLINE_LABEL, &self.policy, move || {
            online.fetch_capacity_by_region(sido, sigungu, dong, ri, jibun)
        })
        .await
    }

    /// Lookup of an already parsed portal address on the online scraper under the retry policy.
    #[instrument(skip(self, region), fields(region = %region.label()))]
    pub async fn fetch_online_region(&self, region: &OnlineRegion) -> Result<Vec<CapacityRecord>> {
        let online = &self.online;
        retry_with_policy(ONLINE_LABEL, &self.policy, move || online.fetch_capacity(region)).await
    }
}

/// What to look up
#[derive(Debug, Clone)]
pub enum LookupQuery {
    /// Free-form address such as "충청남도 천안시 서북구 불당동"
    Keyword(String),
    Region { region: RegionInfo, jibun: String },
}

#[derive(Debug, Clone)]
pub struct LookupResult {
    /// `openapi` or the name of the scraper engine that answered
    pub source: String,
    pub records: Vec<CapacityRecord>,
}

/// The OpenAPI address shape of a parsed keyword; `si` and `gu` join into the sigungu.
pub fn region_from_keyword(region: &OnlineRegion) -> RegionInfo {
    let sigungu = [region.si.as_str(), region.gu.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    let sigungu = if sigungu.is_empty() { region.sido.clone() } else { sigungu };
    let mut info = RegionInfo::new(region.sido.clone(), sigungu);
    if !region.dong.is_empty() {
        info = info.with_dong(region.dong.clone());
    }
    info.with_ri(region.li.clone())
}

/// OpenAPI first when a key is configured and the address resolves, otherwise the scrapers.
pub struct CapacityLookup {
    api: Option<KepcoApiClient>,
    codes: Option<BdongTable>,
    scrapers: ScraperService,
}

impl CapacityLookup {
    pub fn new(api: Option<KepcoApiClient>, codes: Option<BdongTable>, scrapers: ScraperService) -> Self {
        Self { api, codes, scrapers }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let api = if settings.has_api_key() {
            Some(KepcoApiClient::from_settings(settings)?)
        } else {
            None
        };
        let codes = match &settings.bdong_codes_path {
            Some(path) => Some(BdongTable::load(path)?),
            None => None,
        };
        Ok(Self::new(api, codes, ScraperService::from_settings(settings)))
    }

    pub fn scrapers(&self) -> &ScraperService {
        &self.scrapers
    }

    pub fn codes(&self) -> Option<&BdongTable> {
        self.codes.as_ref()
    }

    async fn try_api(&self, region: &RegionInfo, jibun: &str) -> Option<Vec<CapacityRecord>> {
        let (api, codes) = (self.api.as_ref()?, self.codes.as_ref()?);
        let mut params = match codes.to_kepco_params(region) {
            Ok(params) => params,
            Err(e) => {
                warn!("Address not resolvable for the OpenAPI: {}", e);
                return None;
            }
        };
        params.jibun = jibun.to_string();

        match api.fetch_capacity(&params).await {
            Ok(records) => Some(records),
            Err(e) => {
                warn!("OpenAPI lookup failed, falling back to scrapers: {}", e);
                None
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn lookup(&self, query: &LookupQuery) -> Result<LookupResult> {
        match query {
            LookupQuery::Keyword(keyword) => {
                if self.api.is_some() {
                    let parsed = parse_keyword_to_region(keyword)?;
                    if let Some(records) = self.try_api(&region_from_keyword(&parsed), &parsed.jibun).await {
                        return Ok(LookupResult {
                            source: OPENAPI_SOURCE.to_string(),
                            records,
                        });
                    }
                }
                let (engine, records) = self.scrapers.fetch_with_engine(keyword).await?;
                Ok(LookupResult {
                    source: engine.to_string(),
                    records,
                })
            }
            LookupQuery::Region { region, jibun } => {
                if let Some(records) = self.try_api(region, jibun).await {
                    return Ok(LookupResult {
                        source: OPENAPI_SOURCE.to_string(),
                        records,
                    });
                }
                let dong = if region.dong == ALL { "" } else { region.dong.as_str() };
                let records = self
                    .scrapers
                    .fetch_capacity_by_online(&region.sido, &region.sigungu, dong, &region.ri, jibun)
                    .await?;
                Ok(LookupResult {
                    source: ONLINE_LABEL.to_string(),
                    records,
                })
            }
        }
    }
}
