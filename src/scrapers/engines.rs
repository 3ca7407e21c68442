//! Keyword engines tried in order by the fallback chain.

use crate::address::{parse_keyword_positional, parse_keyword_to_region};
use crate::config::Settings;
use crate::constants::{LEGACY_ENGINE, ONLINE_ENGINE, PORTAL_ENGINE};
use crate::error::Result;
use crate::scrapers::online::KepcoOnlineScraper;
use crate::types::{CapacityEngine, CapacityRecord};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Positional keyword split against the main portal page.
pub struct OnlineEngine {
    scraper: Arc<KepcoOnlineScraper>,
}

impl OnlineEngine {
    pub fn new(scraper: Arc<KepcoOnlineScraper>) -> Self {
        Self { scraper }
    }
}

#[async_trait]
impl CapacityEngine for OnlineEngine {
    fn engine_name(&self) -> &'static str {
        ONLINE_ENGINE
    }

    #[instrument(skip(self), fields(engine = ONLINE_ENGINE))]
    async fn fetch_by_keyword(&self, keyword: &str) -> Result<Vec<CapacityRecord>> {
        let region = parse_keyword_positional(keyword)?;
        debug!("Parsed keyword into {:?}", region);
        self.scraper.fetch_capacity(&region).await
    }
}

/// Suffix-aware keyword split against the main portal page.
pub struct PortalEngine {
    scraper: Arc<KepcoOnlineScraper>,
}

impl PortalEngine {
    pub fn new(scraper: Arc<KepcoOnlineScraper>) -> Self {
        Self { scraper }
    }
}

#[async_trait]
impl CapacityEngine for PortalEngine {
    fn engine_name(&self) -> &'static str {
        PORTAL_ENGINE
    }

    #[instrument(skip(self), fields(engine = PORTAL_ENGINE))]
    async fn fetch_by_keyword(&self, keyword: &str) -> Result<Vec<CapacityRecord>> {
        let region = parse_keyword_to_region(keyword)?;
        debug!("Parsed keyword into {:?}", region);
        self.scraper.fetch_capacity(&region).await
    }
}

/// Suffix-aware keyword split on its own portal session. The alternate site
/// (`kepco_on_capacity_url`) no longer serves capacity data, so it is not scraped.
pub struct LegacyEngine {
    scraper: Arc<KepcoOnlineScraper>,
}

impl LegacyEngine {
    pub fn new(scraper: Arc<KepcoOnlineScraper>) -> Self {
        Self { scraper }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(Arc::new(KepcoOnlineScraper::from_settings(settings)))
    }

    pub fn url(&self) -> &str {
        self.scraper.url()
    }
}

#[async_trait]
impl CapacityEngine for LegacyEngine {
    fn engine_name(&self) -> &'static str {
        LEGACY_ENGINE
    }

    #[instrument(skip(self), fields(engine = LEGACY_ENGINE, url = %self.scraper.url()))]
    async fn fetch_by_keyword(&self, keyword: &str) -> Result<Vec<CapacityRecord>> {
        let region = parse_keyword_to_region(keyword)?;
        self.scraper.fetch_capacity(&region).await
    }
}

/// The default engine chain: online, portal, legacy.
pub fn default_engines(settings: &Settings) -> Vec<Box<dyn CapacityEngine>> {
    let main = Arc::new(KepcoOnlineScraper::from_settings(settings));
    vec![
        Box::new(OnlineEngine::new(main.clone())),
        Box::new(PortalEngine::new(main)),
        Box::new(LegacyEngine::from_settings(settings)),
    ]
}
