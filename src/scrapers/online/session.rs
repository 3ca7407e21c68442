//! Replay of the portal's own `retrieveMeshNo` XHR over a cookie-keeping HTTP session.

use crate::constants::{ACCEPT_LANGUAGE, RETRIEVE_MESH_NO_PATH, USER_AGENT};
use crate::error::{CapacityError, Result};
use crate::normalize::parse_portal_response;
use crate::types::{CapacityRecord, OnlineRegion};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE as ACCEPT_LANGUAGE_HEADER, REFERER};
use reqwest::Url;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Address-type codes tried in order: blank (default), then `5` (lot number)
const ADDRESS_GBN: [&str; 2] = ["", "5"];
const RAW_BODY_LIMIT: usize = 2000;

pub struct PortalSession {
    client: reqwest::Client,
    page_url: String,
    endpoint: Url,
}

impl PortalSession {
    /// Load the portal page once so the session cookies are set.
    pub async fn open(page_url: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Url::parse(page_url)
            .and_then(|base| base.join(RETRIEVE_MESH_NO_PATH))
            .map_err(|e| CapacityError::Config(format!("invalid portal URL '{page_url}': {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE_HEADER, HeaderValue::from_static(ACCEPT_LANGUAGE));

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .cookie_store(true)
            .timeout(timeout)
            .build()?;

        let resp = client.get(page_url).send().await?;
        debug!("Portal page loaded with status {}", resp.status());

        Ok(Self {
            client,
            page_url: page_url.to_string(),
            endpoint,
        })
    }

    /// One `retrieveMeshNo` call. Non-JSON bodies come back as `{"_raw": ...}`.
    pub async fn retrieve_mesh_no(&self, region: &OnlineRegion, gbn: &str) -> Result<Value> {
        let jibun = if region.jibun.is_empty() { "1" } else { region.jibun.as_str() };
        let body = json!({
            "dma_addrGbn": {
                "gbn": gbn,
                "addr_do": region.sido,
                "addr_si": region.si,
                "addr_gu": region.gu,
                "addr_lidong": region.dong,
                "addr_li": region.li,
                "addr_jibun": jibun,
            }
        });

        let resp = self
            .client
            .post(self.endpoint.clone())
            .header(ACCEPT, "application/json, text/javascript, */*")
            .header(REFERER, &self.page_url)
            .header("X-Requested-With", "XMLHttpRequest")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CapacityError::scraper(format!("retrieveMeshNo HTTP {}", status.as_u16())));
        }

        let text = resp.text().await?;
        Ok(serde_json::from_str(&text).unwrap_or_else(|_| {
            let raw: String = text.chars().take(RAW_BODY_LIMIT).collect();
            json!({ "_raw": raw })
        }))
    }

    /// Try each address type; first non-empty result wins. Per-call failures are logged.
    pub async fn fetch_capacity(&self, region: &OnlineRegion) -> Vec<CapacityRecord> {
        for gbn in ADDRESS_GBN {
            match self.retrieve_mesh_no(region, gbn).await {
                Ok(payload) => {
                    let records = parse_portal_response(&payload);
                    if !records.is_empty() {
                        info!("L1 internal API returned {} records (gbn={:?})", records.len(), gbn);
                        return records;
                    }
                    debug!("L1 gbn={:?} returned no usable records", gbn);
                }
                Err(e) => warn!("L1 gbn={:?} failed: {}", gbn, e),
            }
        }
        Vec::new()
    }
}
