//! Client for the KEPCO big-data portal OpenAPI (`dispersedGeneration.do`).

use crate::config::Settings;
use crate::error::{CapacityError, Result};
use crate::normalize::record_from_api_value;
use crate::types::{AddressParams, CapacityRecord};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const MAX_TRANSPORT_ATTEMPTS: u32 = 3;
const MAX_BACKOFF: Duration = Duration::from_secs(8);

pub struct KepcoApiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    delay: Duration,
    backoff: Duration,
}

/// Objects under `data`, or a bare top-level array.
fn extract_records(payload: &Value) -> Vec<&Value> {
    let items = match payload {
        Value::Object(obj) => match obj.get("data") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        Value::Array(items) => items.as_slice(),
        _ => &[],
    };
    items.iter().filter(|v| v.is_object()).collect()
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

impl KepcoApiClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(CapacityError::api(
                "KEPCO_API_KEY가 설정되지 않았습니다. 환경변수(.env 포함) 또는 kepco.toml에 KEPCO_API_KEY를 설정하세요.",
                None,
            ));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.to_string(),
            delay: Duration::ZERO,
            backoff: Duration::from_secs(1),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::new(
            &settings.kepco_api_key,
            &settings.kepco_api_base_url,
            settings.api_timeout(),
        )?
        .with_delay(settings.api_delay()))
    }

    /// Fixed pause before every request, for rate-limited keys.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// First backoff step for transport retries; doubles up to 8s.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    async fn send_with_retry(&self, params: &AddressParams) -> Result<reqwest::Response> {
        let query = [
            ("metroCd", params.metro_cd.as_str()),
            ("cityCd", params.city_cd.as_str()),
            ("addrLidong", params.dong.as_str()),
            ("addrLi", params.ri.as_str()),
            ("addrJibun", params.jibun.as_str()),
            ("apiKey", self.api_key.as_str()),
            ("returnType", "json"),
        ];

        let mut wait = self.backoff;
        let mut attempt = 1;
        loop {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.client.get(&self.base_url).query(&query).send().await {
                Ok(resp) => return Ok(resp),
                Err(e) if is_transient(&e) && attempt < MAX_TRANSPORT_ATTEMPTS => {
                    warn!("OpenAPI transport error (attempt {}/{}): {}", attempt, MAX_TRANSPORT_ATTEMPTS, e);
                    tokio::time::sleep(wait).await;
                    wait = (wait * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err(e) if e.is_timeout() => {
                    return Err(CapacityError::api(format!("한전 API 요청 시간 초과: {e}"), None))
                }
                Err(e) => return Err(CapacityError::api(format!("한전 API 네트워크 오류: {e}"), None)),
            }
        }
    }

    /// Look up spare capacity for one region.
    #[instrument(skip(self), fields(metro = %params.metro_cd, city = %params.city_cd))]
    pub async fn fetch_capacity(&self, params: &AddressParams) -> Result<Vec<CapacityRecord>> {
        let resp = self.send_with_retry(params).await?;
        let status = resp.status().as_u16();
        if status >= 400 {
            return Err(CapacityError::api(format!("한전 API HTTP 오류: {status}"), Some(status)));
        }

        let body = resp.bytes().await?;
        let payload: Value = serde_json::from_slice(&body)
            .map_err(|_| CapacityError::api("한전 API 응답 JSON 파싱 실패", Some(status)))?;

        let raw_records = extract_records(&payload);
        if raw_records.is_empty() {
            // An empty or null `message` falls through to `resultMsg`
            let msg = ["message", "resultMsg"]
                .iter()
                .filter_map(|key| payload.get(*key).and_then(Value::as_str))
                .find(|m| !m.is_empty());
            let message = match msg {
                Some(m) => format!("한전 API 응답에 데이터가 없습니다: {m}"),
                None => "한전 API 응답에 데이터가 없습니다".to_string(),
            };
            return Err(CapacityError::NoData {
                message,
                status: Some(status),
            });
        }

        let records: Vec<CapacityRecord> = raw_records
            .into_iter()
            .filter_map(record_from_api_value)
            .collect();
        if records.is_empty() {
            return Err(CapacityError::api(
                "한전 API 응답 파싱 실패 (레코드 검증 실패)",
                Some(status),
            ));
        }

        debug!("OpenAPI payload parsed into {} records", records.len());
        info!("Fetched {} records from OpenAPI", records.len());
        Ok(records)
    }
}
