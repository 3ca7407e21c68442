//! Address handling: free-form keyword parsing and the legal-dong (법정동) code table.

use crate::constants::ALL;
use crate::error::{CapacityError, Result};
use crate::types::{AddressParams, OnlineRegion, RegionInfo};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::info;

const DONG_SUFFIXES: [&str; 6] = ["읍", "면", "동", "리", "로", "길"];

fn ends_with_any(token: &str, suffixes: &[&str]) -> bool {
    suffixes.iter().any(|s| token.ends_with(s))
}

fn split_keyword(keyword: &str) -> Result<Vec<&str>> {
    let parts: Vec<&str> = keyword.split_whitespace().collect();
    if parts.is_empty() {
        return Err(CapacityError::scraper("검색 키워드가 비어있습니다."));
    }
    Ok(parts)
}

/// Positional split: sido, si, gu, dong, jibun in token order.
pub fn parse_keyword_positional(keyword: &str) -> Result<OnlineRegion> {
    let parts = split_keyword(keyword)?;
    let at = |i: usize| parts.get(i).map(|s| s.to_string()).unwrap_or_default();
    Ok(OnlineRegion {
        sido: at(0),
        si: at(1),
        gu: at(2),
        dong: at(3),
        li: String::new(),
        jibun: at(4),
    })
}

/// Suffix-aware split used by the keyword engines.
///
/// `"세종특별자치시 조치원읍"` puts 조치원읍 in `dong`, `"충청남도 천안시 서북구 불당동"` fills all four levels.
pub fn parse_keyword_to_region(keyword: &str) -> Result<OnlineRegion> {
    let parts = split_keyword(keyword)?;
    let mut region = OnlineRegion {
        sido: parts[0].to_string(),
        ..Default::default()
    };

    if let Some(token) = parts.get(1) {
        let token = token.to_string();
        if ends_with_any(&token, &["시", "군"]) {
            region.si = token;
        } else if token.ends_with('구') {
            region.gu = token;
        } else if ends_with_any(&token, &DONG_SUFFIXES) {
            region.dong = token;
        } else {
            region.si = token;
        }
    }

    if let Some(token) = parts.get(2) {
        let token = token.to_string();
        if ends_with_any(&token, &["구", "군"]) {
            region.gu = token;
        } else if ends_with_any(&token, &DONG_SUFFIXES) {
            region.dong = token;
        } else if region.gu.is_empty() {
            region.gu = token;
        } else {
            region.dong = token;
        }
    }

    if let Some(token) = parts.get(3) {
        let token = token.to_string();
        if ends_with_any(&token, &DONG_SUFFIXES) || region.dong.is_empty() {
            region.dong = token;
        } else {
            region.jibun = token;
        }
    }

    if parts.len() >= 5 && region.jibun.is_empty() {
        region.jibun = parts[4..].join(" ");
    }

    Ok(region)
}

/// Split a sigungu name into portal `si` and `gu`.
///
/// `"천안시 서북구"` -> (천안시, 서북구); single-level cities such as 세종 have neither.
pub fn split_sigungu(sigungu: &str, sido: &str) -> (String, String) {
    let sigungu = sigungu.trim();
    if sigungu.is_empty() || sigungu == sido {
        return (String::new(), String::new());
    }
    let parts: Vec<&str> = sigungu.split_whitespace().collect();
    if parts.len() >= 2 {
        (parts[0].to_string(), parts[1..].join(" "))
    } else {
        (sigungu.to_string(), String::new())
    }
}

/// One row of the legal-dong code table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BdongRow {
    #[serde(rename = "시도코드", default)]
    pub sido_cd: String,
    #[serde(rename = "시도명", default)]
    pub sido_nm: String,
    #[serde(rename = "시군구코드", default)]
    pub sigungu_cd: String,
    #[serde(rename = "시군구명", default)]
    pub sigungu_nm: String,
    #[serde(rename = "읍면동명", default)]
    pub dong_nm: String,
    #[serde(rename = "동리명", default)]
    pub ri_nm: String,
    /// Set when the code was retired
    #[serde(rename = "말소일자", default)]
    pub retired_at: Option<String>,
}

impl BdongRow {
    fn is_active(&self) -> bool {
        self.retired_at.as_deref().map_or(true, |d| d.trim().is_empty())
    }
}

/// Active legal-dong codes, used for the region cascade and OpenAPI parameters
#[derive(Debug, Clone, Default)]
pub struct BdongTable {
    rows: Vec<BdongRow>,
}

impl BdongTable {
    pub fn from_rows(rows: Vec<BdongRow>) -> Self {
        Self {
            rows: rows.into_iter().filter(BdongRow::is_active).collect(),
        }
    }

    /// Load a JSON array of rows keyed by the Korean column names.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CapacityError::Address(format!("법정동코드 로드 실패 '{}': {}", path.display(), e))
        })?;
        let rows: Vec<BdongRow> = serde_json::from_str(&content)
            .map_err(|e| CapacityError::Address(format!("법정동코드 로드 실패: {}", e)))?;
        let table = Self::from_rows(rows);
        info!("법정동코드 로드 완료: {}건 (현행)", table.len());
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn in_sigungu<'a>(&'a self, sido: &'a str, sigungu: &'a str) -> impl Iterator<Item = &'a BdongRow> + 'a {
        // Cities without a sigungu level (세종) are stored with an empty sigungu name
        let target = if sigungu == sido { "" } else { sigungu };
        self.rows
            .iter()
            .filter(move |r| r.sido_nm == sido && r.sigungu_nm == target)
    }

    fn sorted_unique<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
        values
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn sido_list(&self) -> Vec<String> {
        Self::sorted_unique(self.rows.iter().map(|r| r.sido_nm.as_str()))
    }

    /// Falls back to `[sido]` for cities without a sigungu level.
    pub fn sigungu_list(&self, sido: &str) -> Vec<String> {
        let result = Self::sorted_unique(
            self.rows
                .iter()
                .filter(|r| r.sido_nm == sido)
                .map(|r| r.sigungu_nm.as_str()),
        );
        if result.is_empty() {
            vec![sido.to_string()]
        } else {
            result
        }
    }

    pub fn dong_list(&self, sido: &str, sigungu: &str) -> Vec<String> {
        Self::sorted_unique(self.in_sigungu(sido, sigungu).map(|r| r.dong_nm.as_str()))
    }

    pub fn ri_list(&self, sido: &str, sigungu: &str, dong: &str) -> Vec<String> {
        if dong.is_empty() || dong == ALL {
            return Vec::new();
        }
        Self::sorted_unique(
            self.in_sigungu(sido, sigungu)
                .filter(|r| r.dong_nm == dong)
                .map(|r| r.ri_nm.as_str())
                .filter(|ri| *ri != ALL),
        )
    }

    /// Resolve a region to OpenAPI parameters.
    pub fn to_kepco_params(&self, region: &RegionInfo) -> Result<AddressParams> {
        let row = if region.sido == region.sigungu {
            // Skip the whole-sido code (36000); the real district code ends in 110
            self.rows.iter().find(|r| {
                r.sido_nm == region.sido && r.sigungu_nm.is_empty() && r.sigungu_cd.ends_with("110")
            })
        } else {
            self.rows
                .iter()
                .find(|r| r.sido_nm == region.sido && r.sigungu_nm == region.sigungu)
        };

        let row = row.ok_or_else(|| {
            CapacityError::Address(format!(
                "'{} {}'에 해당하는 법정동코드를 찾을 수 없습니다.",
                region.sido, region.sigungu
            ))
        })?;

        let sido_cd = format!("{:0>2}", row.sido_cd.trim());
        let sigungu_cd = format!("{:0>5}", row.sigungu_cd.trim());

        let dong = if !region.dong.is_empty() && region.dong != ALL {
            region.dong.clone()
        } else {
            String::new()
        };
        let ri = if !dong.is_empty() && !region.ri.is_empty() && region.ri != ALL {
            region.ri.clone()
        } else {
            String::new()
        };

        Ok(AddressParams {
            metro_cd: sido_cd,
            city_cd: sigungu_cd.chars().skip(2).collect(),
            dong,
            ri,
            jibun: String::new(),
        })
    }
}
