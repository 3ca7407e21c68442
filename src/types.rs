use crate::constants::ALL;
use crate::error::Result;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

fn zero() -> String {
    "0".to_string()
}

/// First present key wins, the OpenAPI casing before snake_case. Numbers are taken as
/// their text; null, booleans, objects and arrays are rejected.
fn field_text(map: &Map<String, Value>, keys: &[&str], default: &str) -> std::result::Result<String, String> {
    let Some((key, value)) = keys.iter().find_map(|k| map.get(*k).map(|v| (*k, v))) else {
        return Ok(default.to_string());
    };
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("field `{key}` must be a string or number, got {other}")),
    }
}

/// Parse a capacity string as a float and truncate toward zero; garbage reads as 0.
pub fn parse_capacity(raw: &str) -> i64 {
    match raw.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => v.trunc() as i64,
        _ => 0,
    }
}

/// One distribution line (DL) with the spare capacity of its substation, transformer and line.
///
/// Field names follow the OpenAPI (`substNm`, `jsDlPwr`, ...); snake_case keys are accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityRecord {
    #[serde(rename = "substCd")]
    pub subst_cd: String,
    #[serde(rename = "substNm")]
    pub subst_nm: String,
    /// Substation capacity (kW)
    #[serde(rename = "jsSubstPwr")]
    pub js_subst_pwr: String,
    /// Generation already connected to the substation (kW)
    #[serde(rename = "substPwr")]
    pub subst_pwr: String,

    #[serde(rename = "mtrNo")]
    pub mtr_no: String,
    #[serde(rename = "jsMtrPwr")]
    pub js_mtr_pwr: String,
    #[serde(rename = "mtrPwr")]
    pub mtr_pwr: String,

    #[serde(rename = "dlCd")]
    pub dl_cd: String,
    #[serde(rename = "dlNm")]
    pub dl_nm: String,
    #[serde(rename = "jsDlPwr")]
    pub js_dl_pwr: String,
    #[serde(rename = "dlPwr")]
    pub dl_pwr: String,

    /// Substation spare capacity (kW)
    pub vol1: String,
    /// Transformer spare capacity (kW)
    pub vol2: String,
    /// DL spare capacity (kW)
    pub vol3: String,
}

impl Default for CapacityRecord {
    fn default() -> Self {
        Self {
            subst_cd: String::new(),
            subst_nm: String::new(),
            js_subst_pwr: zero(),
            subst_pwr: zero(),
            mtr_no: String::new(),
            js_mtr_pwr: zero(),
            mtr_pwr: zero(),
            dl_cd: String::new(),
            dl_nm: String::new(),
            js_dl_pwr: zero(),
            dl_pwr: zero(),
            vol1: zero(),
            vol2: zero(),
            vol3: zero(),
        }
    }
}

impl TryFrom<Map<String, Value>> for CapacityRecord {
    type Error = String;

    fn try_from(map: Map<String, Value>) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            subst_cd: field_text(&map, &["substCd", "subst_cd"], "")?,
            subst_nm: field_text(&map, &["substNm", "subst_nm"], "")?,
            js_subst_pwr: field_text(&map, &["jsSubstPwr", "js_subst_pwr"], "0")?,
            subst_pwr: field_text(&map, &["substPwr", "subst_pwr"], "0")?,
            mtr_no: field_text(&map, &["mtrNo", "mtr_no"], "")?,
            js_mtr_pwr: field_text(&map, &["jsMtrPwr", "js_mtr_pwr"], "0")?,
            mtr_pwr: field_text(&map, &["mtrPwr", "mtr_pwr"], "0")?,
            dl_cd: field_text(&map, &["dlCd", "dl_cd"], "")?,
            dl_nm: field_text(&map, &["dlNm", "dl_nm"], "")?,
            js_dl_pwr: field_text(&map, &["jsDlPwr", "js_dl_pwr"], "0")?,
            dl_pwr: field_text(&map, &["dlPwr", "dl_pwr"], "0")?,
            vol1: field_text(&map, &["vol1"], "0")?,
            vol2: field_text(&map, &["vol2"], "0")?,
            vol3: field_text(&map, &["vol3"], "0")?,
        })
    }
}

impl<'de> Deserialize<'de> for CapacityRecord {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Self::try_from(map).map_err(D::Error::custom)
    }
}

impl CapacityRecord {
    pub fn substation_capacity(&self) -> i64 {
        parse_capacity(&self.vol1)
    }

    pub fn transformer_capacity(&self) -> i64 {
        parse_capacity(&self.vol2)
    }

    pub fn dl_capacity(&self) -> i64 {
        parse_capacity(&self.vol3)
    }

    /// The binding constraint: a new plant can only connect up to the smallest headroom.
    pub fn min_capacity(&self) -> i64 {
        self.substation_capacity()
            .min(self.transformer_capacity())
            .min(self.dl_capacity())
    }

    pub fn is_connectable(&self) -> bool {
        self.min_capacity() > 0
    }
}

/// Query parameters for the OpenAPI, derived from the legal-dong code table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressParams {
    /// Sido code (2 digits)
    pub metro_cd: String,
    /// Last 3 digits of the sigungu code
    pub city_cd: String,
    #[serde(default)]
    pub dong: String,
    #[serde(default)]
    pub ri: String,
    #[serde(default)]
    pub jibun: String,
}

/// Region picked from the sido/sigungu/dong/ri cascade
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub sido: String,
    pub sigungu: String,
    #[serde(default = "all")]
    pub dong: String,
    #[serde(default)]
    pub ri: String,
}

fn all() -> String {
    ALL.to_string()
}

impl RegionInfo {
    pub fn new(sido: impl Into<String>, sigungu: impl Into<String>) -> Self {
        Self {
            sido: sido.into(),
            sigungu: sigungu.into(),
            dong: all(),
            ri: String::new(),
        }
    }

    pub fn with_dong(mut self, dong: impl Into<String>) -> Self {
        self.dong = dong.into();
        self
    }

    pub fn with_ri(mut self, ri: impl Into<String>) -> Self {
        self.ri = ri.into();
        self
    }

    fn has_dong(&self) -> bool {
        !self.dong.is_empty() && self.dong != ALL
    }

    pub fn display_name(&self) -> String {
        let mut parts = vec![self.sido.as_str(), self.sigungu.as_str()];
        if self.has_dong() {
            parts.push(&self.dong);
            if !self.ri.is_empty() && self.ri != ALL {
                parts.push(&self.ri);
            }
        }
        parts.join(" ")
    }
}

/// Address as entered into the portal's cascading form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineRegion {
    pub sido: String,
    pub si: String,
    pub gu: String,
    pub dong: String,
    pub li: String,
    pub jibun: String,
}

impl OnlineRegion {
    pub fn label(&self) -> String {
        [&self.sido, &self.si, &self.gu, &self.dong]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Core trait that all capacity engines must implement
#[async_trait::async_trait]
pub trait CapacityEngine: Send + Sync {
    /// Unique identifier for this engine
    fn engine_name(&self) -> &'static str;

    /// Look up spare capacity for a free-form address keyword
    async fn fetch_by_keyword(&self, keyword: &str) -> Result<Vec<CapacityRecord>>;
}
