//! Normalization of heterogeneous capacity payloads into [`CapacityRecord`].
//!
//! Three shapes reach this module: OpenAPI JSON elements, responses of the
//! portal's internal `retrieveMeshNo` endpoint (snake_case or camelCase keys,
//! WebSquare-formatted numbers), and the text of the portal's result frame.

use crate::constants::RESULT_IDS;
use crate::types::CapacityRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Text of the result frame keyed by logical field name (`subst_nm`, `vol1_1`, ...)
pub type DomFields = BTreeMap<String, String>;

static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,\s]").unwrap());
static NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d\-.]").unwrap());

static RESULT_SELECTORS: Lazy<Vec<(&'static str, Selector)>> = Lazy::new(|| {
    RESULT_IDS
        .iter()
        .map(|(key, id)| (*key, Selector::parse(&format!("#{id}")).unwrap()))
        .collect()
});

/// Strip separators and units from a WebSquare number: `"159,,000"` -> `"159000"`, `"13,000kW"` -> `"13000"`.
pub fn clean_number(text: &str) -> String {
    let cleaned = SEPARATORS.replace_all(text.trim(), "");
    if cleaned.is_empty() {
        return "0".to_string();
    }
    let digits = NON_NUMERIC.replace_all(&cleaned, "");
    if digits.is_empty() {
        "0".to_string()
    } else {
        digits.into_owned()
    }
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// First present key wins; mirrors `d.get(a, d.get(b, default))`.
fn lookup(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| map.get(*k))
        .and_then(value_to_text)
}

fn lookup_text(map: &Map<String, Value>, keys: &[&str]) -> String {
    lookup(map, keys).unwrap_or_default()
}

fn lookup_number(map: &Map<String, Value>, keys: &[&str]) -> String {
    clean_number(&lookup(map, keys).unwrap_or_else(|| "0".to_string()))
}

/// Convert one OpenAPI element. Malformed elements are dropped by the caller.
pub fn record_from_api_value(value: &Value) -> Option<CapacityRecord> {
    if !value.is_object() {
        return None;
    }
    match serde_json::from_value::<CapacityRecord>(value.clone()) {
        Ok(record) => Some(record),
        Err(e) => {
            debug!("Skipping malformed OpenAPI record: {}", e);
            None
        }
    }
}

/// Convert one object of the portal's internal API, accepting either key casing.
pub fn record_from_portal_map(map: &Map<String, Value>) -> Option<CapacityRecord> {
    let subst_nm = lookup_text(map, &["subst_nm", "substNm"]);
    let dl_nm = lookup_text(map, &["dl_nm", "dlNm"]);
    if subst_nm.is_empty() && dl_nm.is_empty() {
        return None;
    }

    Some(CapacityRecord {
        subst_cd: lookup_text(map, &["subst_cd", "substCd"]),
        subst_nm,
        js_subst_pwr: lookup_number(map, &["js_subst_pwr", "jsSubstPwr"]),
        subst_pwr: lookup_number(map, &["subst_pwr", "substPwr"]),
        mtr_no: lookup_text(map, &["mtr_no", "mtrNo"]),
        js_mtr_pwr: lookup_number(map, &["js_mtr_pwr", "jsMtrPwr"]),
        mtr_pwr: lookup_number(map, &["mtr_pwr", "mtrPwr"]),
        dl_cd: lookup_text(map, &["dl_cd", "dlCd"]),
        dl_nm,
        js_dl_pwr: lookup_number(map, &["js_dl_pwr", "jsDlPwr"]),
        dl_pwr: lookup_number(map, &["dl_pwr", "dlPwr"]),
        vol1: lookup_number(map, &["vol1", "subst_vol1"]),
        vol2: lookup_number(map, &["vol2", "mtr_vol2"]),
        vol3: lookup_number(map, &["vol3", "dl_vol3"]),
    })
}

/// Extract records from a `retrieveMeshNo` response of unknown shape.
pub fn parse_portal_response(data: &Value) -> Vec<CapacityRecord> {
    let Some(obj) = data.as_object() else {
        return Vec::new();
    };

    for key in ["dma_result", "dlt_result", "result", "data"] {
        match obj.get(key) {
            Some(Value::Object(inner)) => {
                return record_from_portal_map(inner).into_iter().collect();
            }
            Some(Value::Array(items)) if !items.is_empty() => {
                let records: Vec<CapacityRecord> = items
                    .iter()
                    .filter_map(Value::as_object)
                    .filter_map(record_from_portal_map)
                    .collect();
                if !records.is_empty() {
                    return records;
                }
            }
            _ => {}
        }
    }

    let has_name = |k: &str| obj.get(k).and_then(value_to_text).is_some_and(|s| !s.is_empty());
    if has_name("subst_nm") || has_name("dl_nm") {
        return record_from_portal_map(obj).into_iter().collect();
    }
    Vec::new()
}

/// Read the result frame's element texts out of page HTML.
///
/// The frame may be hidden (`display:none`) while still holding data, so visibility is ignored.
pub fn extract_dom_fields(html: &str) -> DomFields {
    let document = Html::parse_document(html);
    RESULT_SELECTORS
        .iter()
        .map(|(key, selector)| {
            let text = document
                .select(selector)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .unwrap_or_default();
            (key.to_string(), text)
        })
        .collect()
}

/// Build a record from result-frame text. Empty when neither substation nor DL is shown.
pub fn record_from_dom_fields(fields: &DomFields) -> Vec<CapacityRecord> {
    let get = |k: &str| fields.get(k).map(|s| s.trim().to_string()).unwrap_or_default();
    let num = |k: &str| clean_number(&get(k));

    let subst_nm = get("subst_nm");
    let dl_nm = get("dl_nm");
    if subst_nm.is_empty() && dl_nm.is_empty() {
        warn!("Result frame is empty: {:?}", fields);
        return Vec::new();
    }

    let record = CapacityRecord {
        subst_nm,
        mtr_no: get("mtr_no"),
        dl_nm,
        js_subst_pwr: num("subst_capa"),
        subst_pwr: num("subst_pwr"),
        js_mtr_pwr: num("mtr_capa"),
        mtr_pwr: num("mtr_pwr"),
        js_dl_pwr: num("dl_capa"),
        dl_pwr: num("dl_pwr"),
        vol1: num("vol1_1"),
        vol2: num("vol2_1"),
        vol3: num("vol3_1"),
        ..Default::default()
    };

    debug!(
        subst = %record.subst_nm,
        mtr = %record.mtr_no,
        dl = %record.dl_nm,
        vol1 = %record.vol1,
        vol2 = %record.vol2,
        vol3 = %record.vol3,
        "Parsed result frame"
    );
    vec![record]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clean_number_handles_websquare_formats() {
        assert_eq!(clean_number("13000"), "13000");
        assert_eq!(clean_number("13,000"), "13000");
        assert_eq!(clean_number("159,,000"), "159000");
        assert_eq!(clean_number("  50 000  "), "50000");
        assert_eq!(clean_number("0"), "0");
        assert_eq!(clean_number(""), "0");
        assert_eq!(clean_number("  "), "0");
        assert_eq!(clean_number("20,,167"), "20167");
        assert_eq!(clean_number("13,000kW"), "13000");
        assert_eq!(clean_number("kW"), "0");
        assert_eq!(clean_number("-1,200.5"), "-1200.5");
    }

    #[test]
    fn portal_map_accepts_both_casings() {
        let snake = json!({"subst_nm": "사이", "dl_nm": "불당1", "vol1": "1,000", "mtr_vol2": 500, "dl_vol3": "20"});
        let record = record_from_portal_map(snake.as_object().unwrap()).unwrap();
        assert_eq!(record.vol1, "1000");
        assert_eq!(record.vol2, "500");
        assert_eq!(record.vol3, "20");

        let camel = json!({"substNm": "사이", "dlNm": "불당1", "jsDlPwr": "13,,000"});
        let record = record_from_portal_map(camel.as_object().unwrap()).unwrap();
        assert_eq!(record.subst_nm, "사이");
        assert_eq!(record.js_dl_pwr, "13000");
        assert_eq!(record.vol1, "0");
    }

    #[test]
    fn portal_map_without_names_is_dropped() {
        let empty = json!({"vol1": "100"});
        assert!(record_from_portal_map(empty.as_object().unwrap()).is_none());
    }

    #[test]
    fn portal_response_key_priority() {
        let nested = json!({
            "dma_result": {"subst_nm": "A", "dl_nm": "A1"},
            "data": [{"subst_nm": "B", "dl_nm": "B1"}]
        });
        let records = parse_portal_response(&nested);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subst_nm, "A");

        let list = json!({"dlt_result": [{"subst_nm": "B", "dl_nm": "B1"}, {"subst_nm": "C", "dl_nm": "C1"}, 7]});
        assert_eq!(parse_portal_response(&list).len(), 2);

        let top = json!({"subst_nm": "T", "vol3": "9"});
        assert_eq!(parse_portal_response(&top)[0].dl_capacity(), 9);

        assert!(parse_portal_response(&json!({"_raw": "<html>"})).is_empty());
        assert!(parse_portal_response(&json!([1, 2])).is_empty());
    }

    #[test]
    fn empty_list_falls_through_to_next_key() {
        let data = json!({"dlt_result": [], "result": {"dl_nm": "X"}});
        let records = parse_portal_response(&data);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].dl_nm, "X");
    }

    #[test]
    fn dom_fields_to_record() {
        let fields: DomFields = [
            ("subst_nm", "사이변전소"),
            ("mtr_no", "#2"),
            ("dl_nm", "불당1"),
            ("subst_capa", "180,,000"),
            ("subst_pwr", "20,,167"),
            ("vol1_1", "159,,833"),
            ("vol1_2", "162,,062"),
            ("mtr_capa", "50,,000"),
            ("mtr_pwr", "0"),
            ("vol2_1", "50,,000"),
            ("dl_capa", "13,,000"),
            ("dl_pwr", "0"),
            ("vol3_1", "13,,000"),
            ("dl_yn", "배전선로 : 여유용량 있음"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let records = record_from_dom_fields(&fields);
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.subst_nm, "사이변전소");
        assert_eq!(r.mtr_no, "#2");
        assert_eq!(r.vol1, "159833");
        assert_eq!(r.vol2, "50000");
        assert_eq!(r.vol3, "13000");
        assert_eq!(r.js_subst_pwr, "180000");
        assert_eq!(r.substation_capacity(), 159833);
        assert!(r.is_connectable());
    }

    #[test]
    fn empty_dom_fields_yield_nothing() {
        let fields: DomFields = [("subst_nm", ""), ("dl_nm", "")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(record_from_dom_fields(&fields).is_empty());
    }

    #[test]
    fn extracts_hidden_result_frame_from_html() {
        let html = r#"<html><body>
            <div id="mf_wfm_layout_wframe01" style="display:none">
              <span id="mf_wfm_layout_wframe01_txt_subst_nm_label"> 사이변전소 </span>
              <span id="mf_wfm_layout_wframe01_txt_dl_nm_label">불당1</span>
              <span id="mf_wfm_layout_wframe01_txt_dl_vol3_dsc_1">13,,000</span>
            </div></body></html>"#;
        let fields = extract_dom_fields(html);
        assert_eq!(fields["subst_nm"], "사이변전소");
        assert_eq!(fields["mtr_no"], "");
        let records = record_from_dom_fields(&fields);
        assert_eq!(records[0].dl_capacity(), 13000);
    }
}
