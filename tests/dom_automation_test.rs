use anyhow::Result;
use async_trait::async_trait;
use kepco_capacity::constants::{
    SEARCH_BUTTON_ID, SEARCH_BUTTON_TEXT, SELECT_BUNJI, SELECT_GU, SELECT_LIDONG, SELECT_SI, SELECT_SIDO,
};
use kepco_capacity::error::Result as CapacityResult;
use kepco_capacity::scrapers::online::dom::{DomAutomation, DomTiming, PortalForm};
use kepco_capacity::service::is_bot_detection_error;
use kepco_capacity::types::OnlineRegion;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const RESULT_HTML: &str = r#"<html><body><div id="result" style="display:none">
    <span id="mf_wfm_layout_wframe01_txt_subst_nm_label">조치원</span>
    <span id="mf_wfm_layout_wframe01_txt_mtr_no_label">#2</span>
    <span id="mf_wfm_layout_wframe01_txt_dl_nm_label">신안</span>
    <span id="mf_wfm_layout_wframe01_txt_subst_vol1_dsc_1">45,000</span>
    <span id="mf_wfm_layout_wframe01_txt_mtr_vol2_dsc_1">12,500</span>
    <span id="mf_wfm_layout_wframe01_txt_dl_vol3_dsc_1">2,800</span>
</div></body></html>"#;

/// In-memory form: scripted select options, results after N search clicks
struct FakeForm {
    options: HashMap<&'static str, Vec<String>>,
    selected: Mutex<Vec<(String, String)>>,
    clicks: AtomicUsize,
    results_after_clicks: usize,
    loaded: Option<String>,
    /// Search button has no id, only its label
    search_by_text_only: bool,
    no_search_button: bool,
    /// Select ids whose component silently refuses the selection
    refuse: Vec<&'static str>,
}

impl FakeForm {
    fn new(results_after_clicks: usize) -> Self {
        let mut options = HashMap::new();
        options.insert(SELECT_SIDO, opts(&["시/도 선택", "서울특별시", "세종특별자치시", "충청남도"]));
        options.insert(SELECT_SI, opts(&["선택", "천안시", "공주시"]));
        options.insert(SELECT_GU, opts(&["선택", "동남구", "서북구"]));
        options.insert(SELECT_LIDONG, opts(&["선택", "불당동", "조치원읍"]));
        options.insert(SELECT_BUNJI, opts(&["번지 선택", "100", "142-1"]));
        Self {
            options,
            selected: Mutex::new(Vec::new()),
            clicks: AtomicUsize::new(0),
            results_after_clicks,
            loaded: None,
            search_by_text_only: false,
            no_search_button: false,
            refuse: Vec::new(),
        }
    }

    fn with_options(mut self, select_id: &'static str, items: &[&str]) -> Self {
        self.options.insert(select_id, opts(items));
        self
    }

    fn selected(&self, select_id: &str) -> Option<String> {
        self.selected
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| id == select_id)
            .map(|(_, label)| label.clone())
    }

    fn has_results(&self) -> bool {
        self.clicks.load(Ordering::SeqCst) >= self.results_after_clicks
    }
}

fn opts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[async_trait]
impl PortalForm for FakeForm {
    async fn load(&mut self, url: &str) -> CapacityResult<()> {
        self.loaded = Some(url.to_string());
        Ok(())
    }

    async fn websquare_ready(&self) -> CapacityResult<bool> {
        Ok(true)
    }

    async fn select_options(&self, select_id: &str) -> CapacityResult<Vec<String>> {
        Ok(self.options.get(select_id).cloned().unwrap_or_default())
    }

    async fn set_select(&self, select_id: &str, label: &str) -> CapacityResult<bool> {
        if self.refuse.iter().any(|id| *id == select_id) {
            return Ok(false);
        }
        let known = self
            .options
            .get(select_id)
            .is_some_and(|options| options.iter().any(|o| o == label));
        if known {
            self.selected.lock().unwrap().push((select_id.to_string(), label.to_string()));
        }
        Ok(known)
    }

    async fn click(&self, element_id: &str) -> CapacityResult<bool> {
        if element_id != SEARCH_BUTTON_ID || self.search_by_text_only {
            return Ok(false);
        }
        self.clicks.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn click_button_with_text(&self, text: &str) -> CapacityResult<bool> {
        if text != SEARCH_BUTTON_TEXT || !self.search_by_text_only || self.no_search_button {
            return Ok(false);
        }
        self.clicks.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn any_text(&self, _element_ids: &[&str]) -> CapacityResult<bool> {
        Ok(self.has_results())
    }

    async fn html(&self) -> CapacityResult<String> {
        if self.has_results() {
            Ok(RESULT_HTML.to_string())
        } else {
            Ok("<html><body></body></html>".to_string())
        }
    }
}

fn fast_timing() -> DomTiming {
    DomTiming {
        websquare_ready: Duration::from_millis(10),
        select_options: Duration::from_millis(10),
        bunji_options: Duration::from_millis(10),
        search_result: Duration::from_millis(20),
        poll_interval: Duration::from_millis(1),
        settle: Duration::ZERO,
        max_search_clicks: 3,
    }
}

fn cheonan() -> OnlineRegion {
    OnlineRegion {
        sido: "충청남도".into(),
        si: "천안시".into(),
        gu: "서북구".into(),
        dong: "불당동".into(),
        li: String::new(),
        jibun: "142-1".into(),
    }
}

#[tokio::test]
async fn test_full_run_selects_cascade_and_parses_results() -> Result<()> {
    let mut form = FakeForm::new(2);

    let records = DomAutomation::new(&mut form, fast_timing())
        .run("https://portal.test/EWM092D00", &cheonan())
        .await?;

    assert_eq!(form.loaded.as_deref(), Some("https://portal.test/EWM092D00"));
    assert_eq!(form.selected(SELECT_SIDO).as_deref(), Some("충청남도"));
    assert_eq!(form.selected(SELECT_SI).as_deref(), Some("천안시"));
    assert_eq!(form.selected(SELECT_GU).as_deref(), Some("서북구"));
    assert_eq!(form.selected(SELECT_LIDONG).as_deref(), Some("불당동"));
    assert_eq!(form.selected(SELECT_BUNJI).as_deref(), Some("142-1"));
    assert_eq!(form.clicks.load(Ordering::SeqCst), 2);

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].subst_nm, "조치원");
    assert_eq!(records[0].dl_nm, "신안");
    assert_eq!(records[0].substation_capacity(), 45000);
    assert_eq!(records[0].min_capacity(), 2800);
    Ok(())
}

#[tokio::test]
async fn test_levels_marked_all_are_skipped() -> Result<()> {
    let mut form = FakeForm::new(1);
    let region = OnlineRegion {
        sido: "세종특별자치시".into(),
        si: "전체".into(),
        dong: "조치원읍".into(),
        ..Default::default()
    };

    DomAutomation::new(&mut form, fast_timing()).run("https://portal.test", &region).await?;

    assert_eq!(form.selected(SELECT_SI), None);
    assert_eq!(form.selected(SELECT_GU), None);
    assert_eq!(form.selected(SELECT_LIDONG).as_deref(), Some("조치원읍"));
    // No jibun given: first real lot number
    assert_eq!(form.selected(SELECT_BUNJI).as_deref(), Some("100"));
    Ok(())
}

#[tokio::test]
async fn test_empty_select_reports_possible_blocking() -> Result<()> {
    let mut form = FakeForm::new(1).with_options(SELECT_SI, &["선택"]);

    let err = DomAutomation::new(&mut form, fast_timing())
        .run("https://portal.test", &cheonan())
        .await
        .unwrap_err();

    assert_eq!(err.message(), "'si' select 옵션 로딩 실패 (봇탐지/차단 가능)");
    assert!(is_bot_detection_error(&err));
    assert_eq!(form.clicks.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_unknown_value_is_an_error() -> Result<()> {
    let mut form = FakeForm::new(1);
    let region = OnlineRegion {
        sido: "제주특별자치도".into(),
        ..Default::default()
    };

    let err = DomAutomation::new(&mut form, fast_timing())
        .run("https://portal.test", &region)
        .await
        .unwrap_err();

    assert!(err.message().starts_with("'sido' 옵션에서 '제주특별자치도'"));
    Ok(())
}

#[tokio::test]
async fn test_bunji_failure_does_not_abort() -> Result<()> {
    let mut form = FakeForm::new(1).with_options(SELECT_BUNJI, &[]);

    let records = DomAutomation::new(&mut form, fast_timing())
        .run("https://portal.test", &cheonan())
        .await?;

    assert_eq!(form.selected(SELECT_BUNJI), None);
    assert_eq!(records.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_no_results_after_max_clicks() -> Result<()> {
    let mut form = FakeForm::new(usize::MAX);

    let err = DomAutomation::new(&mut form, fast_timing())
        .run("https://portal.test", &cheonan())
        .await
        .unwrap_err();

    assert_eq!(form.clicks.load(Ordering::SeqCst), 3);
    assert!(err.message().contains("검색 결과를 DOM에서 찾지 못했습니다"));
    Ok(())
}

#[tokio::test]
async fn test_search_falls_back_to_button_text() -> Result<()> {
    let mut form = FakeForm::new(1);
    form.search_by_text_only = true;

    let records = DomAutomation::new(&mut form, fast_timing())
        .run("https://portal.test", &cheonan())
        .await?;

    assert_eq!(form.clicks.load(Ordering::SeqCst), 1);
    assert_eq!(records.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_search_button_is_an_error() -> Result<()> {
    let mut form = FakeForm::new(1);
    form.search_by_text_only = true;
    form.no_search_button = true;

    let err = DomAutomation::new(&mut form, fast_timing())
        .run("https://portal.test", &cheonan())
        .await
        .unwrap_err();

    assert_eq!(err.message(), "검색 버튼을 찾을 수 없습니다.");
    Ok(())
}

#[tokio::test]
async fn test_refused_selection_stops_the_cascade() -> Result<()> {
    let mut form = FakeForm::new(1);
    form.refuse.push(SELECT_GU);

    let err = DomAutomation::new(&mut form, fast_timing())
        .run("https://portal.test", &cheonan())
        .await
        .unwrap_err();

    assert_eq!(err.message(), "'gu' 선택 실패: '서북구'");
    assert_eq!(form.selected(SELECT_LIDONG), None);
    assert_eq!(form.clicks.load(Ordering::SeqCst), 0);
    Ok(())
}
