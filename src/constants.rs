/// Engine name constants to ensure consistency across the codebase
/// These names appear in logs, the CLI and aggregated fallback errors

// Engines in fallback priority order
pub const ONLINE_ENGINE: &str = "online";
pub const PORTAL_ENGINE: &str = "portal";
pub const LEGACY_ENGINE: &str = "legacy";

// Non-browser source
pub const OPENAPI_SOURCE: &str = "openapi";

/// Fixed fallback order for browser-style engines
pub fn engine_order() -> Vec<&'static str> {
    vec![ONLINE_ENGINE, PORTAL_ENGINE, LEGACY_ENGINE]
}

// Endpoints
pub const DEFAULT_API_BASE_URL: &str = "https://bigdata.kepco.co.kr/openapi/v1/dispersedGeneration.do";
pub const DEFAULT_ONLINE_URL: &str = "https://online.kepco.co.kr/EWM092D00";
pub const DEFAULT_ON_CAPACITY_URL: &str =
    "https://home.kepco.co.kr/kepco/CO/H/E/COHEPP001/COHEPP00110.do?menuCd=FN420106";
pub const RETRIEVE_MESH_NO_PATH: &str = "/ew/cpct/retrieveMeshNo";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7";

// Retry tuning
pub const MAX_RETRIES: u32 = 3;
pub const RETRY_DELAY_SECONDS: f64 = 3.0;
pub const BOT_DETECTION_DELAY_SECONDS: f64 = 8.0;
pub const BOT_KEYWORDS: [&str; 6] = ["captcha", "봇", "bot", "차단", "block", "자동화"];

/// Placeholder for "no filter" in region dropdowns
pub const ALL: &str = "전체";
/// Placeholder option text in portal selects
pub const SELECT_PLACEHOLDER: &str = "선택";

// WebSquare select element ids, in cascade order
pub const SELECT_SIDO: &str = "mf_wfm_layout_sbx_sido_input_0";
pub const SELECT_SI: &str = "mf_wfm_layout_sbx_si_input_0";
pub const SELECT_GU: &str = "mf_wfm_layout_sbx_gu_input_0";
pub const SELECT_LIDONG: &str = "mf_wfm_layout_sbx_lidong_input_0";
pub const SELECT_LI: &str = "mf_wfm_layout_sbx_li_input_0";
pub const SELECT_BUNJI: &str = "mf_wfm_layout_sbx_bunji_input_0";

pub const SEARCH_BUTTON_ID: &str = "mf_wfm_layout_btn_search";
/// Text matched on any button when the search button id is missing
pub const SEARCH_BUTTON_TEXT: &str = "검색";

/// Result frame element ids keyed by logical field name
pub const RESULT_IDS: [(&str, &str); 21] = [
    ("subst_nm", "mf_wfm_layout_wframe01_txt_subst_nm_label"),
    ("mtr_no", "mf_wfm_layout_wframe01_txt_mtr_no_label"),
    ("dl_nm", "mf_wfm_layout_wframe01_txt_dl_nm_label"),
    ("subst_capa", "mf_wfm_layout_wframe01_txt_subst_capa_dsc"),
    ("subst_pwr", "mf_wfm_layout_wframe01_txt_subst_pwr_dsc"),
    ("g_subst_capa", "mf_wfm_layout_wframe01_txt_g_subst_capa_dsc"),
    ("vol1_1", "mf_wfm_layout_wframe01_txt_subst_vol1_dsc_1"),
    ("vol1_2", "mf_wfm_layout_wframe01_txt_subst_vol1_dsc_2"),
    ("mtr_capa", "mf_wfm_layout_wframe01_txt_mtr_capa_dsc"),
    ("mtr_pwr", "mf_wfm_layout_wframe01_txt_mtr_pwr_dsc"),
    ("g_mtr_capa", "mf_wfm_layout_wframe01_txt_g_mtr_capa_dsc"),
    ("vol2_1", "mf_wfm_layout_wframe01_txt_mtr_vol2_dsc_1"),
    ("vol2_2", "mf_wfm_layout_wframe01_txt_mtr_vol2_dsc_2"),
    ("dl_capa", "mf_wfm_layout_wframe01_txt_dl_capa_dsc"),
    ("dl_pwr", "mf_wfm_layout_wframe01_txt_dl_pwr_dsc"),
    ("g_dl_capa", "mf_wfm_layout_wframe01_txt_g_dl_capa_dsc"),
    ("vol3_1", "mf_wfm_layout_wframe01_txt_dl_vol3_dsc_1"),
    ("vol3_2", "mf_wfm_layout_wframe01_txt_dl_vol3_dsc_2"),
    ("subst_yn", "mf_wfm_layout_wframe01_txt_substYn"),
    ("mtr_yn", "mf_wfm_layout_wframe01_txt_mtrYn"),
    ("dl_yn", "mf_wfm_layout_wframe01_txt_dlYn"),
];

/// Result ids whose text signals that a search finished
pub fn result_ready_ids() -> Vec<&'static str> {
    RESULT_IDS
        .iter()
        .filter(|(key, _)| matches!(*key, "subst_nm" | "dl_nm" | "vol1_1" | "vol3_1"))
        .map(|(_, id)| *id)
        .collect()
}

// Wait budgets (ms)
pub const WS_READY_TIMEOUT_MS: u64 = 20_000;
pub const SELECT_OPTION_TIMEOUT_MS: u64 = 8_000;
pub const BUNJI_OPTION_TIMEOUT_MS: u64 = 5_000;
pub const SEARCH_RESULT_TIMEOUT_MS: u64 = 20_000;
pub const POLL_INTERVAL_MS: u64 = 250;
pub const MAX_SEARCH_CLICKS: u32 = 3;

pub const DEBUG_DIR_NAME: &str = "kepco_debug";
