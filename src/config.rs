use crate::constants::{
    BOT_DETECTION_DELAY_SECONDS, DEFAULT_API_BASE_URL, DEFAULT_ONLINE_URL, DEFAULT_ON_CAPACITY_URL,
    MAX_RETRIES, RETRY_DELAY_SECONDS,
};
use crate::error::{CapacityError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "kepco.toml";
/// Upper bound for every timeout and delay setting (one day)
pub const MAX_SECONDS: f64 = 86_400.0;

/// Seconds to a `Duration`, clamping negative, NaN and out-of-range values.
pub fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::MAX)
}

/// Application settings: defaults, then `kepco.toml`, then environment (with `.env` loaded).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub debug: bool,

    pub kepco_api_key: String,
    pub kepco_api_base_url: String,
    pub kepco_api_timeout_seconds: f64,
    pub kepco_api_delay_seconds: f64,

    pub kepco_online_url: String,
    /// Alternate site version used by the `legacy` engine
    pub kepco_on_capacity_url: String,

    pub browser_headless: bool,
    pub browser_page_load_timeout_seconds: f64,
    pub browser_result_timeout_seconds: f64,
    pub chromium_path: Option<PathBuf>,

    pub bdong_codes_path: Option<PathBuf>,

    pub retry: RetryConfig,
    pub thresholds: CapacityThresholds,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_seconds: f64,
    pub bot_detection_delay_seconds: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            delay_seconds: RETRY_DELAY_SECONDS,
            bot_detection_delay_seconds: BOT_DETECTION_DELAY_SECONDS,
        }
    }
}

/// Minimum-capacity tiers (kW) used when reporting results
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CapacityThresholds {
    pub green: i64,
    pub yellow: i64,
    pub orange: i64,
}

impl Default for CapacityThresholds {
    fn default() -> Self {
        Self {
            green: 3000,
            yellow: 1000,
            orange: 1,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            kepco_api_key: String::new(),
            kepco_api_base_url: DEFAULT_API_BASE_URL.to_string(),
            kepco_api_timeout_seconds: 15.0,
            kepco_api_delay_seconds: 0.0,
            kepco_online_url: DEFAULT_ONLINE_URL.to_string(),
            kepco_on_capacity_url: DEFAULT_ON_CAPACITY_URL.to_string(),
            browser_headless: true,
            browser_page_load_timeout_seconds: 40.0,
            browser_result_timeout_seconds: 30.0,
            chromium_path: None,
            bdong_codes_path: None,
            retry: RetryConfig::default(),
            thresholds: CapacityThresholds::default(),
        }
    }
}

fn parse_f64(name: &str, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|e| CapacityError::Config(format!("{} must be a number (got '{}'): {}", name, raw, e)))
}

impl Settings {
    /// Load `.env`, then `kepco.toml` from the working directory if present, then apply env overrides.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let mut settings = Self::from_file_or_default(Path::new(CONFIG_FILE))?;
        settings.apply_overrides(|k| std::env::var(k).ok())?;
        Ok(settings)
    }

    pub fn from_file_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            CapacityError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Apply environment-style overrides from any lookup (the process env in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DEBUG") {
            self.debug = v.trim().eq_ignore_ascii_case("true");
        }
        if let Some(v) = lookup("KEPCO_API_KEY") {
            self.kepco_api_key = v.trim().to_string();
        }
        if let Some(v) = lookup("KEPCO_API_BASE_URL") {
            self.kepco_api_base_url = v.trim().to_string();
        }
        if let Some(v) = lookup("KEPCO_API_TIMEOUT_SECONDS") {
            self.kepco_api_timeout_seconds = parse_f64("KEPCO_API_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = lookup("KEPCO_API_DELAY_SECONDS") {
            self.kepco_api_delay_seconds = parse_f64("KEPCO_API_DELAY_SECONDS", &v)?;
        }
        if let Some(v) = lookup("KEPCO_ONLINE_URL") {
            self.kepco_online_url = v.trim().to_string();
        }
        if let Some(v) = lookup("KEPCO_ON_CAPACITY_URL") {
            self.kepco_on_capacity_url = v.trim().to_string();
        }
        if let Some(v) = lookup("BROWSER_HEADLESS") {
            // Anything but an explicit "false" keeps the browser headless
            self.browser_headless = !v.trim().eq_ignore_ascii_case("false");
        }
        if let Some(v) = lookup("BROWSER_PAGE_LOAD_TIMEOUT_SECONDS") {
            self.browser_page_load_timeout_seconds =
                parse_f64("BROWSER_PAGE_LOAD_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = lookup("BROWSER_RESULT_TIMEOUT_SECONDS") {
            self.browser_result_timeout_seconds = parse_f64("BROWSER_RESULT_TIMEOUT_SECONDS", &v)?;
        }
        if let Some(v) = lookup("CHROMIUM_PATH") {
            if !v.trim().is_empty() {
                self.chromium_path = Some(PathBuf::from(v.trim()));
            }
        }
        if let Some(v) = lookup("BDONG_CODES_PATH") {
            if !v.trim().is_empty() {
                self.bdong_codes_path = Some(PathBuf::from(v.trim()));
            }
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        let non_negative = [
            ("kepco_api_timeout_seconds", self.kepco_api_timeout_seconds),
            ("kepco_api_delay_seconds", self.kepco_api_delay_seconds),
            ("browser_page_load_timeout_seconds", self.browser_page_load_timeout_seconds),
            ("browser_result_timeout_seconds", self.browser_result_timeout_seconds),
            ("retry.delay_seconds", self.retry.delay_seconds),
            ("retry.bot_detection_delay_seconds", self.retry.bot_detection_delay_seconds),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || !(0.0..=MAX_SECONDS).contains(&value) {
                return Err(CapacityError::Config(format!(
                    "{} must be between 0 and {} seconds (got {})",
                    name, MAX_SECONDS, value
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(CapacityError::Config("retry.max_attempts must be >= 1".into()));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        !self.kepco_api_key.trim().is_empty()
    }

    pub fn api_timeout(&self) -> Duration {
        seconds(self.kepco_api_timeout_seconds)
    }

    pub fn api_delay(&self) -> Duration {
        seconds(self.kepco_api_delay_seconds)
    }

    pub fn page_load_timeout(&self) -> Duration {
        seconds(self.browser_page_load_timeout_seconds)
    }

    pub fn result_timeout(&self) -> Duration {
        seconds(self.browser_result_timeout_seconds)
    }
}
