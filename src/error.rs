use thiserror::Error;

#[derive(Error, Debug)]
pub enum CapacityError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Address data error: {0}")]
    Address(String),

    #[error("KEPCO API error: {message}")]
    Api { message: String, status: Option<u16> },

    #[error("KEPCO API returned no data: {message}")]
    NoData { message: String, status: Option<u16> },

    #[error("Scraper error: {0}")]
    Scraper(String),

    /// The engine cannot run at all on this host (browser missing, feature disabled).
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),
}

impl CapacityError {
    pub fn api(message: impl Into<String>, status: Option<u16>) -> Self {
        CapacityError::Api {
            message: message.into(),
            status,
        }
    }

    pub fn scraper(message: impl Into<String>) -> Self {
        CapacityError::Scraper(message.into())
    }

    /// Human-facing message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            CapacityError::Config(m)
            | CapacityError::Address(m)
            | CapacityError::Scraper(m)
            | CapacityError::EngineUnavailable(m) => m.clone(),
            CapacityError::Api { message, .. } | CapacityError::NoData { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            CapacityError::Api { status, .. } | CapacityError::NoData { status, .. } => *status,
            CapacityError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Installation-class failures: retrying the same engine cannot help.
    pub fn is_unavailable(&self) -> bool {
        match self {
            CapacityError::EngineUnavailable(_) => true,
            CapacityError::Scraper(m) => {
                m.contains("설치") || m.to_lowercase().contains("import")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CapacityError>;
