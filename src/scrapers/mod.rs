pub mod browser;
#[cfg(feature = "browser")]
pub mod chromium;
pub mod engines;
pub mod online;

pub use browser::{BrowserLauncher, NoopLauncher, PageDriver};
pub use engines::{default_engines, LegacyEngine, OnlineEngine, PortalEngine};
pub use online::KepcoOnlineScraper;
