pub mod address;
pub mod apis;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod report;
pub mod scrapers;
pub mod service;
pub mod types;
