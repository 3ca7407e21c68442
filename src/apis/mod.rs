pub mod kepco_api;

pub use kepco_api::KepcoApiClient;
