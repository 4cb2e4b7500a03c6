// src/lib.rs - Library interface for the binaries and integration tests

pub mod catalog;
pub mod config;
pub mod constants;
pub mod price_feed;
pub mod resilience;

pub use catalog::SymbolCatalog;
pub use config::AppConfig;
