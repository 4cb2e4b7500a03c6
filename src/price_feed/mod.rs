// src/price_feed/mod.rs - Price feed pipeline: providers, aggregation, publishing
pub mod aggregator;
pub mod chain;
pub mod pipeline;
pub mod providers;
pub mod publisher;
pub mod types;

pub use aggregator::PriceAggregator;
pub use chain::OracleChain;
pub use pipeline::{PipelineRunner, RunReport};
pub use providers::{build_providers, PriceProvider};
pub use publisher::{scale_price, BatchPublisher, PublisherConfig};
pub use types::*;
