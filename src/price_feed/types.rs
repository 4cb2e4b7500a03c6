// src/price_feed/types.rs - Price feed type definitions
use std::collections::HashMap;
use std::time::Duration;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use neofeed_attest::AttestError;
use neofeed_chain::ChainError;

/// Raw quote from a single provider, normalized to the canonical symbol's
/// quote currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: BigDecimal,
    pub volume: Option<BigDecimal>,
    pub provider: String,
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl PriceQuote {
    pub fn new(
        symbol: impl Into<String>,
        price: BigDecimal,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            volume: None,
            provider: provider.into(),
            observed_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_volume(mut self, volume: Option<BigDecimal>) -> Self {
        self.volume = volume;
        self
    }
}

/// One fused quote per symbol, produced by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedQuote {
    pub symbol: String,
    pub price: BigDecimal,
    pub aggregated_at: DateTime<Utc>,
    pub confidence: u8,
    pub stdev: Option<f64>,
    pub source_quotes: Vec<PriceQuote>,
}

/// An ordered batch of aggregated quotes headed for the oracle contract.
#[derive(Debug, Clone)]
pub struct PriceBatch {
    pub batch_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub quotes: Vec<AggregatedQuote>,
}

impl PriceBatch {
    /// Wrap aggregated quotes into a batch. Duplicate canonical symbols
    /// are a caller bug and rejected outright.
    pub fn new(quotes: Vec<AggregatedQuote>) -> Result<Self, FeedError> {
        let mut seen = std::collections::HashSet::new();
        for quote in &quotes {
            if !seen.insert(quote.symbol.clone()) {
                return Err(FeedError::InvalidBatch(format!(
                    "duplicate symbol {} in batch",
                    quote.symbol
                )));
            }
        }
        Ok(Self {
            batch_id: Uuid::new_v4(),
            created_at: Utc::now(),
            quotes,
        })
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

/// Publishing lifecycle of a batch. Transitions are monotonic:
/// Unknown -> Processing -> Sent -> {Confirmed, Pending, Failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Unknown,
    Processing,
    Sent,
    Confirmed,
    Pending,
    Failed,
}

impl BatchStatus {
    /// Whether moving from `self` to `next` respects the lifecycle order.
    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        use BatchStatus::*;
        matches!(
            (self, next),
            (Unknown, Processing)
                | (Processing, Sent)
                | (Processing, Failed)
                | (Sent, Confirmed)
                | (Sent, Pending)
                | (Sent, Failed)
        )
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BatchStatus::Unknown => "Unknown",
            BatchStatus::Processing => "Processing",
            BatchStatus::Sent => "Sent",
            BatchStatus::Confirmed => "Confirmed",
            BatchStatus::Pending => "Pending",
            BatchStatus::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Rich status record kept per batch for the lifetime of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatusInfo {
    pub batch_id: Uuid,
    pub status: BatchStatus,
    pub tx_hash: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub processed: usize,
    pub total: usize,
}

impl BatchStatusInfo {
    pub fn unknown(batch_id: Uuid) -> Self {
        Self {
            batch_id,
            status: BatchStatus::Unknown,
            tx_hash: None,
            updated_at: Utc::now(),
            processed: 0,
            total: 0,
        }
    }
}

/// Enablement and breaker snapshot for one provider, reported at the end
/// of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub name: String,
    pub enabled: bool,
    pub breaker_state: String,
}

/// Price-feed errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Symbol {symbol} not supported by {provider}")]
    Unsupported { symbol: String, provider: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status} from {provider}")]
    HttpStatus { provider: String, status: u16 },

    #[error("Unusable provider payload: {0}")]
    MalformedPayload(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Circuit open for provider {0}")]
    CircuitOpen(String),

    #[error("No quotes available for symbol {0}")]
    NoQuotes(String),

    #[error("Mismatched aggregation input: expected {expected}, got {got}")]
    SymbolMismatch { expected: String, got: String },

    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error("Chain rejected submission: {0}")]
    ChainReject(#[from] ChainError),

    #[error("Attestation failure: {0}")]
    Attestation(#[from] AttestError),

    #[error("No providers are enabled")]
    NoEnabledProviders,

    #[error("No price data collected from any provider")]
    NoData,

    #[error("Run cancelled")]
    Cancelled,
}

impl FeedError {
    /// Transient failures are worth another attempt inside the resilience
    /// stack or the publish retry loop.
    pub fn is_transient(&self) -> bool {
        match self {
            FeedError::Network(_)
            | FeedError::MalformedPayload(_)
            | FeedError::Timeout(_)
            | FeedError::CircuitOpen(_) => true,
            // Server-side trouble and throttling are worth retrying;
            // other client errors are deterministic.
            FeedError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            FeedError::ChainReject(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::FromPrimitive;

    fn quote(symbol: &str) -> AggregatedQuote {
        AggregatedQuote {
            symbol: symbol.to_string(),
            price: BigDecimal::from_f64(10.0).unwrap(),
            aggregated_at: Utc::now(),
            confidence: 100,
            stdev: None,
            source_quotes: vec![],
        }
    }

    #[test]
    fn batch_rejects_duplicate_symbols() {
        let result = PriceBatch::new(vec![quote("NEOUSDT"), quote("NEOUSDT")]);
        assert!(matches!(result, Err(FeedError::InvalidBatch(_))));
    }

    #[test]
    fn batch_ids_differ_between_batches() {
        let a = PriceBatch::new(vec![quote("NEOUSDT")]).unwrap();
        let b = PriceBatch::new(vec![quote("NEOUSDT")]).unwrap();
        assert_ne!(a.batch_id, b.batch_id);
    }

    #[test]
    fn status_transitions_follow_the_lifecycle() {
        use BatchStatus::*;
        assert!(Unknown.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Confirmed));
        assert!(Sent.can_transition_to(Pending));
        assert!(Sent.can_transition_to(Failed));
        assert!(!Sent.can_transition_to(Processing));
        assert!(!Confirmed.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Sent));
    }

    #[test]
    fn transient_classification() {
        assert!(FeedError::MalformedPayload("bad json".into()).is_transient());
        assert!(FeedError::CircuitOpen("Binance".into()).is_transient());
        assert!(FeedError::HttpStatus {
            provider: "Binance".into(),
            status: 503
        }
        .is_transient());
        assert!(FeedError::HttpStatus {
            provider: "Binance".into(),
            status: 429
        }
        .is_transient());
        assert!(!FeedError::HttpStatus {
            provider: "Binance".into(),
            status: 404
        }
        .is_transient());
        assert!(!FeedError::NoData.is_transient());
        assert!(!FeedError::Unsupported {
            symbol: "NEOBTC".into(),
            provider: "Kraken".into()
        }
        .is_transient());
    }
}
