//! Options Lab Engine: technical indicators, chain aggregates, setup classification
//!
//! Provides:
//! - EMA / RSI / Stochastic RSI snapshots and ATR over daily bars
//! - Synthetic option chains with approximate Greeks
//! - Put/call ratio, max pain, gamma exposure and IV percentile
//! - Rule-based bullish / bearish / neutral setup classification
//! - Risk/reward, position sizing and stop-loss calculators
//! - Yahoo Finance client for spot quotes and daily history

pub mod aggregates;
pub mod analysis;
pub mod api;
pub mod cache;
pub mod chain;
pub mod classifier;
pub mod error;
pub mod greeks;
pub mod indicators;
pub mod risk;
pub mod sizing;
pub mod stops;
pub mod types;

// Re-exports for convenience
pub use aggregates::{
    aggregate_chain, gamma_exposure, iv_percentile, max_pain, put_call_ratio, AggregateConfig,
};
pub use analysis::{analyze, AnalysisConfig, AnalysisReport};
pub use api::{SpotPriceSource, YahooQuoteClient};
pub use cache::{Cache, TtlCache};
pub use chain::{
    generate_synthetic_chain, resolve_spot, resolve_spot_cached, ChainConfig, SpotQuote,
    DEFAULT_SPOT_PRICE,
};
pub use classifier::{Classification, ClassifierConfig, SetupClassifier, TieBreakPolicy};
pub use error::{AnalyticsError, AnalyticsResult};
pub use indicators::{compute_snapshots, IndicatorConfig};
pub use risk::{analyze_position, PositionSpec, RiskAnalysisResult};
pub use sizing::{
    size_position, GexAdjustment, PositionSizeRequest, PositionSizeResult, SizingConfig,
};
pub use stops::{compute_stop_loss, StopLossRequest, StopLossResult};
pub use types::*;
