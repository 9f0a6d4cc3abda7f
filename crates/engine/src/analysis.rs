//! End-to-end analysis for one ticker: prices and chain in, setup out.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::aggregates::{aggregate_chain, AggregateConfig};
use crate::chain::ChainConfig;
use crate::classifier::{Classification, ClassifierConfig, ClassifierInput, SetupClassifier};
use crate::error::{AnalyticsError, AnalyticsResult};
use crate::indicators::{
    average_true_range, compute_snapshots, sanitize_price_points, volume_trend, IndicatorConfig,
    VolumeTrend,
};
use crate::sizing::SizingConfig;
use crate::types::{MarketAggregate, OptionChain, PricePoint, TechnicalSnapshot, TradeSetup};

/// Every tunable in one place, loadable from a JSON file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub indicators: IndicatorConfig,
    pub chain: ChainConfig,
    pub aggregates: AggregateConfig,
    pub classifier: ClassifierConfig,
    pub sizing: SizingConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub ticker: String,
    pub snapshots: Vec<TechnicalSnapshot>,
    pub volume: VolumeTrend,
    pub atr: Option<f64>,
    pub aggregate: MarketAggregate,
    pub classification: Classification,
    pub setup: TradeSetup,
}

impl AnalysisReport {
    pub fn latest_snapshot(&self) -> Option<&TechnicalSnapshot> {
        self.snapshots.last()
    }
}

/// Run the full pipeline on one ticker.
///
/// Bars are sanitized first, so the result only depends on the valid ones.
/// The aggregate and setup are dated with the last valid bar; entry is its close.
pub fn analyze(
    ticker: &str,
    prices: &[PricePoint],
    chain: &OptionChain,
    iv_history: &[f64],
    previous_pcr: Option<f64>,
    config: &AnalysisConfig,
) -> AnalyticsResult<AnalysisReport> {
    let clean = sanitize_price_points(prices);
    if clean.len() < prices.len() {
        debug!(ticker, dropped = prices.len() - clean.len(), "Dropped invalid bars");
    }

    let snapshots = compute_snapshots(&clean, &config.indicators)?;
    let (latest, last_bar) = match (snapshots.last(), clean.last()) {
        (Some(s), Some(b)) => (s, b),
        _ => {
            return Err(AnalyticsError::InsufficientData {
                required: config.indicators.ema_slow,
                available: clean.len(),
            })
        }
    };

    let volume = volume_trend(&clean, config.indicators.volume_lookback);
    let atr = match average_true_range(&clean, config.indicators.atr_period) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!(ticker, error = %e, "ATR unavailable, setup uses percentage stop");
            None
        }
    };

    let mut chain = chain.clone();
    chain.normalize();
    let aggregate = aggregate_chain(
        &chain,
        latest.date,
        iv_history,
        previous_pcr,
        &config.aggregates,
    );

    let classifier = SetupClassifier::new(config.classifier.clone());
    let classification = classifier.classify(&ClassifierInput {
        snapshot: latest,
        aggregate: &aggregate,
        volume,
    });
    let setup = classifier.build_setup(ticker, latest, &classification, last_bar.close, atr)?;

    info!(
        ticker,
        bars = clean.len(),
        snapshots = snapshots.len(),
        setup = %setup.setup_type,
        strength = setup.strength,
        "Analysis complete"
    );

    Ok(AnalysisReport {
        ticker: ticker.to_string(),
        volume,
        atr,
        aggregate,
        classification,
        setup,
        snapshots,
    })
}
