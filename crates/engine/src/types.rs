//! Shared records for price history, option chains, aggregates and setups

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single daily bar (OHLCV)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub date: NaiveDate,
    pub timestamp_seconds: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// Indicator values for one bar once EMA50 has seeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalSnapshot {
    pub date: NaiveDate,
    pub ema10: f64,
    pub ema20: f64,
    pub ema50: f64,
    /// `None` until RSI(14) has warmed up
    pub rsi14: Option<f64>,
    /// `None` until a full window of RSI values exists
    pub stoch_rsi14: Option<f64>,
}

/// One side (call or put) of a strike row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub oi: i64,
    pub volume: i64,
    pub iv: f64,
    pub gamma: f64,
    pub charm: f64,
    pub vanna: f64,
    pub vomma: f64,
}

/// One strike row of an options chain snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrikeQuote {
    pub strike: f64,
    pub call: OptionQuote,
    pub put: OptionQuote,
}

/// Chain snapshot for one (symbol, expiration, asOfTimestamp) triple.
/// Strikes are ascending and unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionChain {
    pub symbol: String,
    pub expiration: NaiveDate,
    pub as_of_timestamp: i64,
    /// Underlying price the snapshot was built against
    pub spot: f64,
    pub strikes: Vec<StrikeQuote>,
}

impl OptionChain {
    /// Sort strikes ascending and drop duplicate strike rows (first one wins).
    pub fn normalize(&mut self) {
        self.strikes
            .sort_by(|a, b| a.strike.total_cmp(&b.strike));
        self.strikes.dedup_by(|b, a| a.strike == b.strike);
    }

    pub fn total_call_oi(&self) -> i64 {
        self.strikes.iter().map(|s| s.call.oi).sum()
    }

    pub fn total_put_oi(&self) -> i64 {
        self.strikes.iter().map(|s| s.put.oi).sum()
    }

    /// Strike row closest to spot
    pub fn atm(&self) -> Option<&StrikeQuote> {
        self.strikes.iter().min_by(|a, b| {
            (a.strike - self.spot)
                .abs()
                .total_cmp(&(b.strike - self.spot).abs())
        })
    }
}

/// Derived, read-only view of a chain snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketAggregate {
    pub symbol: String,
    pub date: NaiveDate,
    pub pcr: f64,
    /// `None` only for an empty chain
    pub max_pain: Option<f64>,
    pub gamma_exposure: f64,
    pub iv_percentile: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupType {
    Bullish,
    Bearish,
    Neutral,
}

impl SetupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
            Self::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for SetupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SetupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bullish" => Ok(Self::Bullish),
            "bearish" => Ok(Self::Bearish),
            "neutral" => Ok(Self::Neutral),
            other => Err(format!("unknown setup type: {other}")),
        }
    }
}

/// A classified trading bias with its levels. Superseded, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeSetup {
    pub ticker: String,
    pub date: NaiveDate,
    pub setup_type: SetupType,
    /// Percentage of rules passed (0-100)
    pub strength: u8,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target_price: f64,
    pub risk_reward_ratio: f64,
}
