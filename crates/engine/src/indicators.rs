//! Technical indicator engine
//!
//! Whole-series indicator transforms over an ascending price history. Every
//! series function returns one value per input bar, `None` while the indicator
//! is still warming up, so outputs line up index-for-index with the input.

use serde::{Deserialize, Serialize};
use ta::indicators::AverageTrueRange;
use ta::{DataItem, Next};
use tracing::{debug, warn};

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::types::{PricePoint, TechnicalSnapshot};

/// Indicator periods used to build a [`TechnicalSnapshot`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub ema_fast: usize,
    pub ema_mid: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub stoch_rsi_period: usize,
    pub atr_period: usize,
    /// Bars per window when comparing recent vs prior volume
    pub volume_lookback: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: 10,
            ema_mid: 20,
            ema_slow: 50,
            rsi_period: 14,
            stoch_rsi_period: 14,
            atr_period: 14,
            volume_lookback: 10,
        }
    }
}

// ============================================================================
// Series transforms
// ============================================================================

/// EMA seeded with the simple mean of the first `period` closes.
/// Fewer than `period` closes yields an all-`None` series.
pub fn ema(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period {
        return out;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed = closes[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(seed);

    let mut prev = seed;
    for i in period..closes.len() {
        let value = (closes[i] - prev) * multiplier + prev;
        out[i] = Some(value);
        prev = value;
    }
    out
}

/// RSI from a simple (non-Wilder) average of the trailing `period` deltas.
///
/// The first value lands at index `period + 1`. A window with no losses
/// reads 100.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() < period + 2 {
        return out;
    }

    // gains[i] / losses[i] hold the delta ending at price index i; index 0 is unused
    let mut gains = vec![0.0; closes.len()];
    let mut losses = vec![0.0; closes.len()];
    for i in 1..closes.len() {
        let delta = closes[i] - closes[i - 1];
        gains[i] = delta.max(0.0);
        losses[i] = (-delta).max(0.0);
    }

    for i in (period + 1)..closes.len() {
        let window = (i + 1 - period)..=i;
        let avg_gain = gains[window.clone()].iter().sum::<f64>() / period as f64;
        let avg_loss = losses[window].iter().sum::<f64>() / period as f64;

        let value = if avg_loss == 0.0 {
            100.0
        } else {
            let rs = avg_gain / avg_loss;
            100.0 - 100.0 / (1.0 + rs)
        };
        out[i] = Some(value);
    }
    out
}

/// Stochastic RSI over the trailing `period` RSI values.
///
/// Only produced once the whole window is defined; a flat window reads 50.
pub fn stoch_rsi(rsi: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; rsi.len()];
    if period == 0 || rsi.len() < period {
        return out;
    }

    for i in (period - 1)..rsi.len() {
        let window: Vec<f64> = rsi[(i + 1 - period)..=i].iter().flatten().copied().collect();
        if window.len() < period {
            continue;
        }
        let Some(current) = rsi[i] else { continue };

        let lowest = window.iter().copied().fold(f64::INFINITY, f64::min);
        let highest = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = highest - lowest;

        let value = if range.abs() < f64::EPSILON {
            50.0
        } else {
            ((current - lowest) / range * 100.0).clamp(0.0, 100.0)
        };
        out[i] = Some(value);
    }
    out
}

// ============================================================================
// Ingestion guard
// ============================================================================

fn is_valid_bar(p: &PricePoint) -> bool {
    let prices = [p.open, p.high, p.low, p.close];
    prices.iter().all(|v| v.is_finite() && *v > 0.0) && p.high >= p.low && p.volume > 0
}

/// Drop bars that would poison the indicator chain (non-finite or
/// non-positive prices, inverted high/low, zero volume).
pub fn sanitize_price_points(points: &[PricePoint]) -> Vec<PricePoint> {
    points
        .iter()
        .filter(|p| {
            let ok = is_valid_bar(p);
            if !ok {
                warn!(
                    date = %p.date,
                    close = p.close,
                    volume = p.volume,
                    "Rejecting invalid price bar"
                );
            }
            ok
        })
        .cloned()
        .collect()
}

// ============================================================================
// Snapshots
// ============================================================================

/// Build one [`TechnicalSnapshot`] per bar from the first bar where the
/// slow EMA exists.
pub fn compute_snapshots(
    points: &[PricePoint],
    config: &IndicatorConfig,
) -> AnalyticsResult<Vec<TechnicalSnapshot>> {
    let required = config.ema_fast.max(config.ema_mid).max(config.ema_slow);
    if required == 0 {
        return Err(AnalyticsError::invalid("emaSlow", "EMA periods must be positive"));
    }
    if points.len() < required {
        return Err(AnalyticsError::InsufficientData {
            required,
            available: points.len(),
        });
    }

    let closes: Vec<f64> = points.iter().map(|p| p.close).collect();
    let fast = ema(&closes, config.ema_fast);
    let mid = ema(&closes, config.ema_mid);
    let slow = ema(&closes, config.ema_slow);
    let rsi_series = rsi(&closes, config.rsi_period);
    let stoch_series = stoch_rsi(&rsi_series, config.stoch_rsi_period);

    let snapshots: Vec<TechnicalSnapshot> = points
        .iter()
        .enumerate()
        .skip(required - 1)
        .filter_map(|(i, p)| {
            Some(TechnicalSnapshot {
                date: p.date,
                ema10: fast[i]?,
                ema20: mid[i]?,
                ema50: slow[i]?,
                rsi14: rsi_series[i],
                stoch_rsi14: stoch_series[i],
            })
        })
        .collect();

    debug!(
        bars = points.len(),
        snapshots = snapshots.len(),
        "Computed technical snapshots"
    );

    Ok(snapshots)
}

// ============================================================================
// ATR and volume trend
// ============================================================================

/// Latest Average True Range over the series, using `ta`'s smoothing.
pub fn average_true_range(points: &[PricePoint], period: usize) -> AnalyticsResult<f64> {
    let mut atr = AverageTrueRange::new(period)
        .map_err(|e| AnalyticsError::invalid("atrPeriod", format!("{e:?}")))?;
    if points.len() < period {
        return Err(AnalyticsError::InsufficientData {
            required: period,
            available: points.len(),
        });
    }

    let mut last = 0.0;
    for p in points {
        let bar = DataItem::builder()
            .open(p.open)
            .high(p.high)
            .low(p.low)
            .close(p.close)
            .volume(p.volume as f64)
            .build()
            .map_err(|e| AnalyticsError::invalid("pricePoints", format!("{e:?}")))?;
        last = atr.next(&bar);
    }
    Ok(last)
}

/// Recent volume behaviour compared with the window before it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeTrend {
    pub increasing: bool,
    pub increasing_on_down_days: bool,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Compare the last `lookback` bars against the `lookback` bars before them.
/// Down-day volume is measured on bars that closed below the previous close.
pub fn volume_trend(points: &[PricePoint], lookback: usize) -> VolumeTrend {
    if lookback == 0 || points.len() < lookback * 2 + 1 {
        debug!(
            bars = points.len(),
            lookback, "Not enough bars for volume trend"
        );
        return VolumeTrend::default();
    }

    let n = points.len();
    let recent_start = n - lookback;
    let prior = &points[recent_start - lookback..recent_start];

    let Some(prior_avg) = mean(prior.iter().map(|p| p.volume as f64)) else {
        return VolumeTrend::default();
    };
    let recent_avg = mean(points[recent_start..].iter().map(|p| p.volume as f64)).unwrap_or(0.0);
    let down_day_avg = mean(
        (recent_start..n)
            .filter(|&i| points[i].close < points[i - 1].close)
            .map(|i| points[i].volume as f64),
    );

    VolumeTrend {
        increasing: recent_avg > prior_avg,
        increasing_on_down_days: down_day_avg.is_some_and(|avg| avg > prior_avg),
    }
}
