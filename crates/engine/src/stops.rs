//! Stop-loss placement in five modes: technical level, percentage, ATR multiple,
//! fixed dollar amount, and time-based exit.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ensure_finite, AnalyticsError, AnalyticsResult};

/// ATR multiples used by the `atr` mode
pub const ATR_STOP_MULTIPLIER: f64 = 2.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopLossMode {
    Technical,
    Percentage,
    Atr,
    Fixed,
    Time,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    Long,
    Short,
}

impl Side {
    /// Price `distance` away from `entry` in the losing direction
    fn stop_from(&self, entry: f64, distance: f64) -> f64 {
        match self {
            Side::Long => entry - distance,
            Side::Short => entry + distance,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopLossRequest {
    pub mode: StopLossMode,
    pub entry_price: f64,
    #[serde(default)]
    pub side: Side,
    pub technical_level: Option<f64>,
    /// Percent below (long) or above (short) entry
    pub percentage: Option<f64>,
    pub atr: Option<f64>,
    pub fixed_amount: Option<f64>,
    pub holding_days: Option<u32>,
    /// Shares or units, used for `max_loss`
    pub quantity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopLossResult {
    pub mode: StopLossMode,
    /// None for time-based exits
    pub stop_price: Option<f64>,
    pub stop_distance: Option<f64>,
    pub stop_percent: Option<f64>,
    pub max_loss: Option<f64>,
    pub exit_after_days: Option<u32>,
}

fn require_positive(value: Option<f64>, field: &'static str) -> AnalyticsResult<f64> {
    match value {
        None => Err(AnalyticsError::missing(field)),
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        Some(_) => Err(AnalyticsError::invalid(field, "must be greater than zero")),
    }
}

fn stop_price(request: &StopLossRequest) -> AnalyticsResult<f64> {
    let entry = request.entry_price;
    match request.mode {
        StopLossMode::Technical => {
            let level = require_positive(request.technical_level, "technicalLevel")?;
            let wrong_side = match request.side {
                Side::Long => level >= entry,
                Side::Short => level <= entry,
            };
            if wrong_side {
                return Err(AnalyticsError::invalid(
                    "technicalLevel",
                    "must be on the losing side of entry",
                ));
            }
            Ok(level)
        }
        StopLossMode::Percentage => {
            let pct = require_positive(request.percentage, "percentage")?;
            if pct >= 100.0 {
                return Err(AnalyticsError::invalid("percentage", "must be below 100"));
            }
            Ok(request.side.stop_from(entry, entry * pct / 100.0))
        }
        StopLossMode::Atr => {
            let atr = require_positive(request.atr, "atr")?;
            Ok(request.side.stop_from(entry, atr * ATR_STOP_MULTIPLIER))
        }
        StopLossMode::Fixed => {
            let amount = require_positive(request.fixed_amount, "fixedAmount")?;
            Ok(request.side.stop_from(entry, amount))
        }
        StopLossMode::Time => Err(AnalyticsError::invalid("mode", "time exits have no stop price")),
    }
}

pub fn compute_stop_loss(request: &StopLossRequest) -> AnalyticsResult<StopLossResult> {
    let entry = request.entry_price;
    if !(entry.is_finite() && entry > 0.0) {
        return Err(AnalyticsError::invalid("entryPrice", "must be greater than zero"));
    }

    if request.mode == StopLossMode::Time {
        let days = match request.holding_days {
            Some(d) if d > 0 => d,
            Some(_) => return Err(AnalyticsError::invalid("holdingDays", "must be at least 1")),
            None => return Err(AnalyticsError::missing("holdingDays")),
        };
        return Ok(StopLossResult {
            mode: request.mode,
            stop_price: None,
            stop_distance: None,
            stop_percent: None,
            max_loss: None,
            exit_after_days: Some(days),
        });
    }

    let stop = ensure_finite(stop_price(request)?, "stopPrice")?;
    if stop <= 0.0 {
        return Err(AnalyticsError::invalid(
            match request.mode {
                StopLossMode::Percentage => "percentage",
                StopLossMode::Atr => "atr",
                StopLossMode::Fixed => "fixedAmount",
                _ => "technicalLevel",
            },
            "places the stop at or below zero",
        ));
    }

    let distance = (entry - stop).abs();
    let quantity = request.quantity.unwrap_or(1) as f64;

    debug!(mode = ?request.mode, side = ?request.side, entry, stop, "Computed stop");

    Ok(StopLossResult {
        mode: request.mode,
        stop_price: Some(stop),
        stop_distance: Some(distance),
        stop_percent: Some(distance / entry * 100.0),
        max_loss: Some(distance * quantity),
        exit_after_days: request.holding_days,
    })
}
