//! Risk/reward, win probability and expected value for a proposed position
//!
//! Option amounts are per contract (100 shares) times quantity; stock amounts
//! are per share times quantity.
//!
//! The win-probability estimate is a heuristic. It is not calibrated against
//! outcome data and should be shown as a rough guide only.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ensure_finite, AnalyticsError, AnalyticsResult};

pub const CONTRACT_MULTIPLIER: f64 = 100.0;
pub const MIN_WIN_PROBABILITY: f64 = 10.0;
pub const MAX_WIN_PROBABILITY: f64 = 90.0;
/// IV assumed by the heuristic when the caller gives none (percent)
const DEFAULT_IV: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    LongStock,
    ShortStock,
    Call,
    Put,
    /// Debit vertical: long `strike`, short `short_strike`
    Spread,
    /// Credit iron condor: `option_premium` is the credit received
    IronCondor,
}

/// A position as submitted by the caller. Required fields depend on the instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSpec {
    pub instrument: InstrumentType,
    /// Underlying price at entry
    pub entry_price: f64,
    pub target_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub option_premium: Option<f64>,
    pub strike: Option<f64>,
    pub short_strike: Option<f64>,
    pub wing_width: Option<f64>,
    /// Implied volatility in percent (35 = 35%)
    pub iv: Option<f64>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Caller-supplied win probability in percent; estimated when absent
    pub win_probability: Option<f64>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Favorable,
    Acceptable,
    Warning,
}

impl Recommendation {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 2.0 {
            Self::Favorable
        } else if ratio >= 1.0 {
            Self::Acceptable
        } else {
            Self::Warning
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Favorable => "Reward comfortably exceeds risk",
            Self::Acceptable => "Reward covers risk",
            Self::Warning => "Risk exceeds potential reward",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAnalysisResult {
    pub instrument: InstrumentType,
    /// Dollars at risk for the whole position
    pub risk_amount: f64,
    /// Dollars gained if the target is reached
    pub reward_amount: f64,
    pub risk_reward_ratio: f64,
    /// Percent, 0-100
    pub win_probability: f64,
    pub win_probability_estimated: bool,
    pub expected_value: f64,
    pub breakeven: Option<f64>,
    pub recommendation: Recommendation,
}

// ============================================================================
// Field helpers
// ============================================================================

fn require(value: Option<f64>, field: &'static str) -> AnalyticsResult<f64> {
    let v = value.ok_or_else(|| AnalyticsError::missing(field))?;
    if !v.is_finite() {
        return Err(AnalyticsError::invalid(field, "must be a finite number"));
    }
    Ok(v)
}

fn require_positive(value: Option<f64>, field: &'static str) -> AnalyticsResult<f64> {
    let v = require(value, field)?;
    if v <= 0.0 {
        return Err(AnalyticsError::invalid(field, "must be greater than zero"));
    }
    Ok(v)
}

/// Per-unit (risk, reward, breakeven) and the unit multiplier
struct Legs {
    risk: f64,
    reward: f64,
    breakeven: Option<f64>,
    multiplier: f64,
}

fn legs(spec: &PositionSpec) -> AnalyticsResult<Legs> {
    let entry = spec.entry_price;
    match spec.instrument {
        InstrumentType::LongStock => {
            let target = require_positive(spec.target_price, "targetPrice")?;
            let stop = require_positive(spec.stop_loss, "stopLoss")?;
            if stop >= entry {
                return Err(AnalyticsError::invalid(
                    "stopLoss",
                    "must be below entry for a long position",
                ));
            }
            Ok(Legs {
                risk: entry - stop,
                reward: target - entry,
                breakeven: Some(entry),
                multiplier: 1.0,
            })
        }
        InstrumentType::ShortStock => {
            let target = require_positive(spec.target_price, "targetPrice")?;
            let stop = require_positive(spec.stop_loss, "stopLoss")?;
            if stop <= entry {
                return Err(AnalyticsError::invalid(
                    "stopLoss",
                    "must be above entry for a short position",
                ));
            }
            Ok(Legs {
                risk: stop - entry,
                reward: entry - target,
                breakeven: Some(entry),
                multiplier: 1.0,
            })
        }
        InstrumentType::Call => {
            let target = require_positive(spec.target_price, "targetPrice")?;
            let strike = require_positive(spec.strike, "strike")?;
            let premium = require_positive(spec.option_premium, "optionPremium")?;
            Ok(Legs {
                risk: premium,
                reward: (target - strike).max(0.0) - premium,
                breakeven: Some(strike + premium),
                multiplier: CONTRACT_MULTIPLIER,
            })
        }
        InstrumentType::Put => {
            let target = require_positive(spec.target_price, "targetPrice")?;
            let strike = require_positive(spec.strike, "strike")?;
            let premium = require_positive(spec.option_premium, "optionPremium")?;
            Ok(Legs {
                risk: premium,
                reward: (strike - target).max(0.0) - premium,
                breakeven: Some(strike - premium),
                multiplier: CONTRACT_MULTIPLIER,
            })
        }
        InstrumentType::Spread => {
            let target = require_positive(spec.target_price, "targetPrice")?;
            let long_strike = require_positive(spec.strike, "strike")?;
            let short_strike = require_positive(spec.short_strike, "shortStrike")?;
            let premium = require_positive(spec.option_premium, "optionPremium")?;
            let width = (short_strike - long_strike).abs();
            if width == 0.0 {
                return Err(AnalyticsError::invalid("shortStrike", "must differ from strike"));
            }
            if premium >= width {
                return Err(AnalyticsError::invalid(
                    "optionPremium",
                    "debit must be less than the spread width",
                ));
            }
            // short strike above long strike reads as a call spread, below as a put spread
            let (intrinsic, breakeven) = if short_strike > long_strike {
                ((target - long_strike).clamp(0.0, width), long_strike + premium)
            } else {
                ((long_strike - target).clamp(0.0, width), long_strike - premium)
            };
            Ok(Legs {
                risk: premium,
                reward: intrinsic - premium,
                breakeven: Some(breakeven),
                multiplier: CONTRACT_MULTIPLIER,
            })
        }
        InstrumentType::IronCondor => {
            let credit = require_positive(spec.option_premium, "optionPremium")?;
            let wing = require_positive(spec.wing_width, "wingWidth")?;
            if credit >= wing {
                return Err(AnalyticsError::invalid(
                    "optionPremium",
                    "credit must be less than the wing width",
                ));
            }
            Ok(Legs {
                risk: wing - credit,
                reward: credit,
                breakeven: None,
                multiplier: CONTRACT_MULTIPLIER,
            })
        }
    }
}

// ============================================================================
// Heuristics
// ============================================================================

/// Out-of-the-money distance of `strike` in percent of `entry`; negative when in the money
fn otm_pct(entry: f64, strike: f64, is_call: bool) -> f64 {
    let raw = (strike - entry) / entry * 100.0;
    if is_call {
        raw
    } else {
        -raw
    }
}

fn directional_probability(otm: f64, iv: f64) -> f64 {
    let mut p = 50.0 - otm * 2.5;
    if otm > 0.0 {
        p -= (iv - DEFAULT_IV).max(0.0) * 0.2;
    }
    p
}

/// Rough default win probability in percent, clamped to [10, 90].
///
/// Stocks use the stop/target distance split. Options start at 50 and lose
/// probability the further out of the money the strike is, and again for
/// high IV on OTM strikes. Condors start at 70 and decay with IV.
pub fn estimate_win_probability(spec: &PositionSpec) -> f64 {
    let entry = spec.entry_price;
    let iv = spec.iv.filter(|v| v.is_finite()).unwrap_or(DEFAULT_IV);

    let p = match spec.instrument {
        InstrumentType::LongStock | InstrumentType::ShortStock => {
            match (spec.target_price, spec.stop_loss) {
                (Some(target), Some(stop)) => {
                    let to_target = (target - entry).abs();
                    let to_stop = (entry - stop).abs();
                    if to_target + to_stop > 0.0 {
                        to_stop / (to_target + to_stop) * 100.0
                    } else {
                        50.0
                    }
                }
                _ => 50.0,
            }
        }
        InstrumentType::Call | InstrumentType::Put => match spec.strike {
            Some(strike) => {
                let is_call = spec.instrument == InstrumentType::Call;
                directional_probability(otm_pct(entry, strike, is_call), iv)
            }
            None => 50.0,
        },
        InstrumentType::Spread => match (spec.strike, spec.short_strike) {
            (Some(long), Some(short)) => {
                directional_probability(otm_pct(entry, long, short > long), iv) + 5.0
            }
            _ => 50.0,
        },
        InstrumentType::IronCondor => 70.0 - (iv - DEFAULT_IV).max(0.0) * 0.3,
    };

    if p.is_finite() {
        p.clamp(MIN_WIN_PROBABILITY, MAX_WIN_PROBABILITY)
    } else {
        50.0
    }
}

/// reward·p − risk·(1 − p), with `win_probability` in percent
pub fn expected_value(reward: f64, risk: f64, win_probability: f64) -> f64 {
    let p = win_probability / 100.0;
    reward * p - risk * (1.0 - p)
}

/// reward / risk, or 0 when there is nothing at risk
pub fn risk_reward_ratio(reward: f64, risk: f64) -> f64 {
    if risk > 0.0 {
        reward / risk
    } else {
        0.0
    }
}

/// Validate a position and compute its risk profile.
pub fn analyze_position(spec: &PositionSpec) -> AnalyticsResult<RiskAnalysisResult> {
    if !(spec.entry_price.is_finite() && spec.entry_price > 0.0) {
        return Err(AnalyticsError::invalid("entryPrice", "must be greater than zero"));
    }
    if spec.quantity == 0 {
        return Err(AnalyticsError::invalid("quantity", "must be at least 1"));
    }

    let legs = legs(spec)?;
    let units = legs.multiplier * spec.quantity as f64;
    let risk_amount = ensure_finite(legs.risk * units, "riskAmount")?;
    let reward_amount = ensure_finite(legs.reward * units, "rewardAmount")?;
    let ratio = ensure_finite(risk_reward_ratio(legs.reward, legs.risk), "riskRewardRatio")?;

    let (win_probability, estimated) = match spec.win_probability {
        Some(p) if p.is_finite() && (0.0..=100.0).contains(&p) => (p, false),
        Some(_) => {
            return Err(AnalyticsError::invalid("winProbability", "must be between 0 and 100"));
        }
        None => (estimate_win_probability(spec), true),
    };

    let expected_value = ensure_finite(
        expected_value(reward_amount, risk_amount, win_probability),
        "expectedValue",
    )?;

    debug!(
        instrument = ?spec.instrument,
        risk_amount,
        reward_amount,
        ratio,
        win_probability,
        "Analyzed position"
    );

    Ok(RiskAnalysisResult {
        instrument: spec.instrument,
        risk_amount,
        reward_amount,
        risk_reward_ratio: ratio,
        win_probability,
        win_probability_estimated: estimated,
        expected_value,
        breakeven: legs.breakeven,
        recommendation: Recommendation::from_ratio(ratio),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(instrument: InstrumentType) -> PositionSpec {
        PositionSpec {
            instrument,
            entry_price: 100.0,
            target_price: None,
            stop_loss: None,
            option_premium: None,
            strike: None,
            short_strike: None,
            wing_width: None,
            iv: None,
            quantity: 1,
            win_probability: None,
        }
    }

    #[test]
    fn test_call_risk_reward_warning() {
        let s = PositionSpec {
            target_price: Some(110.0),
            strike: Some(105.0),
            option_premium: Some(3.0),
            ..spec(InstrumentType::Call)
        };
        let r = analyze_position(&s).unwrap();
        assert!((r.reward_amount - 200.0).abs() < 1e-9);
        assert!((r.risk_amount - 300.0).abs() < 1e-9);
        assert!((r.risk_reward_ratio - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(r.recommendation, Recommendation::Warning);
        assert_eq!(r.breakeven, Some(108.0));
        assert!(r.win_probability_estimated);
    }

    #[test]
    fn test_put_reward_mirrors_call() {
        let s = PositionSpec {
            target_price: Some(90.0),
            strike: Some(95.0),
            option_premium: Some(1.0),
            quantity: 2,
            ..spec(InstrumentType::Put)
        };
        let r = analyze_position(&s).unwrap();
        // (5 - 1) * 100 * 2
        assert!((r.reward_amount - 800.0).abs() < 1e-9);
        assert!((r.risk_amount - 200.0).abs() < 1e-9);
        assert_eq!(r.risk_reward_ratio, 4.0);
        assert_eq!(r.recommendation, Recommendation::Favorable);
    }

    #[test]
    fn test_long_and_short_stock() {
        let long = PositionSpec {
            target_price: Some(110.0),
            stop_loss: Some(95.0),
            quantity: 10,
            ..spec(InstrumentType::LongStock)
        };
        let r = analyze_position(&long).unwrap();
        assert_eq!(r.risk_amount, 50.0);
        assert_eq!(r.reward_amount, 100.0);
        assert_eq!(r.risk_reward_ratio, 2.0);
        // stop 5 away, target 10 away → 5 / 15
        assert!((r.win_probability - 100.0 / 3.0).abs() < 1e-9);

        let short = PositionSpec {
            target_price: Some(90.0),
            stop_loss: Some(110.0),
            ..spec(InstrumentType::ShortStock)
        };
        let r = analyze_position(&short).unwrap();
        assert_eq!(r.risk_reward_ratio, 1.0);
        assert_eq!(r.recommendation, Recommendation::Acceptable);
    }

    #[test]
    fn test_stop_on_wrong_side_is_rejected() {
        let s = PositionSpec {
            target_price: Some(110.0),
            stop_loss: Some(101.0),
            ..spec(InstrumentType::LongStock)
        };
        assert!(matches!(
            analyze_position(&s),
            Err(AnalyticsError::InvalidInput { field: "stopLoss", .. })
        ));
    }

    #[test]
    fn test_missing_fields_are_named() {
        let s = PositionSpec {
            target_price: Some(110.0),
            option_premium: Some(3.0),
            ..spec(InstrumentType::Call)
        };
        assert_eq!(analyze_position(&s).unwrap_err(), AnalyticsError::missing("strike"));

        let s = spec(InstrumentType::IronCondor);
        assert_eq!(
            analyze_position(&s).unwrap_err(),
            AnalyticsError::missing("optionPremium")
        );
    }

    #[test]
    fn test_call_spread() {
        let s = PositionSpec {
            target_price: Some(115.0),
            strike: Some(100.0),
            short_strike: Some(110.0),
            option_premium: Some(4.0),
            ..spec(InstrumentType::Spread)
        };
        let r = analyze_position(&s).unwrap();
        // intrinsic capped at width 10, minus 4 debit
        assert!((r.reward_amount - 600.0).abs() < 1e-9);
        assert!((r.risk_amount - 400.0).abs() < 1e-9);
        assert_eq!(r.breakeven, Some(104.0));
    }

    #[test]
    fn test_iron_condor() {
        let s = PositionSpec {
            option_premium: Some(1.5),
            wing_width: Some(5.0),
            ..spec(InstrumentType::IronCondor)
        };
        let r = analyze_position(&s).unwrap();
        assert!((r.reward_amount - 150.0).abs() < 1e-9);
        assert!((r.risk_amount - 350.0).abs() < 1e-9);
        assert_eq!(r.win_probability, 70.0);
        assert_eq!(r.breakeven, None);
    }

    #[test]
    fn test_win_probability_heuristic() {
        let atm = PositionSpec {
            strike: Some(100.0),
            ..spec(InstrumentType::Call)
        };
        assert_eq!(estimate_win_probability(&atm), 50.0);

        let otm_low_iv = PositionSpec {
            strike: Some(110.0),
            iv: Some(20.0),
            ..spec(InstrumentType::Call)
        };
        let otm_high_iv = PositionSpec {
            iv: Some(80.0),
            ..otm_low_iv.clone()
        };
        let low = estimate_win_probability(&otm_low_iv);
        let high = estimate_win_probability(&otm_high_iv);
        assert_eq!(low, 25.0);
        assert!(high < low);
        assert!(high >= MIN_WIN_PROBABILITY);

        let deep_itm = PositionSpec {
            strike: Some(50.0),
            ..spec(InstrumentType::Call)
        };
        assert_eq!(estimate_win_probability(&deep_itm), MAX_WIN_PROBABILITY);
    }

    #[test]
    fn test_supplied_win_probability_and_ev() {
        let s = PositionSpec {
            target_price: Some(110.0),
            stop_loss: Some(95.0),
            win_probability: Some(40.0),
            ..spec(InstrumentType::LongStock)
        };
        let r = analyze_position(&s).unwrap();
        assert!(!r.win_probability_estimated);
        // 10 * 0.4 - 5 * 0.6 = 1
        assert!((r.expected_value - 1.0).abs() < 1e-9);

        let bad = PositionSpec {
            win_probability: Some(140.0),
            ..s
        };
        assert!(analyze_position(&bad).is_err());
    }

    #[test]
    fn test_zero_risk_ratio_sentinel() {
        assert_eq!(risk_reward_ratio(5.0, 0.0), 0.0);
        assert_eq!(expected_value(100.0, 50.0, 50.0), 25.0);
    }
}
