//! Rule-based setup classifier
//!
//! Scores three independent rule sets (bullish, bearish, neutral) against one
//! technical snapshot plus one market aggregate, and picks the rule set with
//! the highest share of passing rules. Nothing carries over between runs.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::indicators::VolumeTrend;
use crate::types::{MarketAggregate, SetupType, TechnicalSnapshot, TradeSetup};

// ============================================================================
// EMA alignment
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmaTrend {
    Bullish,
    Bearish,
    /// EMAs within the convergence band of each other
    Converged,
    Mixed,
}

impl EmaTrend {
    pub fn from_emas(ema10: f64, ema20: f64, ema50: f64, convergence_pct: f64) -> Self {
        let rel = |a: f64, b: f64| if b != 0.0 { ((a - b) / b).abs() } else { f64::INFINITY };
        if ema10 > ema20 && ema20 > ema50 {
            Self::Bullish
        } else if ema10 < ema20 && ema20 < ema50 {
            Self::Bearish
        } else if rel(ema10, ema20) <= convergence_pct && rel(ema20, ema50) <= convergence_pct {
            Self::Converged
        } else {
            Self::Mixed
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Order in which equally-scored setups are preferred
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieBreakPolicy(pub Vec<SetupType>);

impl Default for TieBreakPolicy {
    fn default() -> Self {
        Self(vec![SetupType::Bullish, SetupType::Bearish, SetupType::Neutral])
    }
}

impl TieBreakPolicy {
    /// Lower rank wins; types missing from the list rank last
    fn rank(&self, setup: SetupType) -> usize {
        self.0
            .iter()
            .position(|s| *s == setup)
            .unwrap_or(self.0.len())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub bullish_rsi: (f64, f64),
    pub bearish_rsi: (f64, f64),
    pub neutral_rsi: (f64, f64),
    /// Bullish needs PCR below this
    pub bullish_pcr_max: f64,
    /// Bearish needs PCR above this
    pub bearish_pcr_min: f64,
    /// Absolute GEX level separating "large" from "small"; scale-dependent
    pub gex_threshold: f64,
    /// Relative EMA spread treated as converged (0.01 = 1%)
    pub ema_convergence_pct: f64,
    pub tie_break: TieBreakPolicy,
    /// Stop distance in ATRs when ATR is known
    pub atr_stop_multiple: f64,
    /// Stop distance as a fraction of entry when ATR is unknown
    pub fallback_stop_pct: f64,
    /// Target distance as a multiple of stop distance
    pub reward_multiple: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            bullish_rsi: (55.0, 80.0),
            bearish_rsi: (20.0, 45.0),
            neutral_rsi: (45.0, 55.0),
            bullish_pcr_max: 0.8,
            bearish_pcr_min: 1.2,
            gex_threshold: 500_000.0,
            ema_convergence_pct: 0.01,
            tie_break: TieBreakPolicy::default(),
            atr_stop_multiple: 1.5,
            fallback_stop_pct: 0.03,
            reward_multiple: 2.0,
        }
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleCheck {
    pub rule: &'static str,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSetScore {
    pub setup_type: SetupType,
    pub strength: u8,
    pub checks: Vec<RuleCheck>,
}

/// Display band for a strength score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthBand {
    Weak,
    Moderate,
    Strong,
}

impl StrengthBand {
    pub fn from_strength(strength: u8) -> Self {
        match strength {
            80.. => Self::Strong,
            65..=79 => Self::Moderate,
            _ => Self::Weak,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub setup_type: SetupType,
    pub strength: u8,
    pub band: StrengthBand,
    pub ema_trend: EmaTrend,
    /// All three rule sets, bullish first
    pub scores: Vec<RuleSetScore>,
}

/// Everything the classifier looks at for one ticker on one date
#[derive(Debug, Clone)]
pub struct ClassifierInput<'a> {
    pub snapshot: &'a TechnicalSnapshot,
    pub aggregate: &'a MarketAggregate,
    pub volume: VolumeTrend,
}

// ============================================================================
// Classifier
// ============================================================================

fn in_range(value: Option<f64>, (lo, hi): (f64, f64)) -> bool {
    value.is_some_and(|v| v >= lo && v <= hi)
}

fn score(setup_type: SetupType, checks: Vec<RuleCheck>) -> RuleSetScore {
    let passed = checks.iter().filter(|c| c.passed).count();
    let strength = if checks.is_empty() {
        0
    } else {
        (passed as f64 * 100.0 / checks.len() as f64).round() as u8
    };
    RuleSetScore {
        setup_type,
        strength,
        checks,
    }
}

#[derive(Debug, Clone, Default)]
pub struct SetupClassifier {
    config: ClassifierConfig,
}

impl SetupClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn score_all(&self, input: &ClassifierInput<'_>) -> (EmaTrend, Vec<RuleSetScore>) {
        let cfg = &self.config;
        let snap = input.snapshot;
        let agg = input.aggregate;
        let trend =
            EmaTrend::from_emas(snap.ema10, snap.ema20, snap.ema50, cfg.ema_convergence_pct);

        let bullish = score(
            SetupType::Bullish,
            vec![
                RuleCheck {
                    rule: "ema_alignment_bullish",
                    passed: trend == EmaTrend::Bullish,
                },
                RuleCheck {
                    rule: "rsi_in_bullish_range",
                    passed: in_range(snap.rsi14, cfg.bullish_rsi),
                },
                RuleCheck {
                    rule: "pcr_below_bullish_max",
                    passed: agg.pcr < cfg.bullish_pcr_max,
                },
                RuleCheck {
                    rule: "gex_strongly_positive",
                    passed: agg.gamma_exposure > cfg.gex_threshold,
                },
                RuleCheck {
                    rule: "volume_increasing",
                    passed: input.volume.increasing,
                },
            ],
        );

        let bearish = score(
            SetupType::Bearish,
            vec![
                RuleCheck {
                    rule: "ema_alignment_bearish",
                    passed: trend == EmaTrend::Bearish,
                },
                RuleCheck {
                    rule: "rsi_in_bearish_range",
                    passed: in_range(snap.rsi14, cfg.bearish_rsi),
                },
                RuleCheck {
                    rule: "pcr_above_bearish_min",
                    passed: agg.pcr > cfg.bearish_pcr_min,
                },
                RuleCheck {
                    rule: "gex_strongly_negative",
                    passed: agg.gamma_exposure < -cfg.gex_threshold,
                },
                RuleCheck {
                    rule: "volume_increasing_on_down_days",
                    passed: input.volume.increasing_on_down_days,
                },
            ],
        );

        let neutral = score(
            SetupType::Neutral,
            vec![
                RuleCheck {
                    rule: "ema_converged",
                    passed: trend == EmaTrend::Converged,
                },
                RuleCheck {
                    rule: "rsi_in_neutral_range",
                    passed: in_range(snap.rsi14, cfg.neutral_rsi),
                },
                RuleCheck {
                    rule: "pcr_balanced",
                    passed: agg.pcr >= cfg.bullish_pcr_max && agg.pcr <= cfg.bearish_pcr_min,
                },
                RuleCheck {
                    rule: "gex_small",
                    passed: agg.gamma_exposure.abs() < cfg.gex_threshold,
                },
            ],
        );

        (trend, vec![bullish, bearish, neutral])
    }

    /// Evaluate all rule sets and keep the strongest, ties per [`TieBreakPolicy`].
    pub fn classify(&self, input: &ClassifierInput<'_>) -> Classification {
        let (ema_trend, scores) = self.score_all(input);

        let winner = scores
            .iter()
            .min_by_key(|s| {
                (
                    std::cmp::Reverse(s.strength),
                    self.config.tie_break.rank(s.setup_type),
                )
            })
            .map(|s| (s.setup_type, s.strength))
            .unwrap_or((SetupType::Neutral, 0));

        debug!(
            setup = %winner.0,
            strength = winner.1,
            trend = ?ema_trend,
            "Classified setup"
        );

        Classification {
            setup_type: winner.0,
            strength: winner.1,
            band: StrengthBand::from_strength(winner.1),
            ema_trend,
            scores,
        }
    }

    /// Turn a classification into entry/stop/target levels.
    ///
    /// Stop distance is `atr * atr_stop_multiple`, or `fallback_stop_pct` of
    /// entry without ATR. Directional setups target `reward_multiple` stop
    /// distances; neutral uses a symmetric band.
    pub fn build_setup(
        &self,
        ticker: &str,
        snapshot: &TechnicalSnapshot,
        classification: &Classification,
        entry_price: f64,
        atr: Option<f64>,
    ) -> AnalyticsResult<TradeSetup> {
        if !(entry_price.is_finite() && entry_price > 0.0) {
            return Err(AnalyticsError::invalid("entryPrice", "must be a positive number"));
        }
        let cfg = &self.config;

        let stop_distance = match atr {
            Some(a) if a.is_finite() && a > 0.0 => a * cfg.atr_stop_multiple,
            _ => entry_price * cfg.fallback_stop_pct,
        };
        let reward_distance = match classification.setup_type {
            SetupType::Neutral => stop_distance,
            _ => stop_distance * cfg.reward_multiple,
        };

        let (stop_loss, target_price) = match classification.setup_type {
            SetupType::Bullish | SetupType::Neutral => {
                (entry_price - stop_distance, entry_price + reward_distance)
            }
            SetupType::Bearish => (entry_price + stop_distance, entry_price - reward_distance),
        };
        // Prices cannot go below zero; the ratio is reported for the clamped levels
        let (stop_loss, target_price) = (stop_loss.max(0.0), target_price.max(0.0));

        let risk = (entry_price - stop_loss).abs();
        let risk_reward_ratio = if risk > 0.0 {
            (target_price - entry_price).abs() / risk
        } else {
            0.0
        };

        Ok(TradeSetup {
            ticker: ticker.to_string(),
            date: snapshot.date,
            setup_type: classification.setup_type,
            strength: classification.strength,
            entry_price,
            stop_loss,
            target_price,
            risk_reward_ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn snapshot(ema10: f64, ema20: f64, ema50: f64, rsi: Option<f64>) -> TechnicalSnapshot {
        TechnicalSnapshot {
            date: date(),
            ema10,
            ema20,
            ema50,
            rsi14: rsi,
            stoch_rsi14: None,
        }
    }

    fn aggregate(pcr: f64, gex: f64) -> MarketAggregate {
        MarketAggregate {
            symbol: "SPY".to_string(),
            date: date(),
            pcr,
            max_pain: Some(100.0),
            gamma_exposure: gex,
            iv_percentile: 50.0,
        }
    }

    #[test]
    fn test_ema_trend() {
        assert_eq!(EmaTrend::from_emas(110.0, 105.0, 100.0, 0.01), EmaTrend::Bullish);
        assert_eq!(EmaTrend::from_emas(90.0, 95.0, 100.0, 0.01), EmaTrend::Bearish);
        assert_eq!(EmaTrend::from_emas(100.2, 100.0, 100.5, 0.01), EmaTrend::Converged);
        assert_eq!(EmaTrend::from_emas(110.0, 100.0, 105.0, 0.01), EmaTrend::Mixed);
    }

    #[test]
    fn test_tight_ordered_emas_keep_their_direction() {
        assert_eq!(EmaTrend::from_emas(100.5, 100.3, 100.0, 0.01), EmaTrend::Bullish);
        assert_eq!(EmaTrend::from_emas(100.0, 100.3, 100.5, 0.01), EmaTrend::Bearish);
        assert_eq!(EmaTrend::from_emas(100.3, 100.3, 100.0, 0.01), EmaTrend::Converged);

        // A tight uptrend still passes the bullish alignment rule
        let snap = snapshot(100.5, 100.3, 100.0, Some(65.0));
        let agg = aggregate(0.7, 600_000.0);
        let input = ClassifierInput {
            snapshot: &snap,
            aggregate: &agg,
            volume: VolumeTrend::default(),
        };
        let result = SetupClassifier::default().classify(&input);
        assert_eq!(result.ema_trend, EmaTrend::Bullish);
        assert_eq!(result.setup_type, SetupType::Bullish);
        assert_eq!(result.strength, 80);
    }

    #[test]
    fn test_bullish_example_is_strong() {
        let snap = snapshot(110.0, 105.0, 100.0, Some(65.0));
        let agg = aggregate(0.7, 600_000.0);
        let input = ClassifierInput {
            snapshot: &snap,
            aggregate: &agg,
            volume: VolumeTrend::default(),
        };
        let result = SetupClassifier::default().classify(&input);
        assert_eq!(result.setup_type, SetupType::Bullish);
        assert!(result.strength >= 80);
        assert_eq!(result.band, StrengthBand::Strong);
        assert_eq!(result.ema_trend, EmaTrend::Bullish);

        let with_volume = ClassifierInput {
            volume: VolumeTrend {
                increasing: true,
                increasing_on_down_days: false,
            },
            ..input
        };
        assert_eq!(SetupClassifier::default().classify(&with_volume).strength, 100);
    }

    #[test]
    fn test_bearish_classification() {
        let snap = snapshot(90.0, 95.0, 100.0, Some(35.0));
        let agg = aggregate(1.4, -750_000.0);
        let input = ClassifierInput {
            snapshot: &snap,
            aggregate: &agg,
            volume: VolumeTrend {
                increasing: false,
                increasing_on_down_days: true,
            },
        };
        let result = SetupClassifier::default().classify(&input);
        assert_eq!(result.setup_type, SetupType::Bearish);
        assert_eq!(result.strength, 100);
    }

    #[test]
    fn test_neutral_classification() {
        let snap = snapshot(100.1, 100.0, 100.2, Some(50.0));
        let agg = aggregate(1.0, 10_000.0);
        let input = ClassifierInput {
            snapshot: &snap,
            aggregate: &agg,
            volume: VolumeTrend::default(),
        };
        let result = SetupClassifier::default().classify(&input);
        assert_eq!(result.setup_type, SetupType::Neutral);
        assert_eq!(result.strength, 100);
        assert_eq!(result.scores.len(), 3);
        assert_eq!(result.scores[2].checks.len(), 4);
    }

    #[test]
    fn test_tie_break_policy_is_configurable() {
        // Mixed EMAs and no RSI: bullish passes only PCR, bearish only GEX, both 1/5
        let snap = snapshot(110.0, 100.0, 105.0, None);
        let agg = aggregate(0.5, -900_000.0);
        let input = ClassifierInput {
            snapshot: &snap,
            aggregate: &agg,
            volume: VolumeTrend::default(),
        };

        let default = SetupClassifier::default().classify(&input);
        assert_eq!(default.strength, 20);
        assert_eq!(default.setup_type, SetupType::Bullish);

        let bearish_first = SetupClassifier::new(ClassifierConfig {
            tie_break: TieBreakPolicy(vec![
                SetupType::Bearish,
                SetupType::Bullish,
                SetupType::Neutral,
            ]),
            ..Default::default()
        });
        assert_eq!(bearish_first.classify(&input).setup_type, SetupType::Bearish);
    }

    #[test]
    fn test_strength_bands() {
        assert_eq!(StrengthBand::from_strength(100), StrengthBand::Strong);
        assert_eq!(StrengthBand::from_strength(80), StrengthBand::Strong);
        assert_eq!(StrengthBand::from_strength(79), StrengthBand::Moderate);
        assert_eq!(StrengthBand::from_strength(65), StrengthBand::Moderate);
        assert_eq!(StrengthBand::from_strength(60), StrengthBand::Weak);
    }

    #[test]
    fn test_build_setup_levels() {
        let classifier = SetupClassifier::default();
        let snap = snapshot(110.0, 105.0, 100.0, Some(65.0));
        let agg = aggregate(0.7, 600_000.0);
        let input = ClassifierInput {
            snapshot: &snap,
            aggregate: &agg,
            volume: VolumeTrend::default(),
        };
        let classification = classifier.classify(&input);

        let setup = classifier
            .build_setup("SPY", &snap, &classification, 100.0, Some(2.0))
            .unwrap();
        assert_eq!(setup.stop_loss, 97.0);
        assert_eq!(setup.target_price, 106.0);
        assert_eq!(setup.risk_reward_ratio, 2.0);
        assert_eq!(setup.strength, classification.strength);

        let no_atr = classifier
            .build_setup("SPY", &snap, &classification, 100.0, None)
            .unwrap();
        assert_eq!(no_atr.stop_loss, 97.0);

        assert!(classifier
            .build_setup("SPY", &snap, &classification, 0.0, None)
            .is_err());
    }

    #[test]
    fn test_build_bearish_setup_levels() {
        let classifier = SetupClassifier::default();
        let snap = snapshot(90.0, 95.0, 100.0, Some(35.0));
        let classification = Classification {
            setup_type: SetupType::Bearish,
            strength: 80,
            band: StrengthBand::Strong,
            ema_trend: EmaTrend::Bearish,
            scores: Vec::new(),
        };
        let setup = classifier
            .build_setup("SPY", &snap, &classification, 50.0, Some(1.0))
            .unwrap();
        assert_eq!(setup.stop_loss, 51.5);
        assert_eq!(setup.target_price, 47.0);
        assert_eq!(setup.risk_reward_ratio, 2.0);
    }

    #[test]
    fn test_setup_ratio_matches_clamped_levels() {
        let classifier = SetupClassifier::default();
        let snap = snapshot(90.0, 95.0, 100.0, Some(35.0));
        let classification = Classification {
            setup_type: SetupType::Bearish,
            strength: 60,
            band: StrengthBand::Weak,
            ema_trend: EmaTrend::Bearish,
            scores: Vec::new(),
        };
        let setup = classifier
            .build_setup("PENNY", &snap, &classification, 1.0, Some(1.0))
            .unwrap();
        assert_eq!(setup.stop_loss, 2.5);
        assert_eq!(setup.target_price, 0.0);

        let risk = (setup.entry_price - setup.stop_loss).abs();
        let reward = (setup.target_price - setup.entry_price).abs();
        assert!((setup.risk_reward_ratio - reward / risk).abs() < 1e-12);
        assert!((setup.risk_reward_ratio - 2.0 / 3.0).abs() < 1e-12);
    }
}
