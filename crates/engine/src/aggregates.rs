//! Chain-wide aggregates: put/call ratio, max pain, gamma exposure, IV percentile

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{MarketAggregate, OptionChain};

/// PCR reported when there is no call open interest and no prior value
pub const PCR_SENTINEL: f64 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateConfig {
    /// Multiplier applied to summed gamma × OI (contract size by default)
    pub gex_scaling: f64,
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self { gex_scaling: 100.0 }
    }
}

/// Σ put OI / Σ call OI. With no call OI, returns `previous` or [`PCR_SENTINEL`].
pub fn put_call_ratio(chain: &OptionChain, previous: Option<f64>) -> f64 {
    let calls = chain.total_call_oi();
    let puts = chain.total_put_oi();
    if calls <= 0 {
        debug!(symbol = %chain.symbol, puts, "No call open interest, PCR falls back");
        return previous
            .filter(|p| p.is_finite())
            .unwrap_or(PCR_SENTINEL);
    }
    puts as f64 / calls as f64
}

/// Total payout to option holders if the underlying settles at `settle`
pub fn holder_payout(chain: &OptionChain, settle: f64) -> f64 {
    chain
        .strikes
        .iter()
        .map(|s| {
            let call = (settle - s.strike).max(0.0) * s.call.oi as f64;
            let put = (s.strike - settle).max(0.0) * s.put.oi as f64;
            call + put
        })
        .sum()
}

/// Strike that minimises total holder payout at expiration.
///
/// Candidates are the chain's own strikes; ties go to the lowest strike.
/// `None` for an empty chain.
pub fn max_pain(chain: &OptionChain) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None;
    for candidate in &chain.strikes {
        let loss = holder_payout(chain, candidate.strike);
        match best {
            Some((_, best_loss)) if loss >= best_loss => {}
            _ => best = Some((candidate.strike, loss)),
        }
    }
    best.map(|(strike, _)| strike)
}

/// Σ (call γ · call OI − put γ · put OI) · scaling.
///
/// Positive: dealer hedging dampens moves. Negative: hedging amplifies them.
pub fn gamma_exposure(chain: &OptionChain, scaling: f64) -> f64 {
    chain
        .strikes
        .iter()
        .map(|s| s.call.gamma * s.call.oi as f64 - s.put.gamma * s.put.oi as f64)
        .sum::<f64>()
        * scaling
}

/// Share of `history` at or below `current`, as 0-100. Empty history reads 50.
pub fn iv_percentile(current: f64, history: &[f64]) -> f64 {
    let valid: Vec<f64> = history.iter().copied().filter(|v| v.is_finite()).collect();
    if valid.is_empty() || !current.is_finite() {
        return 50.0;
    }
    let at_or_below = valid.iter().filter(|&&v| v <= current).count();
    at_or_below as f64 / valid.len() as f64 * 100.0
}

/// Mean of the call and put IV at the strike nearest spot
pub fn atm_iv(chain: &OptionChain) -> Option<f64> {
    chain.atm().map(|s| (s.call.iv + s.put.iv) / 2.0)
}

/// Recompute every aggregate for one chain snapshot.
pub fn aggregate_chain(
    chain: &OptionChain,
    date: NaiveDate,
    iv_history: &[f64],
    previous_pcr: Option<f64>,
    config: &AggregateConfig,
) -> MarketAggregate {
    let pcr = put_call_ratio(chain, previous_pcr);
    let max_pain = max_pain(chain);
    let gamma_exposure = gamma_exposure(chain, config.gex_scaling);
    let iv_percentile = atm_iv(chain)
        .map(|iv| iv_percentile(iv, iv_history))
        .unwrap_or(50.0);

    debug!(
        symbol = %chain.symbol,
        pcr,
        max_pain = ?max_pain,
        gex = gamma_exposure,
        iv_percentile,
        "Aggregated chain"
    );

    MarketAggregate {
        symbol: chain.symbol.clone(),
        date,
        pcr,
        max_pain,
        gamma_exposure,
        iv_percentile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OptionQuote, StrikeQuote};

    fn side(oi: i64, gamma: f64, iv: f64) -> OptionQuote {
        OptionQuote {
            oi,
            gamma,
            iv,
            ..Default::default()
        }
    }

    fn chain(rows: &[(f64, i64, i64)]) -> OptionChain {
        OptionChain {
            symbol: "SPY".to_string(),
            expiration: NaiveDate::from_ymd_opt(2024, 4, 19).unwrap(),
            as_of_timestamp: 0,
            spot: 100.0,
            strikes: rows
                .iter()
                .map(|&(strike, call_oi, put_oi)| StrikeQuote {
                    strike,
                    call: side(call_oi, 0.05, 0.30),
                    put: side(put_oi, 0.05, 0.34),
                })
                .collect(),
        }
    }

    #[test]
    fn test_pcr_all_calls_is_zero() {
        let c = chain(&[(95.0, 100, 0), (100.0, 200, 0)]);
        assert_eq!(put_call_ratio(&c, None), 0.0);
    }

    #[test]
    fn test_pcr_all_puts_is_guarded() {
        let c = chain(&[(95.0, 0, 100), (100.0, 0, 200)]);
        assert_eq!(put_call_ratio(&c, None), PCR_SENTINEL);
        assert_eq!(put_call_ratio(&c, Some(1.7)), 1.7);
        assert_eq!(put_call_ratio(&c, Some(f64::NAN)), PCR_SENTINEL);
    }

    #[test]
    fn test_pcr_ratio() {
        let c = chain(&[(95.0, 100, 150), (100.0, 100, 50)]);
        assert_eq!(put_call_ratio(&c, None), 1.0);
        let c = chain(&[(95.0, 400, 100), (100.0, 0, 200)]);
        assert_eq!(put_call_ratio(&c, None), 0.75);
    }

    #[test]
    fn test_max_pain_symmetric_chain_is_middle() {
        let c = chain(&[
            (90.0, 100, 100),
            (95.0, 100, 100),
            (100.0, 100, 100),
            (105.0, 100, 100),
            (110.0, 100, 100),
        ]);
        assert_eq!(max_pain(&c), Some(100.0));
    }

    #[test]
    fn test_max_pain_follows_open_interest() {
        // heavy calls at 90 pull pain down, since holders of 90 calls get paid above 90
        let c = chain(&[(90.0, 1_000, 0), (100.0, 0, 10), (110.0, 0, 10)]);
        assert_eq!(max_pain(&c), Some(90.0));
        // loss(90) = 0 + 10*10 + 20*10 = 300
        assert_eq!(holder_payout(&c, 90.0), 300.0);
    }

    #[test]
    fn test_max_pain_tie_takes_lowest_strike() {
        let c = chain(&[(95.0, 0, 0), (100.0, 0, 0)]);
        assert_eq!(max_pain(&c), Some(95.0));
        assert_eq!(max_pain(&chain(&[])), None);
    }

    #[test]
    fn test_gamma_exposure_sign() {
        let call_heavy = chain(&[(100.0, 1_000, 200)]);
        // (0.05 * 1000 - 0.05 * 200) * 100 = 4000
        assert!((gamma_exposure(&call_heavy, 100.0) - 4_000.0).abs() < 1e-9);

        let put_heavy = chain(&[(100.0, 200, 1_000)]);
        assert!(gamma_exposure(&put_heavy, 100.0) < 0.0);
    }

    #[test]
    fn test_iv_percentile() {
        let history = [0.20, 0.25, 0.30, 0.35, 0.40];
        assert_eq!(iv_percentile(0.30, &history), 60.0);
        assert_eq!(iv_percentile(0.10, &history), 0.0);
        assert_eq!(iv_percentile(0.50, &history), 100.0);
        assert_eq!(iv_percentile(0.30, &[]), 50.0);
    }

    #[test]
    fn test_aggregate_chain() {
        let c = chain(&[(95.0, 100, 120), (100.0, 300, 300), (105.0, 100, 80)]);
        let agg = aggregate_chain(
            &c,
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            &[0.25, 0.30, 0.35, 0.40],
            None,
            &AggregateConfig::default(),
        );
        assert_eq!(agg.symbol, "SPY");
        assert_eq!(agg.pcr, 1.0);
        assert_eq!(agg.max_pain, Some(100.0));
        // ATM IV = (0.30 + 0.34) / 2 = 0.32 → 2 of 4 at or below
        assert_eq!(agg.iv_percentile, 50.0);
        assert!(agg.gamma_exposure.abs() < 1e-9);
    }
}
