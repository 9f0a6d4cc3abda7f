//! Synthetic option Greeks
//!
//! NOT a pricing model. These are deterministic shapes derived from how far a
//! strike sits from spot, used to fill chain rows when no market-data feed is
//! available. They are internally consistent with each other and nothing more:
//! never read them as Black-Scholes sensitivities.

use serde::{Deserialize, Serialize};

use crate::chain::DEFAULT_SPOT_PRICE;

/// Synthetic sensitivities for one strike. See the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyntheticGreeks {
    pub gamma: f64,
    pub vanna: f64,
    pub charm: f64,
    pub vomma: f64,
}

/// |K - S| / S, falling back to the default spot when `spot` is unusable.
pub fn strike_distance(spot: f64, strike: f64) -> f64 {
    let spot = if spot.is_finite() && spot > 0.0 {
        spot
    } else {
        DEFAULT_SPOT_PRICE
    };
    (strike - spot).abs() / spot
}

/// Linear volatility smile: 30% at the money, +0.5 vol per unit of distance.
pub fn synthetic_iv(distance: f64) -> f64 {
    0.30 + distance * 0.5
}

impl SyntheticGreeks {
    pub fn approximate(spot: f64, strike: f64) -> Self {
        Self::from_distance(strike_distance(spot, strike))
    }

    pub fn from_distance(d: f64) -> Self {
        let gamma = if d < 0.05 { 0.08 - d } else { 0.03 - d };
        let vanna = if d > 0.02 && d < 0.10 {
            0.05 - d * 0.3
        } else {
            0.01
        };
        let charm = if d < 0.03 { 0.04 - d } else { 0.01 };
        let vomma = if d > 0.10 { 0.15 } else { 0.05 + d * 0.5 };

        Self {
            gamma: gamma.max(0.0),
            vanna,
            charm,
            vomma,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atm_values() {
        let g = SyntheticGreeks::approximate(100.0, 100.0);
        assert_eq!(g.gamma, 0.08);
        assert_eq!(g.vanna, 0.01);
        assert_eq!(g.charm, 0.04);
        assert_eq!(g.vomma, 0.05);
        assert_eq!(synthetic_iv(0.0), 0.30);
    }

    #[test]
    fn test_gamma_non_negative() {
        for i in 0..500 {
            let d = i as f64 * 0.002;
            let g = SyntheticGreeks::from_distance(d);
            assert!(g.gamma >= 0.0, "gamma negative at d={d}");
        }
        assert_eq!(SyntheticGreeks::from_distance(0.5).gamma, 0.0);
    }

    #[test]
    fn test_gamma_step_at_five_percent() {
        let inside = SyntheticGreeks::from_distance(0.04);
        let outside = SyntheticGreeks::from_distance(0.05);
        assert!((inside.gamma - 0.04).abs() < 1e-12);
        assert_eq!(outside.gamma, 0.0);
        assert!((SyntheticGreeks::from_distance(0.01).gamma - 0.07).abs() < 1e-12);
    }

    #[test]
    fn test_vanna_band_is_exclusive() {
        assert_eq!(SyntheticGreeks::from_distance(0.02).vanna, 0.01);
        assert_eq!(SyntheticGreeks::from_distance(0.10).vanna, 0.01);
        let mid = SyntheticGreeks::from_distance(0.05);
        assert!((mid.vanna - 0.035).abs() < 1e-12);
    }

    #[test]
    fn test_vomma_and_charm_regions() {
        let far = SyntheticGreeks::approximate(100.0, 120.0);
        assert_eq!(far.vomma, 0.15);
        assert_eq!(far.charm, 0.01);
        let near = SyntheticGreeks::approximate(100.0, 102.0);
        assert!((near.charm - 0.02).abs() < 1e-12);
        assert!((near.vomma - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_distance_is_symmetric_and_smile_rises() {
        assert_eq!(strike_distance(100.0, 90.0), strike_distance(100.0, 110.0));
        assert!(synthetic_iv(strike_distance(100.0, 120.0)) > synthetic_iv(0.0));
        assert!((synthetic_iv(0.2) - 0.40).abs() < 1e-12);
    }

    #[test]
    fn test_unusable_spot_falls_back() {
        assert_eq!(
            strike_distance(0.0, DEFAULT_SPOT_PRICE),
            0.0
        );
        assert_eq!(
            strike_distance(f64::NAN, DEFAULT_SPOT_PRICE),
            0.0
        );
    }
}
