//! Synthetic options chain generation and spot resolution
//!
//! Used when no real chain feed is available. Everything here is
//! deterministic for a given (symbol, expiration, spot), including the
//! "random" open interest, so repeated runs and tests see the same chain.

use std::time::Duration;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::SpotPriceSource;
use crate::cache::Cache;
use crate::greeks::{strike_distance, synthetic_iv, SyntheticGreeks};
use crate::types::{OptionChain, OptionQuote, StrikeQuote};

/// Spot used when the upstream quote cannot be fetched
pub const DEFAULT_SPOT_PRICE: f64 = 100.0;

/// Shape of a generated strike ladder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Strikes generated on each side of the ATM strike
    pub strikes_per_side: usize,
    /// Distance between strikes as a fraction of spot
    pub strike_step_pct: f64,
    /// Strikes are rounded to a multiple of this
    pub strike_increment: f64,
    /// Open interest at the money, before jitter
    pub base_open_interest: i64,
    pub base_volume: i64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            strikes_per_side: 10,
            strike_step_pct: 0.025,
            strike_increment: 1.0,
            base_open_interest: 5_000,
            base_volume: 1_000,
        }
    }
}

/// A resolved underlying price and whether it is the fallback value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpotQuote {
    pub price: f64,
    pub fallback: bool,
}

/// Ask the upstream source for spot, degrading to [`DEFAULT_SPOT_PRICE`].
pub async fn resolve_spot(source: &dyn SpotPriceSource, symbol: &str) -> SpotQuote {
    match source.spot_price(symbol).await {
        Ok(price) if price.is_finite() && price > 0.0 => SpotQuote {
            price,
            fallback: false,
        },
        Ok(price) => {
            warn!(symbol, price, "Upstream returned unusable spot, using default");
            SpotQuote {
                price: DEFAULT_SPOT_PRICE,
                fallback: true,
            }
        }
        Err(e) => {
            warn!(symbol, error = %e, "Spot fetch failed, using default");
            SpotQuote {
                price: DEFAULT_SPOT_PRICE,
                fallback: true,
            }
        }
    }
}

/// [`resolve_spot`] behind a caller-owned cache. Fallback prices are never cached.
pub async fn resolve_spot_cached(
    source: &dyn SpotPriceSource,
    cache: &dyn Cache<String, f64>,
    ttl: Duration,
    symbol: &str,
) -> SpotQuote {
    if let Some(price) = cache.get(&symbol.to_string()) {
        debug!(symbol, price, "Spot cache hit");
        return SpotQuote {
            price,
            fallback: false,
        };
    }

    let quote = resolve_spot(source, symbol).await;
    if !quote.fallback {
        cache.put(symbol.to_string(), quote.price, ttl);
    }
    quote
}

/// FNV-1a over the symbol and expiration; stable across runs and toolchains.
fn chain_seed(symbol: &str, expiration: NaiveDate) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let key = format!("{symbol}:{expiration}");
    key.bytes()
        .fold(OFFSET, |hash, b| (hash ^ b as u64).wrapping_mul(PRIME))
}

fn round_to(value: f64, increment: f64) -> f64 {
    if increment > 0.0 {
        (value / increment).round() * increment
    } else {
        value
    }
}

fn build_ladder(spot: f64, config: &ChainConfig) -> Vec<f64> {
    let atm = round_to(spot, config.strike_increment);
    let step = round_to(spot * config.strike_step_pct, config.strike_increment)
        .max(config.strike_increment)
        .max(f64::EPSILON);
    let side = config.strikes_per_side as i64;

    let mut strikes: Vec<f64> = (-side..=side)
        .map(|k| atm + k as f64 * step)
        .filter(|s| *s > 0.0)
        .collect();
    strikes.dedup();
    strikes
}

fn synthetic_quote(rng: &mut StdRng, distance: f64, config: &ChainConfig) -> OptionQuote {
    let greeks = SyntheticGreeks::from_distance(distance);
    // Liquidity concentrates near the money
    let weight = 1.0 / (1.0 + distance * 20.0);
    let oi = config.base_open_interest as f64 * weight * rng.gen_range(0.5..1.5);
    let volume = config.base_volume as f64 * weight * rng.gen_range(0.5..1.5);

    OptionQuote {
        oi: oi.round() as i64,
        volume: volume.round() as i64,
        iv: synthetic_iv(distance),
        gamma: greeks.gamma,
        charm: greeks.charm,
        vanna: greeks.vanna,
        vomma: greeks.vomma,
    }
}

/// Build a deterministic synthetic chain around `spot`.
/// Unusable spot values are replaced with [`DEFAULT_SPOT_PRICE`].
pub fn generate_synthetic_chain(
    symbol: &str,
    expiration: NaiveDate,
    as_of_timestamp: i64,
    spot: f64,
    config: &ChainConfig,
) -> OptionChain {
    let spot = if spot.is_finite() && spot > 0.0 {
        spot
    } else {
        warn!(symbol, spot, "Unusable spot for synthetic chain, using default");
        DEFAULT_SPOT_PRICE
    };

    let mut rng = StdRng::seed_from_u64(chain_seed(symbol, expiration));
    let strikes = build_ladder(spot, config)
        .into_iter()
        .map(|strike| {
            let d = strike_distance(spot, strike);
            StrikeQuote {
                strike,
                call: synthetic_quote(&mut rng, d, config),
                put: synthetic_quote(&mut rng, d, config),
            }
        })
        .collect::<Vec<_>>();

    debug!(symbol, spot, strikes = strikes.len(), "Generated synthetic chain");

    OptionChain {
        symbol: symbol.to_string(),
        expiration,
        as_of_timestamp,
        spot,
        strikes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;
    use crate::error::{AnalyticsError, AnalyticsResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedSpot(f64, AtomicUsize);

    #[async_trait]
    impl SpotPriceSource for FixedSpot {
        async fn spot_price(&self, _symbol: &str) -> AnalyticsResult<f64> {
            self.1.fetch_add(1, Ordering::Relaxed);
            Ok(self.0)
        }
    }

    struct DownSource;

    #[async_trait]
    impl SpotPriceSource for DownSource {
        async fn spot_price(&self, symbol: &str) -> AnalyticsResult<f64> {
            Err(AnalyticsError::UpstreamUnavailable(format!("{symbol}: timeout")))
        }
    }

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 19).unwrap()
    }

    #[test]
    fn test_chain_is_deterministic() {
        let config = ChainConfig::default();
        let a = generate_synthetic_chain("SPY", expiry(), 1, 512.0, &config);
        let b = generate_synthetic_chain("SPY", expiry(), 1, 512.0, &config);
        assert_eq!(a, b);

        let other = generate_synthetic_chain("QQQ", expiry(), 1, 512.0, &config);
        assert_ne!(a.strikes, other.strikes);
    }

    #[test]
    fn test_chain_ladder_shape() {
        let config = ChainConfig::default();
        let chain = generate_synthetic_chain("SPY", expiry(), 1, 100.0, &config);
        assert_eq!(chain.strikes.len(), 21);
        assert!(chain.strikes.windows(2).all(|w| w[0].strike < w[1].strike));
        assert_eq!(chain.atm().map(|s| s.strike), Some(100.0));

        let atm = chain.atm().unwrap();
        assert_eq!(atm.call.gamma, 0.08);
        assert_eq!(atm.call.iv, 0.30);
        assert!(chain.strikes.iter().all(|s| s.call.oi > 0 && s.put.oi > 0));
    }

    #[test]
    fn test_chain_falls_back_on_bad_spot() {
        let chain = generate_synthetic_chain("SPY", expiry(), 1, f64::NAN, &ChainConfig::default());
        assert_eq!(chain.spot, DEFAULT_SPOT_PRICE);
        assert!(!chain.strikes.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_spot_fallback() {
        let quote = resolve_spot(&DownSource, "SPY").await;
        assert_eq!(
            quote,
            SpotQuote {
                price: DEFAULT_SPOT_PRICE,
                fallback: true
            }
        );

        let quote = resolve_spot(&FixedSpot(-1.0, AtomicUsize::new(0)), "SPY").await;
        assert!(quote.fallback);
    }

    #[tokio::test]
    async fn test_resolve_spot_cached_hits_cache() {
        let source = FixedSpot(512.0, AtomicUsize::new(0));
        let cache: TtlCache<String, f64> = TtlCache::new(8);
        let ttl = Duration::from_secs(60);

        let first = resolve_spot_cached(&source, &cache, ttl, "SPY").await;
        let second = resolve_spot_cached(&source, &cache, ttl, "SPY").await;
        assert_eq!(first.price, 512.0);
        assert_eq!(second.price, 512.0);
        assert_eq!(source.1.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_fallback_is_not_cached() {
        let cache: TtlCache<String, f64> = TtlCache::new(8);
        let quote = resolve_spot_cached(&DownSource, &cache, Duration::from_secs(60), "SPY").await;
        assert!(quote.fallback);
        assert_eq!(cache.get(&"SPY".to_string()), None);
    }
}
