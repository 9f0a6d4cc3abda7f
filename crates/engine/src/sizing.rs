//! Option position sizing
//!
//! Starts from a fixed fraction of the account:
//! contracts = floor(account × risk% / 100 / premium)
//! then scales for implied volatility and the gamma-exposure regime.
//! Always sizes at least one contract.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnalyticsError, AnalyticsResult};

/// How to lean the size given the current gamma regime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GexAdjustment {
    Conservative,
    #[default]
    Neutral,
    Aggressive,
}

impl GexAdjustment {
    pub fn factor(&self) -> Decimal {
        match self {
            Self::Conservative => dec!(0.8),
            Self::Neutral => Decimal::ONE,
            Self::Aggressive => dec!(1.2),
        }
    }
}

/// IV thresholds (percent) and the multipliers applied beyond them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub high_iv: Decimal,
    pub high_iv_factor: Decimal,
    pub low_iv: Decimal,
    pub low_iv_factor: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            high_iv: dec!(60),
            high_iv_factor: dec!(0.8),
            low_iv: dec!(20),
            low_iv_factor: dec!(1.2),
        }
    }
}

impl SizingConfig {
    pub fn iv_factor(&self, iv: Option<Decimal>) -> Decimal {
        match iv {
            Some(iv) if iv > self.high_iv => self.high_iv_factor,
            Some(iv) if iv < self.low_iv => self.low_iv_factor,
            _ => Decimal::ONE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSizeRequest {
    pub account_size: Decimal,
    /// Percent of the account to put at risk (2 = 2%)
    pub risk_percentage: Decimal,
    pub option_premium: Decimal,
    /// Implied volatility in percent
    pub iv: Option<Decimal>,
    #[serde(default)]
    pub gex_adjustment: GexAdjustment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSizeResult {
    pub risk_dollars: Decimal,
    pub base_contracts: u64,
    pub iv_factor: Decimal,
    pub gex_factor: Decimal,
    pub contracts: u64,
    pub capital_required: Decimal,
}

fn validate(request: &PositionSizeRequest) -> AnalyticsResult<()> {
    if request.account_size <= Decimal::ZERO {
        return Err(AnalyticsError::invalid("accountSize", "must be greater than zero"));
    }
    if request.risk_percentage <= Decimal::ZERO || request.risk_percentage > dec!(100) {
        return Err(AnalyticsError::invalid("riskPercentage", "must be in (0, 100]"));
    }
    if request.option_premium <= Decimal::ZERO {
        return Err(AnalyticsError::invalid("optionPremium", "must be greater than zero"));
    }
    if matches!(request.iv, Some(iv) if iv < Decimal::ZERO) {
        return Err(AnalyticsError::invalid("iv", "must not be negative"));
    }
    Ok(())
}

fn whole_contracts(value: Decimal) -> AnalyticsResult<u64> {
    value
        .floor()
        .to_u64()
        .ok_or(AnalyticsError::DegenerateMath("contract count"))
}

pub fn size_position(
    request: &PositionSizeRequest,
    config: &SizingConfig,
) -> AnalyticsResult<PositionSizeResult> {
    validate(request)?;

    let risk_dollars = request.account_size * request.risk_percentage / dec!(100);
    let base = (risk_dollars / request.option_premium).floor();

    let iv_factor = config.iv_factor(request.iv);
    let gex_factor = request.gex_adjustment.factor();
    let contracts = whole_contracts(base * iv_factor * gex_factor)?.max(1);

    debug!(
        %risk_dollars,
        base = %base,
        %iv_factor,
        %gex_factor,
        contracts,
        "Sized position"
    );

    Ok(PositionSizeResult {
        risk_dollars,
        base_contracts: whole_contracts(base)?,
        iv_factor,
        gex_factor,
        contracts,
        capital_required: Decimal::from(contracts) * request.option_premium,
    })
}
