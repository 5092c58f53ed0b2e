use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{EngineError, EngineResult};
use crate::pricing::{checked, PricingResult, Strategy, StrategyPrice};

pub fn compute_prices(unit_cost: Decimal, suggested_markup_pct: Decimal) -> EngineResult<PricingResult> {
    compute_prices_at(unit_cost, suggested_markup_pct, Utc::now())
}

/// All three strategies are derived from the same inputs and stamped with a
/// single `calculated_at`.
pub fn compute_prices_at(
    unit_cost: Decimal,
    suggested_markup_pct: Decimal,
    now: DateTime<Utc>,
) -> EngineResult<PricingResult> {
    if unit_cost < Decimal::ZERO {
        return Err(EngineError::invalid(format!(
            "unit cost must not be negative, got {unit_cost}"
        )));
    }
    if suggested_markup_pct < Decimal::ZERO {
        return Err(EngineError::invalid(format!(
            "suggested markup must not be negative, got {suggested_markup_pct}"
        )));
    }

    let price_for = |strategy: Strategy| -> EngineResult<StrategyPrice> {
        let markup = checked(
            suggested_markup_pct.checked_mul(strategy.multiplier()),
            "markup",
        )?;
        let factor = markup
            .checked_div(dec!(100))
            .and_then(|share| Decimal::ONE.checked_add(share));
        let unit_price = checked(
            factor.and_then(|factor| unit_cost.checked_mul(factor)),
            "unit price",
        )?;
        Ok(StrategyPrice {
            strategy,
            unit_price: unit_price.round_dp(2),
            margin_pct: markup.round_dp(2),
        })
    };

    Ok(PricingResult {
        unit_cost,
        suggested_markup_pct,
        competitive: price_for(Strategy::Competitive)?,
        moderate: price_for(Strategy::Moderate)?,
        conservative: price_for(Strategy::Conservative)?,
        calculated_at: now,
    })
}
