pub mod aggregate;
pub mod strategy;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::pricing::aggregate::{aggregate_cost, total_cost};
use crate::pricing::strategy::compute_prices_at;

pub const DEFAULT_MARKUP_PCT: Decimal = dec!(20);

/// One itemized cost. Absolute entries win when both shapes are present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CostComponent {
    Absolute {
        value: Decimal,
        #[serde(default)]
        unit: String,
    },
    Percentage {
        percentage: Decimal,
        #[serde(default)]
        base: Option<Decimal>,
    },
}

impl CostComponent {
    pub fn absolute(value: Decimal, unit: &str) -> Self {
        Self::Absolute {
            value,
            unit: unit.to_string(),
        }
    }

    pub fn percentage(percentage: Decimal, base: Option<Decimal>) -> Self {
        Self::Percentage { percentage, base }
    }

    pub fn contribution(&self) -> EngineResult<Decimal> {
        match self {
            Self::Absolute { value, .. } => Ok(*value),
            Self::Percentage {
                percentage,
                base: Some(base),
            } => checked(
                percentage
                    .checked_div(dec!(100))
                    .and_then(|share| base.checked_mul(share)),
                "percentage contribution",
            ),
            Self::Percentage { base: None, .. } => Ok(Decimal::ZERO),
        }
    }

    pub fn validate(&self, name: &str) -> EngineResult<()> {
        let (label, amount) = match self {
            Self::Absolute { value, .. } => ("value", *value),
            Self::Percentage { percentage, base } => {
                if let Some(base) = base.filter(|b| *b < Decimal::ZERO) {
                    return Err(EngineError::invalid(format!(
                        "cost component {name} has negative base {base}"
                    )));
                }
                ("percentage", *percentage)
            }
        };
        if amount < Decimal::ZERO {
            return Err(EngineError::invalid(format!(
                "cost component {name} has negative {label} {amount}"
            )));
        }
        Ok(())
    }
}

pub type CostComponents = BTreeMap<String, CostComponent>;

/// Maps a `checked_*` result to `InvalidInput` when the amount leaves the
/// representable range.
pub(crate) fn checked(value: Option<Decimal>, what: &str) -> EngineResult<Decimal> {
    value.ok_or_else(|| EngineError::invalid(format!("{what} overflows")))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Competitive,
    Moderate,
    Conservative,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [
        Strategy::Competitive,
        Strategy::Moderate,
        Strategy::Conservative,
    ];

    /// Share of the suggested markup applied by this strategy.
    pub fn multiplier(self) -> Decimal {
        match self {
            Self::Competitive => dec!(0.7),
            Self::Moderate => dec!(1.0),
            Self::Conservative => dec!(1.3),
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let display = match self {
            Self::Competitive => "Competitive",
            Self::Moderate => "Moderate",
            Self::Conservative => "Conservative",
        };
        write!(f, "{display}")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StrategyPrice {
    pub strategy: Strategy,
    pub unit_price: Decimal,
    /// Markup on cost, in percent. Not margin on revenue.
    pub margin_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingResult {
    pub unit_cost: Decimal,
    pub suggested_markup_pct: Decimal,
    pub competitive: StrategyPrice,
    pub moderate: StrategyPrice,
    pub conservative: StrategyPrice,
    pub calculated_at: DateTime<Utc>,
}

impl PricingResult {
    pub fn get(&self, strategy: Strategy) -> &StrategyPrice {
        match strategy {
            Strategy::Competitive => &self.competitive,
            Strategy::Moderate => &self.moderate,
            Strategy::Conservative => &self.conservative,
        }
    }

    pub fn prices(&self) -> [&StrategyPrice; 3] {
        [&self.competitive, &self.moderate, &self.conservative]
    }
}

/// A bid line item with its cost breakdown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProposalItem {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    pub quantity: Decimal,
    #[serde(default)]
    pub components: CostComponents,
    #[serde(default)]
    pub suggested_markup_pct: Option<Decimal>,
}

impl ProposalItem {
    pub fn new(description: &str, unit: &str, quantity: Decimal) -> Self {
        Self {
            description: description.to_string(),
            unit: unit.to_string(),
            quantity,
            components: CostComponents::new(),
            suggested_markup_pct: None,
        }
    }

    pub fn with_component(mut self, name: &str, component: CostComponent) -> Self {
        self.components.insert(name.to_string(), component);
        self
    }

    pub fn with_markup(mut self, markup_pct: Decimal) -> Self {
        self.suggested_markup_pct = Some(markup_pct);
        self
    }

    pub fn unit_cost(&self) -> EngineResult<Decimal> {
        aggregate_cost(&self.components)
    }

    pub fn total_cost(&self) -> EngineResult<Decimal> {
        total_cost(&self.components, self.quantity)
    }

    pub fn price_at(&self, default_markup_pct: Decimal, now: DateTime<Utc>) -> EngineResult<PricedItem> {
        let markup = self.suggested_markup_pct.unwrap_or(default_markup_pct);
        let unit_cost = self.unit_cost()?;
        let total_cost = self.total_cost()?;
        let pricing = compute_prices_at(unit_cost, markup, now)?;
        let priced = PricedItem {
            description: self.description.clone(),
            unit: self.unit.clone(),
            quantity: self.quantity,
            total_cost,
            pricing,
        };
        for strategy in Strategy::ALL {
            priced.total_price(strategy)?;
        }
        Ok(priced)
    }

    pub fn price(&self, default_markup_pct: Decimal) -> EngineResult<PricedItem> {
        self.price_at(default_markup_pct, Utc::now())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricedItem {
    pub description: String,
    pub unit: String,
    pub quantity: Decimal,
    pub total_cost: Decimal,
    pub pricing: PricingResult,
}

impl PricedItem {
    pub fn total_price(&self, strategy: Strategy) -> EngineResult<Decimal> {
        let unit_price = self.pricing.get(strategy).unit_price;
        checked(unit_price.checked_mul(self.quantity), "total price").map(|v| v.round_dp(2))
    }
}
