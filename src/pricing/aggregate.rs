use rust_decimal::Decimal;

use crate::error::{EngineError, EngineResult};
use crate::pricing::{checked, CostComponents};

/// Unit cost of a line item: absolute values plus self-contained percentage
/// entries, floored at zero. Every entry is validated before anything is summed.
pub fn aggregate_cost(components: &CostComponents) -> EngineResult<Decimal> {
    for (name, component) in components {
        component.validate(name)?;
    }
    let mut total = Decimal::ZERO;
    for component in components.values() {
        total = checked(total.checked_add(component.contribution()?), "unit cost")?;
    }
    Ok(total.max(Decimal::ZERO))
}

pub fn total_cost(components: &CostComponents, quantity: Decimal) -> EngineResult<Decimal> {
    if quantity <= Decimal::ZERO {
        return Err(EngineError::invalid(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    checked(aggregate_cost(components)?.checked_mul(quantity), "total cost")
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::error::EngineError;
    use crate::pricing::aggregate::{aggregate_cost, total_cost};
    use crate::pricing::{CostComponent, CostComponents};

    fn components(entries: &[(&str, CostComponent)]) -> CostComponents {
        entries
            .iter()
            .map(|(name, c)| (name.to_string(), c.clone()))
            .collect()
    }

    #[test]
    fn empty_mapping_costs_nothing() {
        assert_eq!(aggregate_cost(&CostComponents::new()).unwrap(), dec!(0));
    }

    #[test]
    fn absolute_entries_sum_exactly() {
        let set = components(&[
            ("labor", CostComponent::absolute(dec!(10.50), "hour")),
            ("material", CostComponent::absolute(dec!(25.00), "un")),
            ("logistics", CostComponent::absolute(dec!(5.00), "un")),
        ]);
        assert_eq!(aggregate_cost(&set).unwrap(), dec!(40.50));
    }

    #[test]
    fn percentage_entries_use_their_own_base() {
        let set = components(&[
            ("material", CostComponent::absolute(dec!(100), "un")),
            ("overhead", CostComponent::percentage(dec!(10), Some(dec!(100)))),
            ("tax", CostComponent::percentage(dec!(15), None)),
        ]);
        assert_eq!(aggregate_cost(&set).unwrap(), dec!(110));
    }

    #[test]
    fn negative_entry_rejects_whole_mapping() {
        let set = components(&[
            ("material", CostComponent::absolute(dec!(100), "un")),
            ("discount", CostComponent::absolute(dec!(-30), "un")),
        ]);
        assert!(matches!(
            aggregate_cost(&set),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn total_cost_requires_positive_quantity() {
        let set = components(&[("material", CostComponent::absolute(dec!(12.5), "un"))]);
        assert_eq!(total_cost(&set, dec!(4)).unwrap(), dec!(50));
        assert!(total_cost(&set, dec!(0)).is_err());
        assert!(total_cost(&set, dec!(-1)).is_err());
    }

    #[test]
    fn sums_past_decimal_range_are_invalid_input() {
        let set = components(&[
            ("hull", CostComponent::absolute(dec!(50000000000000000000000000000), "un")),
            ("rigging", CostComponent::absolute(dec!(50000000000000000000000000000), "un")),
        ]);
        assert!(matches!(
            aggregate_cost(&set),
            Err(EngineError::InvalidInput(_))
        ));

        let single = components(&[("hull", CostComponent::absolute(Decimal::MAX, "un"))]);
        assert_eq!(aggregate_cost(&single).unwrap(), Decimal::MAX);
        assert!(matches!(
            total_cost(&single, dec!(2)),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
