use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use lumberyard_core::{DomainError, DomainResult, Entity, ServiceOrderId, ShavingsRecordId};

use crate::{LumberingServiceOrder, ShavingsOwnership};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShavingsUnit {
    #[default]
    Kg,
    Tons,
    CubicMeters,
    Bags,
}

impl ShavingsUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            ShavingsUnit::Kg => "kg",
            ShavingsUnit::Tons => "tons",
            ShavingsUnit::CubicMeters => "cubic_meters",
            ShavingsUnit::Bags => "bags",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "kg" => Some(ShavingsUnit::Kg),
            "tons" => Some(ShavingsUnit::Tons),
            "cubic_meters" => Some(ShavingsUnit::CubicMeters),
            "bags" => Some(ShavingsUnit::Bags),
            _ => None,
        }
    }
}

/// Shavings (palaras) produced by a service order and how they are split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShavingsRecord {
    pub id: ShavingsRecordId,
    pub service_order_id: ServiceOrderId,
    pub quantity: Decimal,
    pub unit: ShavingsUnit,
    /// Percent, 0-100. Always sums to 100 with `company_share`.
    pub customer_share: Decimal,
    pub company_share: Decimal,
    pub notes: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShavings {
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: ShavingsUnit,
    #[serde(default)]
    pub customer_share: Decimal,
    #[serde(default)]
    pub company_share: Decimal,
    #[serde(default)]
    pub notes: String,
}

/// Shares as given if they are each within 0-100 and sum to 100, otherwise
/// the split implied by `ownership`.
pub fn resolve_shares(
    customer_share: Decimal,
    company_share: Decimal,
    ownership: ShavingsOwnership,
) -> (Decimal, Decimal) {
    let in_range = |v: Decimal| v >= Decimal::ZERO && v <= dec!(100);
    if in_range(customer_share) && in_range(company_share) && customer_share + company_share == dec!(100) {
        return (customer_share, company_share);
    }

    match ownership {
        ShavingsOwnership::Customer => (dec!(100), dec!(0)),
        ShavingsOwnership::LumberCompany => (dec!(0), dec!(100)),
        ShavingsOwnership::Shared => (dec!(50), dec!(50)),
    }
}

impl ShavingsRecord {
    pub fn record(order: &LumberingServiceOrder, input: NewShavings, now: DateTime<Utc>) -> DomainResult<Self> {
        if input.quantity <= Decimal::ZERO {
            return Err(DomainError::invalid_quantity("shavings quantity must be positive"));
        }

        let (customer_share, company_share) =
            resolve_shares(input.customer_share, input.company_share, order.shavings_ownership);

        Ok(Self {
            id: ShavingsRecordId::new(),
            service_order_id: order.id,
            quantity: input.quantity,
            unit: input.unit,
            customer_share,
            company_share,
            notes: input.notes,
            recorded_at: now,
        })
    }
}

impl Entity for ShavingsRecord {
    type Id = ShavingsRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_split_is_kept() {
        assert_eq!(
            resolve_shares(dec!(30), dec!(70), ShavingsOwnership::Customer),
            (dec!(30), dec!(70))
        );
    }

    #[test]
    fn invalid_split_falls_back_to_ownership() {
        assert_eq!(
            resolve_shares(dec!(0), dec!(0), ShavingsOwnership::Customer),
            (dec!(100), dec!(0))
        );
        assert_eq!(
            resolve_shares(dec!(10), dec!(10), ShavingsOwnership::LumberCompany),
            (dec!(0), dec!(100))
        );
        assert_eq!(
            resolve_shares(dec!(150), dec!(-50), ShavingsOwnership::Shared),
            (dec!(50), dec!(50))
        );
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn ownership() -> impl Strategy<Value = ShavingsOwnership> {
            prop_oneof![
                Just(ShavingsOwnership::Customer),
                Just(ShavingsOwnership::LumberCompany),
                Just(ShavingsOwnership::Shared),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 1000,
                ..ProptestConfig::default()
            })]

            /// Property: resolved shares always sum to 100 and stay in range.
            #[test]
            fn shares_always_sum_to_hundred(
                customer in -20_000i64..20_000,
                company in -20_000i64..20_000,
                ownership in ownership(),
            ) {
                let (c, k) = resolve_shares(Decimal::new(customer, 2), Decimal::new(company, 2), ownership);
                prop_assert_eq!(c + k, dec!(100));
                prop_assert!(c >= Decimal::ZERO && k >= Decimal::ZERO);
            }
        }
    }
}
