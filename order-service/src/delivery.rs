use common_money::{Currency, Money, MoneyError};
use serde::Serialize;

pub const DEFAULT_METRO_PREFIXES: [&str; 6] = ["110", "400", "560", "600", "700", "500"];

/// Delivery pricing rules for one store currency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub free_threshold: Money,
    pub metro_fee: Money,
    pub standard_fee: Money,
    pub metro_prefixes: Vec<String>,
    pub new_account_days: i64,
    pub metro_days: u32,
    pub standard_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeBasis {
    NewAccount,
    FreeThreshold,
    Metro,
    Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryQuote {
    pub charge: Money,
    pub estimated_days: u32,
    pub metro: bool,
    pub basis: ChargeBasis,
}

/// A destination is serviceable when its postal code is exactly six ASCII digits.
pub fn serviceable(postal_code: &str) -> bool {
    let code = postal_code.trim();
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

impl DeliveryPolicy {
    /// Stock rules: free from 500, metro 40 in 3 days, elsewhere 60 in 5 days (major units).
    pub fn standard(currency: Currency) -> Result<Self, MoneyError> {
        Ok(Self {
            free_threshold: Money::from_major(500, currency)?,
            metro_fee: Money::from_major(40, currency)?,
            standard_fee: Money::from_major(60, currency)?,
            metro_prefixes: DEFAULT_METRO_PREFIXES.iter().map(|p| p.to_string()).collect(),
            new_account_days: 2,
            metro_days: 3,
            standard_days: 5,
        })
    }

    pub fn is_metro(&self, postal_code: &str) -> bool {
        let code = postal_code.trim();
        code.get(..3).is_some_and(|head| self.metro_prefixes.iter().any(|p| p == head))
    }

    pub fn quote(&self, subtotal: Money, postal_code: &str, account_age_days: i64) -> Result<DeliveryQuote, MoneyError> {
        let currency = self.free_threshold.currency();
        let metro = self.is_metro(postal_code);
        let estimated_days = if metro { self.metro_days } else { self.standard_days };
        // Also rejects a subtotal in a foreign currency.
        let above_threshold = !subtotal.checked_sub(self.free_threshold)?.is_negative();

        let (charge, basis) = if account_age_days <= self.new_account_days {
            (Money::zero(currency), ChargeBasis::NewAccount)
        } else if above_threshold {
            (Money::zero(currency), ChargeBasis::FreeThreshold)
        } else if metro {
            (self.metro_fee, ChargeBasis::Metro)
        } else {
            (self.standard_fee, ChargeBasis::Standard)
        };
        Ok(DeliveryQuote { charge, estimated_days, metro, basis })
    }

    pub fn charge(&self, subtotal: Money, postal_code: &str, account_age_days: i64) -> Result<Money, MoneyError> {
        Ok(self.quote(subtotal, postal_code, account_age_days)?.charge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inr(major: i64) -> Money { Money::from_major(major, Currency::Inr).unwrap() }

    fn policy() -> DeliveryPolicy { DeliveryPolicy::standard(Currency::Inr).unwrap() }

    #[test]
    fn new_accounts_ship_free() {
        let q = policy().quote(inr(100), "382001", 2).unwrap();
        assert!(q.charge.is_zero());
        assert_eq!(q.basis, ChargeBasis::NewAccount);
        assert!(!policy().charge(inr(100), "382001", 3).unwrap().is_zero());
    }

    #[test]
    fn threshold_is_inclusive() {
        assert!(policy().charge(inr(500), "382001", 30).unwrap().is_zero());
        assert_eq!(policy().charge(Money::new(49_999, Currency::Inr), "382001", 30).unwrap(), inr(60));
    }

    #[test]
    fn metro_prefix_is_cheaper_and_faster() {
        let q = policy().quote(inr(200), "110001", 30).unwrap();
        assert_eq!((q.charge, q.estimated_days, q.metro), (inr(40), 3, true));
        let q = policy().quote(inr(200), "382001", 30).unwrap();
        assert_eq!((q.charge, q.estimated_days, q.metro), (inr(60), 5, false));
    }

    #[test]
    fn free_delivery_keeps_the_route_estimate() {
        let q = policy().quote(inr(900), "560034", 30).unwrap();
        assert!(q.charge.is_zero());
        assert_eq!(q.estimated_days, 3);
    }

    #[test]
    fn foreign_subtotal_is_rejected() {
        let usd = Money::new(100, Currency::Usd);
        assert!(matches!(policy().quote(usd, "110001", 30), Err(MoneyError::CurrencyMismatch { .. })));
    }

    #[test]
    fn serviceability_needs_six_digits() {
        assert!(serviceable("110001"));
        assert!(serviceable(" 560034 "));
        assert!(!serviceable("11000"));
        assert!(!serviceable("1100011"));
        assert!(!serviceable("11000a"));
        assert!(!serviceable("११००01"));
    }
}
