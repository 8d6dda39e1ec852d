use bigdecimal::BigDecimal;
use bigdecimal::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Currencies the store can price in. The exponent is the number of minor-unit digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Inr,
    Usd,
    Eur,
    Jpy,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Inr => "INR",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Jpy => "JPY",
        }
    }

    pub fn exponent(&self) -> u32 {
        match self {
            Currency::Jpy => 0,
            Currency::Inr | Currency::Usd | Currency::Eur => 2,
        }
    }

    pub fn minor_per_major(&self) -> i64 { 10_i64.pow(self.exponent()) }
}

impl FromStr for Currency {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INR" => Ok(Currency::Inr),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "JPY" => Ok(Currency::Jpy),
            other => Err(MoneyError::UnsupportedCurrency(other.to_string())),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.code()) }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch { left: Currency, right: Currency },
    #[error("unsupported currency '{0}'")]
    UnsupportedCurrency(String),
    #[error("monetary amount overflow")]
    Overflow,
    #[error("invalid decimal amount '{0}'")]
    InvalidDecimal(String),
}

/// An exact amount in integer minor units (paise, cents). Arithmetic never leaves integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    minor: i64,
    currency: Currency,
}

impl Money {
    pub const fn new(minor: i64, currency: Currency) -> Self { Self { minor, currency } }

    pub const fn zero(currency: Currency) -> Self { Self { minor: 0, currency } }

    /// Whole major units (rupees, dollars) into minor units.
    pub fn from_major(major: i64, currency: Currency) -> Result<Self, MoneyError> {
        let minor = major.checked_mul(currency.minor_per_major()).ok_or(MoneyError::Overflow)?;
        Ok(Self { minor, currency })
    }

    /// Parse a decimal such as `"40.50"`; digits beyond the currency exponent are truncated.
    pub fn parse_decimal(raw: &str, currency: Currency) -> Result<Self, MoneyError> {
        let value = BigDecimal::from_str(raw.trim()).map_err(|_| MoneyError::InvalidDecimal(raw.to_string()))?;
        Self::from_decimal(&value, currency)
    }

    pub fn from_decimal(value: &BigDecimal, currency: Currency) -> Result<Self, MoneyError> {
        let scaled = (value.clone() * BigDecimal::from(currency.minor_per_major())).with_scale(0);
        let minor = scaled.to_i64().ok_or(MoneyError::Overflow)?;
        Ok(Self { minor, currency })
    }

    pub fn minor(&self) -> i64 { self.minor }

    pub fn currency(&self) -> Currency { self.currency }

    pub fn is_zero(&self) -> bool { self.minor == 0 }

    pub fn is_negative(&self) -> bool { self.minor < 0 }

    fn same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch { left: self.currency, right: other.currency });
        }
        Ok(())
    }

    pub fn checked_add(self, other: Money) -> Result<Money, MoneyError> {
        self.same_currency(&other)?;
        let minor = self.minor.checked_add(other.minor).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor, self.currency))
    }

    pub fn checked_sub(self, other: Money) -> Result<Money, MoneyError> {
        self.same_currency(&other)?;
        let minor = self.minor.checked_sub(other.minor).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor, self.currency))
    }

    pub fn times(self, quantity: u32) -> Result<Money, MoneyError> {
        let minor = self.minor.checked_mul(i64::from(quantity)).ok_or(MoneyError::Overflow)?;
        Ok(Money::new(minor, self.currency))
    }

    /// `floor(self * percent / 100)` in minor units.
    pub fn percent_floor(self, percent: u32) -> Result<Money, MoneyError> {
        let product = i128::from(self.minor) * i128::from(percent);
        let minor = i64::try_from(product.div_euclid(100)).map_err(|_| MoneyError::Overflow)?;
        Ok(Money::new(minor, self.currency))
    }

    /// `floor(self * numerator / denominator)`; used for tax-inclusive splits.
    pub fn ratio_floor(self, numerator: u32, denominator: u32) -> Result<Money, MoneyError> {
        if denominator == 0 {
            return Err(MoneyError::Overflow);
        }
        let product = i128::from(self.minor) * i128::from(numerator);
        let minor = i64::try_from(product.div_euclid(i128::from(denominator))).map_err(|_| MoneyError::Overflow)?;
        Ok(Money::new(minor, self.currency))
    }

    pub fn min(self, other: Money) -> Result<Money, MoneyError> {
        self.same_currency(&other)?;
        Ok(if other.minor < self.minor { other } else { self })
    }

    pub fn max(self, other: Money) -> Result<Money, MoneyError> {
        self.same_currency(&other)?;
        Ok(if other.minor > self.minor { other } else { self })
    }

    pub fn clamp_non_negative(self) -> Money {
        if self.minor < 0 { Money::zero(self.currency) } else { self }
    }

    /// Sum of amounts that must all be in `currency`; an empty iterator yields zero.
    pub fn sum<I>(currency: Currency, amounts: I) -> Result<Money, MoneyError>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts.into_iter().try_fold(Money::zero(currency), Money::checked_add)
    }

    /// Major-unit decimal with exactly `exponent` fraction digits, for display only.
    pub fn to_decimal(&self) -> BigDecimal {
        let raw = BigDecimal::from(self.minor) / BigDecimal::from(self.currency.minor_per_major());
        normalize_scale(&raw, self.currency)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.currency, self.to_decimal())
    }
}

/// Fix a decimal to the currency's exponent (BigDecimal truncates when reducing scale).
pub fn normalize_scale(value: &BigDecimal, currency: Currency) -> BigDecimal {
    value.with_scale(i64::from(currency.exponent()))
}
