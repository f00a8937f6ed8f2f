//! Money and currency value objects.
//!
//! Amounts are fixed-point decimals with exactly two fractional digits;
//! construction rescales so `25` and `25.000` both persist and serialize as
//! `25.00`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A monetary amount with two fractional digits.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub fn new(amount: Decimal) -> Self {
        let mut scaled = amount;
        scaled.rescale(2);
        Self(scaled)
    }

    pub fn zero() -> Self {
        Self(Decimal::new(0, 2))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// ISO-style three-letter currency code. Validated, upper-cased, defaulting
/// to USD.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn parse(code: &str) -> DomainResult<Self> {
        let trimmed = code.trim();
        if trimmed.len() != 3 || !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::bad_request(format!(
                "currency must be a three-letter code, got {code:?}"
            )));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::usd()
    }
}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn money_rescales_to_two_digits() {
        assert_eq!(Money::new(dec!(25)).to_string(), "25.00");
        assert_eq!(Money::new(dec!(40.5)).to_string(), "40.50");
        assert_eq!(Money::new(dec!(12.345)).to_string(), "12.35");
    }

    #[test]
    fn money_positivity() {
        assert!(Money::new(dec!(0.01)).is_positive());
        assert!(!Money::zero().is_positive());
        assert!(!Money::new(dec!(-5)).is_positive());
    }

    #[test]
    fn currency_parses_and_uppercases() {
        assert_eq!(Currency::parse("usd").unwrap().as_str(), "USD");
        assert_eq!(Currency::parse(" EUR ").unwrap().as_str(), "EUR");
    }

    #[test]
    fn currency_rejects_bad_codes() {
        assert!(Currency::parse("").is_err());
        assert!(Currency::parse("US").is_err());
        assert!(Currency::parse("DOLLARS").is_err());
        assert!(Currency::parse("U$D").is_err());
    }

    #[test]
    fn currency_defaults_to_usd() {
        assert_eq!(Currency::default().as_str(), "USD");
    }
}
