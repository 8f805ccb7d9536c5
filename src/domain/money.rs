//! Lossless MXN money type backed by rust_decimal.
//!
//! Amounts are carried as decimals end to end; conversion to the gateway's
//! integer minor units (centavos) happens only at the gateway boundary.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal as RustDecimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("amount out of range")]
    Overflow,
}

/// A decimal amount of Mexican pesos.
///
/// Serializes to its canonical string so metadata round-trips through the
/// gateway without float drift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(RustDecimal);

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        rust_decimal::serde::str::deserialize(deserializer).map(Money)
    }
}

impl Money {
    pub fn new(value: RustDecimal) -> Self {
        Money(value)
    }

    /// Whole pesos.
    pub fn from_pesos(pesos: i64) -> Self {
        Money(RustDecimal::from(pesos))
    }

    /// `num * 10^-scale` pesos, e.g. `from_scaled(80, 2)` is 0.80.
    pub fn from_scaled(num: i64, scale: u32) -> Self {
        Money(RustDecimal::new(num, scale))
    }

    /// Parse a Money from a string losslessly.
    pub fn from_str_canonical(s: &str) -> Result<Self, rust_decimal::Error> {
        RustDecimal::from_str(s.trim()).map(Money)
    }

    /// Canonical string form (no exponent, no trailing zeros).
    pub fn to_canonical_string(&self) -> String {
        format!("{}", self.0.normalize())
    }

    pub fn inner(&self) -> RustDecimal {
        self.0
    }

    pub fn zero() -> Self {
        Money(RustDecimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Digits after the decimal point, ignoring trailing zeros.
    pub fn decimal_places(&self) -> u32 {
        self.0.normalize().scale()
    }

    /// Multiply by a count of units (tickets, months, tens of tickets).
    pub fn times(&self, count: u64) -> Result<Self, MoneyError> {
        self.0
            .checked_mul(RustDecimal::from(count))
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    pub fn checked_add(&self, rhs: Money) -> Result<Self, MoneyError> {
        self.0
            .checked_add(rhs.0)
            .map(Money)
            .ok_or(MoneyError::Overflow)
    }

    /// Amount in centavos, rounded half away from zero.
    ///
    /// Returns None when the amount does not fit in an i64.
    pub fn to_minor_units(&self) -> Option<i64> {
        self.0
            .checked_mul(RustDecimal::ONE_HUNDRED)?
            .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }

    pub fn from_minor_units(centavos: i64) -> Self {
        Money(RustDecimal::new(centavos, 2))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for Money {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_canonical(s)
    }
}

impl From<RustDecimal> for Money {
    fn from(value: RustDecimal) -> Self {
        Money(value)
    }
}



#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_string_drops_trailing_zeros() {
        let m = Money::from_str_canonical("370.00").unwrap();
        assert_eq!(m.to_canonical_string(), "370");
        assert_eq!(Money::from_scaled(80, 2).to_string(), "0.8");
    }

    #[test]
    fn test_times() {
        let price = Money::from_pesos(50);
        assert_eq!(price.times(2), Ok(Money::from_pesos(100)));
        assert!(price.times(0).unwrap().is_zero());
    }

    #[test]
    fn test_overflow_is_an_error() {
        let huge = Money::new(RustDecimal::MAX);
        assert_eq!(huge.times(2), Err(MoneyError::Overflow));
        assert_eq!(huge.checked_add(Money::from_pesos(1)), Err(MoneyError::Overflow));
        assert_eq!(huge.to_minor_units(), None);
        assert_eq!(Money::from_pesos(1_000_000).times(3), Ok(Money::from_pesos(3_000_000)));
    }

    #[test]
    fn test_decimal_places() {
        assert_eq!(Money::from_str_canonical("10.50").unwrap().decimal_places(), 1);
        assert_eq!(Money::from_str_canonical("10.005").unwrap().decimal_places(), 3);
        assert_eq!(Money::from_pesos(50).decimal_places(), 0);
    }

    #[test]
    fn test_minor_units() {
        assert_eq!(Money::from_pesos(370).to_minor_units(), Some(37_000));
        assert_eq!(
            Money::from_str_canonical("10000.01").unwrap().to_minor_units(),
            Some(1_000_001)
        );
        assert_eq!(
            Money::from_str_canonical("0.005").unwrap().to_minor_units(),
            Some(1)
        );
        assert_eq!(Money::from_minor_units(2_880), Money::from_str_canonical("28.8").unwrap());
    }

    #[test]
    fn test_json_is_string() {
        let m = Money::from_str_canonical("28.80").unwrap();
        let json = serde_json::to_value(m).unwrap();
        assert_eq!(json, serde_json::json!("28.8"));
        let back: Money = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_is_positive() {
        assert!(Money::from_pesos(1).is_positive());
        assert!(!Money::zero().is_positive());
        assert!(!Money::from_pesos(-1).is_positive());
    }
}
