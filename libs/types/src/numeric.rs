//! Fixed-point decimal newtypes for prices and quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point
//! errors). `Price` is strictly positive by construction; `Quantity` is
//! non-negative. Upstream JSON may carry numbers as strings, so both
//! types also parse from string form.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;
use thiserror::Error;

/// Construction failures for the numeric newtypes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("quantity must not be negative, got {0}")]
    NegativeQuantity(Decimal),

    #[error("not a valid decimal: {0}")]
    Parse(String),
}

/// A strictly positive limit or execution price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Create a price, rejecting zero and negative values.
    pub fn try_new(value: Decimal) -> Result<Self, NumericError> {
        if value <= Decimal::ZERO {
            return Err(NumericError::NonPositivePrice(value));
        }
        Ok(Self(value))
    }

    /// Create a price from a non-zero integer.
    ///
    /// # Panics
    /// Panics if `value` is zero.
    pub fn from_u64(value: u64) -> Self {
        assert!(value > 0, "price must be positive");
        Self(Decimal::from(value))
    }

    /// Get the inner decimal.
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl FromStr for Price {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s).map_err(|_| NumericError::Parse(s.to_string()))?;
        Self::try_new(value)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative order or trade quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Create a quantity, rejecting negative values.
    pub fn try_new(value: Decimal) -> Result<Self, NumericError> {
        if value < Decimal::ZERO {
            return Err(NumericError::NegativeQuantity(value));
        }
        Ok(Self(value))
    }

    /// The zero quantity.
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Subtract, flooring at zero rather than going negative.
    pub fn saturating_sub(&self, other: Quantity) -> Quantity {
        if other.0 >= self.0 {
            Quantity::zero()
        } else {
            Quantity(self.0 - other.0)
        }
    }

    /// The smaller of two quantities.
    pub fn min(self, other: Quantity) -> Quantity {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, other: Quantity) -> Quantity {
        Quantity(self.0 + other.0)
    }
}

impl FromStr for Quantity {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s).map_err(|_| NumericError::Parse(s.to_string()))?;
        Self::try_new(value)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_rejects_zero_and_negative() {
        assert!(Price::try_new(Decimal::ZERO).is_err());
        assert!(Price::try_new(Decimal::from(-5)).is_err());
        assert!(Price::try_new(Decimal::from(5)).is_ok());
    }

    #[test]
    fn test_price_from_str() {
        let price: Price = "105.5".parse().unwrap();
        assert_eq!(price.as_decimal(), Decimal::new(1055, 1));
        assert!("0".parse::<Price>().is_err());
        assert!("abc".parse::<Price>().is_err());
    }

    #[test]
    fn test_price_ordering() {
        let low = Price::from_u64(100);
        let high = Price::from_u64(105);
        assert!(low < high);
    }

    #[test]
    fn test_quantity_rejects_negative() {
        assert!(Quantity::try_new(Decimal::from(-1)).is_err());
        assert!(Quantity::try_new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_quantity_saturating_sub() {
        let ten = Quantity::from_u64(10);
        let six = Quantity::from_u64(6);
        assert_eq!(ten.saturating_sub(six), Quantity::from_u64(4));
        assert_eq!(six.saturating_sub(ten), Quantity::zero());
    }

    #[test]
    fn test_quantity_min_and_add() {
        let a = Quantity::from_u64(10);
        let b = Quantity::from_u64(6);
        assert_eq!(a.min(b), b);
        assert_eq!((a + b).as_decimal(), Decimal::from(16));
    }

    #[test]
    fn test_price_serialization_roundtrip() {
        let price: Price = "99.95".parse().unwrap();
        let json = serde_json::to_string(&price).unwrap();
        let back: Price = serde_json::from_str(&json).unwrap();
        assert_eq!(price, back);
    }

    proptest::proptest! {
        #[test]
        fn quantity_saturating_sub_never_negative(a in 0u64..1_000_000, b in 0u64..1_000_000) {
            let result = Quantity::from_u64(a).saturating_sub(Quantity::from_u64(b));
            proptest::prop_assert!(result.as_decimal() >= Decimal::ZERO);
            proptest::prop_assert_eq!(result.as_decimal(), Decimal::from(a.saturating_sub(b)));
        }

        #[test]
        fn price_display_parse_roundtrip(value in 1u64..1_000_000) {
            let price = Price::from_u64(value);
            let back: Price = price.to_string().parse().unwrap();
            proptest::prop_assert_eq!(price, back);
        }
    }
}
