//! Cart line quantity.
//!
//! Quantities arrive from clients as arbitrary JSON integers. Parsing them into
//! [`Quantity`] is the single place the `1..=MAX` bound is enforced, so every
//! cart line and order line holds a quantity that already passed it.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when building a [`Quantity`].
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityError {
    /// Quantity below one.
    #[error("quantity must be at least 1")]
    TooSmall,
    /// Quantity above the per-line maximum.
    #[error("quantity cannot exceed {max} per item")]
    TooLarge {
        /// Maximum allowed quantity.
        max: u32,
    },
}

/// Number of units on a single cart or order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Quantity(u32);

impl Quantity {
    /// Smallest valid quantity.
    pub const MIN: u32 = 1;
    /// Largest quantity a single cart line may hold.
    pub const MAX: u32 = 99;

    /// Create a quantity.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError`] if `value` is outside `1..=99`.
    pub const fn new(value: u32) -> Result<Self, QuantityError> {
        if value < Self::MIN {
            Err(QuantityError::TooSmall)
        } else if value > Self::MAX {
            Err(QuantityError::TooLarge { max: Self::MAX })
        } else {
            Ok(Self(value))
        }
    }

    /// The number of units.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Combine two quantities for the same product.
    ///
    /// # Errors
    ///
    /// Returns [`QuantityError::TooLarge`] if the sum exceeds the maximum.
    pub fn checked_add(self, other: Self) -> Result<Self, QuantityError> {
        Self::new(self.0.saturating_add(other.0))
    }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < i64::from(Self::MIN) {
            return Err(QuantityError::TooSmall);
        }
        u32::try_from(value)
            .map_err(|_| QuantityError::TooLarge { max: Self::MAX })
            .and_then(Self::new)
    }
}

impl From<Quantity> for i32 {
    fn from(quantity: Quantity) -> Self {
        // MAX fits comfortably in i32.
        Self::try_from(quantity.0).unwrap_or(Self::MAX)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert_eq!(Quantity::try_from(0_i64), Err(QuantityError::TooSmall));
        assert_eq!(Quantity::try_from(-4_i64), Err(QuantityError::TooSmall));
        assert_eq!(Quantity::try_from(1_i64).map(Quantity::get), Ok(1));
        assert_eq!(Quantity::try_from(99_i64).map(Quantity::get), Ok(99));
        assert_eq!(
            Quantity::try_from(100_i64),
            Err(QuantityError::TooLarge { max: 99 })
        );
        assert_eq!(
            Quantity::try_from(i64::MAX),
            Err(QuantityError::TooLarge { max: 99 })
        );
    }

    #[test]
    fn test_checked_add() {
        let a = Quantity::new(40).expect("valid");
        let b = Quantity::new(59).expect("valid");
        assert_eq!(a.checked_add(b).map(Quantity::get), Ok(99));

        let c = Quantity::new(60).expect("valid");
        assert_eq!(a.checked_add(c), Err(QuantityError::TooLarge { max: 99 }));
    }

    #[test]
    fn test_deserialize_enforces_bounds() {
        assert!(serde_json::from_str::<Quantity>("3").is_ok());
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert!(serde_json::from_str::<Quantity>("1.5").is_err());
    }
}
