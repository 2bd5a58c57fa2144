//! Phone number type.
//!
//! Accounts are identified by a 10-digit national mobile number. No country
//! code, separators or spaces are accepted: the OTP flow keys challenges by
//! the exact string, so two spellings of one number must not exist.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PhoneNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneNumberError {
    /// The input is not exactly ten ASCII digits.
    #[error("phone number must be exactly {expected} digits")]
    InvalidFormat {
        /// Required number of digits.
        expected: usize,
    },
}

/// A 10-digit phone number.
///
/// ```
/// use tapntag_core::PhoneNumber;
///
/// assert!(PhoneNumber::parse("9999999999").is_ok());
/// assert!(PhoneNumber::parse("+919999999999").is_err());
/// assert!(PhoneNumber::parse("99999 99999").is_err());
/// ```
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Number of digits in a valid phone number.
    pub const DIGITS: usize = 10;

    /// Parse a phone number.
    ///
    /// # Errors
    ///
    /// Returns [`PhoneNumberError::InvalidFormat`] unless the input is exactly
    /// ten ASCII digits.
    pub fn parse(s: &str) -> Result<Self, PhoneNumberError> {
        if s.len() == Self::DIGITS && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_owned()))
        } else {
            Err(PhoneNumberError::InvalidFormat {
                expected: Self::DIGITS,
            })
        }
    }

    /// Returns the phone number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the number with all but the last four digits masked, for logs.
    #[must_use]
    pub fn masked(&self) -> String {
        let visible = self.0.get(Self::DIGITS - 4..).unwrap_or_default();
        format!("******{visible}")
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PhoneNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
