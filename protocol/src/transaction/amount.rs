//! Arbitrary-precision token amounts.
//!
//! Amounts and fees travel as decimal strings so that no client ever rounds
//! them through a float. Inside the engine they become [`Amount`] (a
//! non-negative `BigUint`) and balances become signed `BigInt` so that
//! deltas and genesis debits can go below zero.
//!
//! The string shape is enforced at the boundary: digits only, no sign, no
//! `.` and no exponent.

use std::fmt;
use std::ops::Add;

use num_bigint::{BigInt, BigUint};
use num_traits::Zero;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Reasons an amount string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount {0:?} contains a fractional part")]
    Fractional(String),

    #[error("amount {0:?} uses exponent notation")]
    Exponent(String),

    #[error("amount {0:?} is negative")]
    Negative(String),

    #[error("amount {0:?} is not a decimal integer")]
    NotDecimal(String),
}

/// A non-negative integer amount in base units.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(BigUint);

impl Amount {
    /// Parse a decimal integer string, rejecting every shape the ledger
    /// refuses to store.
    pub fn parse(s: &str) -> Result<Self, AmountError> {
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        if s.contains('.') {
            return Err(AmountError::Fractional(s.to_string()));
        }
        if s.contains(['e', 'E']) {
            return Err(AmountError::Exponent(s.to_string()));
        }
        if s.starts_with('-') {
            return Err(AmountError::Negative(s.to_string()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountError::NotDecimal(s.to_string()));
        }
        BigUint::parse_bytes(s.as_bytes(), 10)
            .map(Self)
            .ok_or_else(|| AmountError::NotDecimal(s.to_string()))
    }

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    /// Whole tokens scaled to base units.
    pub fn from_units(units: u64, fixed_point: u64) -> Self {
        Self(BigUint::from(units) * BigUint::from(fixed_point))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The amount as a positive balance delta.
    pub fn credit(&self) -> BigInt {
        BigInt::from(self.0.clone())
    }

    /// The amount as a negative balance delta.
    pub fn debit(&self) -> BigInt {
        -BigInt::from(self.0.clone())
    }
}

impl From<u64> for Amount {
    fn from(v: u64) -> Self {
        Self(BigUint::from(v))
    }
}

impl Add for &Amount {
    type Output = Amount;

    fn add(self, rhs: &Amount) -> Amount {
        Amount(&self.0 + &rhs.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serde adapter storing a `BigInt` as its decimal string.
pub mod bigint_string {
    use super::*;

    pub fn serialize<S: Serializer>(value: &BigInt, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<BigInt, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse::<BigInt>().map_err(serde::de::Error::custom)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Amount::parse(&raw).map_err(serde::de::Error::custom)
    }
}
