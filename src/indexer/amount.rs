//! Arbitrary-precision token amounts
//!
//! Ledger amounts are 256-bit on chain and running totals are unbounded, so
//! every monetary field is a `BigInt`. The type is signed: a withdrawal
//! attributed to a phantom position can drive a balance below zero and the
//! arithmetic is never clamped.

use crate::error::{IndexerError, Result};
use num_bigint::BigInt;
use serde::{de, Deserializer, Serializer};
use std::fmt;
use std::str::FromStr;

pub type Amount = BigInt;

/// Parse a decimal amount string.
pub fn parse_amount(raw: &str) -> Result<Amount> {
    BigInt::from_str(raw.trim()).map_err(|_| IndexerError::InvalidAmount(raw.to_string()))
}

/// Serde adapter: decimal string out, decimal string or JSON integer in.
pub mod serde_amount {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Amount, D::Error> {
        deserializer.deserialize_any(AmountVisitor)
    }

    struct AmountVisitor;

    impl<'de> de::Visitor<'de> for AmountVisitor {
        type Value = Amount;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a decimal integer string or an integer")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Amount, E> {
            Ok(BigInt::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Amount, E> {
            Ok(BigInt::from(v))
        }

        fn visit_u128<E: de::Error>(self, v: u128) -> std::result::Result<Amount, E> {
            Ok(BigInt::from(v))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Amount, E> {
            BigInt::from_str(v.trim()).map_err(|_| E::custom(format!("invalid amount: {}", v)))
        }
    }
}
