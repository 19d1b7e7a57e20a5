//! An arbitrary precision unsigned integer.
use std::fmt;

use num_bigint::BigUint;
use num_traits::{CheckedSub, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An arbitrary precision unsigned integer, marshalled as a minimal
/// big-endian byte string (the empty string encodes zero).
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity(BigUint);

impl Quantity {
    /// Add another quantity.
    pub fn add(&mut self, other: &Quantity) {
        self.0 += &other.0;
    }

    /// Subtract another quantity, returning `None` if the result would
    /// underflow.
    pub fn checked_sub(&self, other: &Quantity) -> Option<Quantity> {
        self.0.checked_sub(&other.0).map(Quantity)
    }

    /// Whether the quantity is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Minimal big-endian byte representation.
    pub fn to_bytes_be(&self) -> Vec<u8> {
        if self.0.is_zero() {
            return Vec::new();
        }
        self.0.to_bytes_be()
    }

    /// Decode a big-endian byte string.
    pub fn from_bytes_be(data: &[u8]) -> Quantity {
        Quantity(BigUint::from_bytes_be(data))
    }
}

impl From<u64> for Quantity {
    fn from(v: u64) -> Quantity {
        Quantity(BigUint::from(v))
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for Quantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes_be())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let b = serde_bytes::ByteBuf::deserialize(deserializer)?;
        Ok(Quantity::from_bytes_be(&b))
    }
}
