//! Protocol time.
use std::fmt;

use serde::{Deserialize, Serialize};

/// A protocol timestamp, expressed as an L1 block height.
///
/// Totally ordered and monotonic; the core never interprets it beyond
/// comparison.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RollupTime(pub u64);

impl From<u64> for RollupTime {
    fn from(height: u64) -> RollupTime {
        RollupTime(height)
    }
}

impl fmt::Display for RollupTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::cbor;

    #[test]
    fn test_ordering() {
        assert!(RollupTime::from(1) < RollupTime::from(2));
        assert_eq!(RollupTime::default(), RollupTime::from(0));
    }

    #[test]
    fn test_serde_roundtrip() {
        let t = RollupTime::from(1_560_257_841);
        let decoded: RollupTime = cbor::from_slice(&cbor::to_vec(&t)).unwrap();
        assert_eq!(decoded, t);
    }
}
