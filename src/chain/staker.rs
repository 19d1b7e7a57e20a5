//! Stakers and the staker set.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::bytes::Address;
use crate::common::crypto::hash::Hash;
use crate::common::time::RollupTime;

/// An on-chain actor bonded to a position on the rollup tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Staker {
    /// Staking account address; unique identifier of the staker.
    pub address: Address,
    /// Hash of the node the stake currently sits on.
    pub location: Hash,
    /// Time the stake was placed.
    pub creation_time: RollupTime,
    /// Contract address of the challenge the staker is currently bound
    /// to, if any.
    pub challenge: Option<Address>,
}

/// Uniqueness-enforcing set of stakers keyed by address.
#[derive(Clone, Debug, Default)]
pub struct StakerSet(BTreeMap<Address, Staker>);

impl StakerSet {
    /// Add a staker. Adding an address that is already staked is a
    /// fatal error.
    pub(crate) fn add(&mut self, staker: Staker) {
        let address = staker.address;
        if self.0.insert(address, staker).is_some() {
            panic!("staker {} already exists", address);
        }
    }

    /// Look up a staker by address.
    pub fn get(&self, address: &Address) -> Option<&Staker> {
        self.0.get(address)
    }

    pub(crate) fn get_mut(&mut self, address: &Address) -> Option<&mut Staker> {
        self.0.get_mut(address)
    }

    /// Remove a staker; absent addresses are ignored.
    pub(crate) fn delete(&mut self, address: &Address) {
        self.0.remove(address);
    }

    /// Iterate over stakers. The order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = &Staker> {
        self.0.values()
    }

    /// Number of stakers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staker(byte: u8) -> Staker {
        Staker {
            address: Address([byte; 20]),
            location: Hash([byte; 32]),
            creation_time: RollupTime::from(byte as u64),
            challenge: None,
        }
    }

    #[test]
    fn test_add_get_delete() {
        let mut set = StakerSet::default();
        set.add(staker(1));
        set.add(staker(2));
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(&Address([1; 20])), Some(&staker(1)));
        assert_eq!(set.get(&Address([3; 20])), None);

        // Deleting an absent address is a no-op.
        set.delete(&Address([3; 20]));
        set.delete(&Address([1; 20]));
        assert_eq!(set.get(&Address([1; 20])), None);
        assert_eq!(set.len(), 1);
    }

    #[test]
    #[should_panic(expected = "already exists")]
    fn test_duplicate_add_is_fatal() {
        let mut set = StakerSet::default();
        set.add(staker(1));
        set.add(staker(1));
    }
}
