//! Test helpers.
use crate::common::crypto::hash::Hash;

use super::machine::Machine;

/// Machine stub hashing to a fixed value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TestMachine(pub Hash);

impl TestMachine {
    /// A machine whose state hash is the byte repeated.
    pub fn with_byte(byte: u8) -> TestMachine {
        TestMachine(Hash([byte; 32]))
    }
}

impl Machine for TestMachine {
    fn hash(&self) -> Hash {
        self.0
    }
}
