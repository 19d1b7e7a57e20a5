//! Keccak-256 hash primitives.
//!
//! All hashes are 32-byte Keccak-256 outputs over the tight packing of
//! their inputs, the way the EVM packs them. This MUST be kept in sync
//! with the on-chain rollup contract so that locally derived identifiers
//! match the contract bit for bit.
use tiny_keccak::{Hasher, Keccak};

/// Type code of a tuple with zero fields in the VM value encoding.
const EMPTY_TUPLE_TYPE_CODE: u8 = 3;

impl_bytes!(Hash, 32, "A Keccak-256 hash.");

impl Hash {
    /// Hash of the input data.
    pub fn digest_bytes(data: &[u8]) -> Hash {
        Hash::digest_packed(&[data])
    }

    /// Hash of the tight concatenation of the given fields, matching
    /// Solidity's `keccak256(abi.encodePacked(...))`.
    pub fn digest_packed(fields: &[&[u8]]) -> Hash {
        let mut keccak = Keccak::v256();
        for field in fields {
            keccak.update(field);
        }
        let mut out = [0u8; 32];
        keccak.finalize(&mut out);
        Hash(out)
    }

    /// Hash of the VM's empty tuple value.
    ///
    /// Used as the pending-top commitment of a chain that has not
    /// observed any messages.
    pub fn empty_tuple() -> Hash {
        Hash::digest_bytes(&[EMPTY_TUPLE_TYPE_CODE])
    }
}

/// Encode an unsigned integer as a 256-bit big-endian word.
pub fn uint256_be(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&value.to_be_bytes());
    out
}
