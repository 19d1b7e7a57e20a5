//! Pending inbox state.
use serde::{Deserialize, Serialize};

/// Opaque marshalled state of the pending inbox.
///
/// The inbox itself is owned and advanced by an external component; the
/// core only carries its latest marshalled form so that a checkpoint
/// can round-trip it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInbox(#[serde(with = "serde_bytes")] pub Vec<u8>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::cbor;

    #[test]
    fn test_serde_roundtrip() {
        let inbox = PendingInbox(vec![0xde, 0xad, 0xbe, 0xef]);
        let decoded: PendingInbox = cbor::from_slice(&cbor::to_vec(&inbox)).unwrap();
        assert_eq!(decoded, inbox);
    }
}
