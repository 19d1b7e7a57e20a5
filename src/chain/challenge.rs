//! Challenges between stakers.
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::common::bytes::Address;

/// Kind of dispute a challenge adjudicates.
///
/// The wire values MUST be kept in sync with the on-chain challenge
/// factory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ChallengeKind {
    /// The asserted pending-top commitment is disputed.
    InvalidPendingTop = 0,
    /// The asserted message sequence is disputed.
    InvalidMessages = 1,
    /// The asserted execution is disputed.
    InvalidExecution = 2,
}

impl ChallengeKind {
    /// Decode a wire integer.
    pub fn from_u8(value: u8) -> Option<ChallengeKind> {
        match value {
            0 => Some(ChallengeKind::InvalidPendingTop),
            1 => Some(ChallengeKind::InvalidMessages),
            2 => Some(ChallengeKind::InvalidExecution),
            _ => None,
        }
    }
}

/// An open dispute between two stakers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Address of the deployed challenge contract adjudicating the
    /// dispute; unique identifier of the challenge.
    pub contract: Address,
    /// Staker defending the assertion.
    pub asserter: Address,
    /// Staker disputing the assertion.
    pub challenger: Address,
    /// Dispute kind.
    pub kind: ChallengeKind,
}
