//! Chain parameters.
use serde::{Deserialize, Serialize};

use crate::common::quantity::Quantity;
use crate::common::time::RollupTime;

/// Protocol parameters fixed at rollup creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Stake required to take a position on the tree, in base units of
    /// the staking token.
    pub stake_requirement: Quantity,
    /// Grace period granted to stakers to respond to an assertion.
    pub grace_period: RollupTime,
    /// Maximum number of VM steps a single assertion may claim.
    pub max_execution_steps: u32,
}
