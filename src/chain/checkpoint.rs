//! Whole-chain checkpoints.
//!
//! A checkpoint flattens the node tree into records that reference each
//! other by hash. Restoring rebuilds the graph in two passes: nodes are
//! materialized and indexed first, then successor slots are wired
//! through the recorded parent hashes. A chain is only published if
//! every reference resolves and every node hash recomputes to its
//! recorded value.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::bytes::Address;
use crate::common::cbor;
use crate::common::crypto::hash::Hash;
use crate::common::logger::get_logger;
use crate::common::time::RollupTime;

use super::challenge::Challenge;
use super::inbox::PendingInbox;
use super::machine::Machine;
use super::node::{ChildType, DisputableNode, LeafSet, Node};
use super::params::ChainParams;
use super::staker::{Staker, StakerSet};
use super::Chain;

/// Errors raised while decoding or restoring a checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("malformed checkpoint: {0}")]
    Malformed(#[from] cbor::Error),
    #[error("duplicate node {0}")]
    DuplicateNode(Hash),
    #[error("node {node} has unknown link type {link_type}")]
    InvalidLinkType { node: Hash, link_type: u8 },
    #[error("node {node} recomputes to a different hash {computed}")]
    HashMismatch { node: Hash, computed: Hash },
    #[error("node {node} references unknown parent {prev}")]
    UnresolvedPrev { node: Hash, prev: Hash },
    #[error("parent {prev} successor slot {link_type} is bound twice")]
    SuccessorConflict { prev: Hash, link_type: u8 },
    #[error("duplicate leaf {0}")]
    DuplicateLeaf(Hash),
    #[error("leaf {0} does not resolve to a node")]
    UnresolvedLeaf(Hash),
    #[error("leaf {0} has successors")]
    ExtendedLeaf(Hash),
    #[error("duplicate staker {0}")]
    DuplicateStaker(Address),
    #[error("staker {staker} location {location} does not resolve to a node")]
    UnresolvedStakerLocation { staker: Address, location: Hash },
    #[error("staker {staker} references unknown challenge {challenge}")]
    UnresolvedChallenge { staker: Address, challenge: Address },
    #[error("duplicate challenge {0}")]
    DuplicateChallenge(Address),
    #[error("challenge {0} is not bound by both of its stakers")]
    ChallengeBinding(Address),
    #[error("latest confirmed node {0} does not resolve")]
    UnresolvedLatestConfirmed(Hash),
}

/// Flattened form of a single node.
///
/// Successor slots are not recorded; they are derived from the parent
/// hashes on restore. The VM state handle is never recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Content hash of the node.
    pub hash: Hash,
    /// Assertion payload; absent for the initial node.
    pub disputable: Option<DisputableNode>,
    /// Hash of the VM state at the node.
    pub machine_hash: Hash,
    /// Pending-inbox top at the node.
    pub pending_top_hash: Hash,
    /// Wire integer of the node's link type.
    pub link_type: u8,
    /// Parent hash; zero when the node has no intact parent link.
    pub prev: Hash,
}

/// A complete, self-contained snapshot of a chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCheckpoint {
    /// Address of the on-chain rollup contract.
    pub rollup_addr: Address,
    /// Protocol parameters.
    pub params: ChainParams,
    /// Marshalled pending inbox.
    pub pending_inbox: PendingInbox,
    /// Every live node.
    pub nodes: Vec<NodeRecord>,
    /// Hashes of the current leaves.
    pub leaves: Vec<Hash>,
    /// Current stakers.
    pub stakers: Vec<Staker>,
    /// Open challenges.
    pub challenges: Vec<Challenge>,
    /// Hash of the latest confirmed node.
    pub latest_confirmed: Hash,
}

impl ChainCheckpoint {
    /// Serialize into a CBOR byte vector.
    pub fn to_vec(&self) -> Vec<u8> {
        cbor::to_vec(self)
    }

    /// Deserialize from a CBOR byte slice.
    pub fn from_slice(data: &[u8]) -> Result<ChainCheckpoint, CheckpointError> {
        Ok(cbor::from_slice(data)?)
    }
}

impl<M: Machine> Chain<M> {
    /// Flatten the chain into a checkpoint.
    pub fn checkpoint(&self) -> ChainCheckpoint {
        ChainCheckpoint {
            rollup_addr: self.rollup_addr,
            params: self.params.clone(),
            pending_inbox: self.pending_inbox.clone(),
            nodes: self
                .nodes
                .values()
                .map(|node| NodeRecord {
                    hash: node.hash(),
                    disputable: node.disputable().cloned(),
                    machine_hash: node.machine_hash(),
                    pending_top_hash: node.pending_top_hash(),
                    link_type: node.link_type() as u8,
                    prev: node.prev().unwrap_or_default(),
                })
                .collect(),
            leaves: self.leaves.iter().cloned().collect(),
            stakers: self.stakers.iter().cloned().collect(),
            challenges: self.challenges.values().cloned().collect(),
            latest_confirmed: self.latest_confirmed,
        }
    }

    /// Serialize the whole chain into a CBOR checkpoint.
    pub fn to_vec(&self) -> Vec<u8> {
        self.checkpoint().to_vec()
    }

    /// Rebuild a chain from a checkpoint.
    ///
    /// Restored nodes carry no VM state handles; the embedder reattaches
    /// them from its own checkpoint store as needed.
    pub fn restore(checkpoint: &ChainCheckpoint) -> Result<Chain<M>, CheckpointError> {
        // Challenges first; stakers refer to them.
        let mut challenges = BTreeMap::new();
        for challenge in &checkpoint.challenges {
            if challenges
                .insert(challenge.contract, challenge.clone())
                .is_some()
            {
                return Err(CheckpointError::DuplicateChallenge(challenge.contract));
            }
        }

        // First pass: materialize nodes and index them by hash.
        let mut nodes: BTreeMap<Hash, Node<M>> = BTreeMap::new();
        let mut wiring: Vec<(Hash, Hash, ChildType)> = Vec::new();
        for record in &checkpoint.nodes {
            let link_type = ChildType::from_u8(record.link_type).ok_or(
                CheckpointError::InvalidLinkType {
                    node: record.hash,
                    link_type: record.link_type,
                },
            )?;
            let prev = if record.prev.is_zero() {
                None
            } else {
                wiring.push((record.hash, record.prev, link_type));
                Some(record.prev)
            };
            let node = Node::restored(
                record.hash,
                record.disputable.clone(),
                record.machine_hash,
                record.pending_top_hash,
                link_type,
                prev,
            );
            // The hash preimage includes the parent link as it was at
            // creation; it can only be re-derived while that link is
            // intact (the initial node never had one).
            let derivable = node.prev().is_some() || node.disputable().is_none();
            if derivable {
                let computed = node.compute_hash();
                if computed != record.hash {
                    return Err(CheckpointError::HashMismatch {
                        node: record.hash,
                        computed,
                    });
                }
            }
            if nodes.insert(record.hash, node).is_some() {
                return Err(CheckpointError::DuplicateNode(record.hash));
            }
        }

        // Second pass: wire successor slots through the parent hashes.
        for (hash, prev, link_type) in wiring {
            let parent = nodes
                .get_mut(&prev)
                .ok_or(CheckpointError::UnresolvedPrev { node: hash, prev })?;
            if !parent.successor_hash(link_type).is_zero() {
                return Err(CheckpointError::SuccessorConflict {
                    prev,
                    link_type: link_type as u8,
                });
            }
            parent.successor_hashes[link_type.index()] = hash;
            parent.has_successors = true;
        }

        let mut leaves = LeafSet::default();
        for &hash in &checkpoint.leaves {
            if leaves.contains(&hash) {
                return Err(CheckpointError::DuplicateLeaf(hash));
            }
            let node = nodes.get(&hash).ok_or(CheckpointError::UnresolvedLeaf(hash))?;
            if node.has_successors() {
                return Err(CheckpointError::ExtendedLeaf(hash));
            }
            leaves.add(hash);
        }

        let mut stakers = StakerSet::default();
        for staker in &checkpoint.stakers {
            if stakers.get(&staker.address).is_some() {
                return Err(CheckpointError::DuplicateStaker(staker.address));
            }
            if !nodes.contains_key(&staker.location) {
                return Err(CheckpointError::UnresolvedStakerLocation {
                    staker: staker.address,
                    location: staker.location,
                });
            }
            if let Some(challenge) = staker.challenge {
                if !challenges.contains_key(&challenge) {
                    return Err(CheckpointError::UnresolvedChallenge {
                        staker: staker.address,
                        challenge,
                    });
                }
            }
            stakers.add(staker.clone());
        }

        // Every challenge must be bound by exactly its two stakers.
        for challenge in challenges.values() {
            let bound = |address: &Address| {
                stakers
                    .get(address)
                    .map_or(false, |staker| staker.challenge == Some(challenge.contract))
            };
            if !bound(&challenge.asserter) || !bound(&challenge.challenger) {
                return Err(CheckpointError::ChallengeBinding(challenge.contract));
            }
        }

        if !nodes.contains_key(&checkpoint.latest_confirmed) {
            return Err(CheckpointError::UnresolvedLatestConfirmed(
                checkpoint.latest_confirmed,
            ));
        }

        Ok(Chain {
            rollup_addr: checkpoint.rollup_addr,
            params: checkpoint.params.clone(),
            pending_inbox: checkpoint.pending_inbox.clone(),
            latest_confirmed: checkpoint.latest_confirmed,
            nodes,
            leaves,
            stakers,
            challenges,
            latest_block: RollupTime::default(),
            logger: get_logger("chain"),
        })
    }

    /// Rebuild a chain from a CBOR checkpoint.
    pub fn from_slice(data: &[u8]) -> Result<Chain<M>, CheckpointError> {
        Chain::restore(&ChainCheckpoint::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::super::challenge::ChallengeKind;
    use super::super::testing::TestMachine;
    use super::*;

    fn sample_chain() -> Chain<TestMachine> {
        let machine = TestMachine::with_byte(0x01);
        let mut chain = Chain::new(
            Address([0xaa; 20]),
            ChainParams {
                stake_requirement: crate::common::quantity::Quantity::from(1_000_000),
                grace_period: RollupTime::from(720),
                max_execution_steps: 100_000,
            },
            PendingInbox(vec![1, 2, 3]),
            &machine,
        );
        let root = chain.latest_confirmed_hash();

        let disputable = DisputableNode {
            hash: Hash([0x7f; 32]),
            pending_top_hash: Hash([0x55; 32]),
            deadline: RollupTime::from(100),
        };
        let after = TestMachine::with_byte(0x02);
        let children =
            chain.create_nodes_on_assert(root, disputable, after.0, Some(&after));

        chain.create_stake(Address([0x0a; 20]), root, RollupTime::from(1));
        chain.create_stake(
            Address([0x0b; 20]),
            children[ChildType::Valid.index()],
            RollupTime::from(2),
        );
        chain.new_challenge(
            Address([0xcc; 20]),
            Address([0x0a; 20]),
            Address([0x0b; 20]),
            ChallengeKind::InvalidExecution,
        );
        chain
    }

    #[test]
    fn test_roundtrip() {
        let chain = sample_chain();
        chain.check_invariants();

        let encoded = chain.to_vec();
        let restored: Chain<TestMachine> = Chain::from_slice(&encoded).unwrap();
        restored.check_invariants();

        // Restored nodes carry no machines; everything else matches.
        assert_eq!(restored.checkpoint(), chain.checkpoint());
        assert_eq!(
            restored.latest_confirmed_hash(),
            chain.latest_confirmed_hash()
        );
        assert_eq!(restored.node_count(), chain.node_count());
        assert_eq!(restored.leaves().len(), chain.leaves().len());
        assert_eq!(restored.stakers().len(), chain.stakers().len());
        assert_eq!(restored.challenge_count(), chain.challenge_count());
        for leaf in chain.leaves().iter() {
            assert!(restored.is_leaf(leaf));
        }
        assert!(restored
            .node(&chain.latest_confirmed_hash())
            .unwrap()
            .machine()
            .is_none());
    }

    #[test]
    fn test_roundtrip_after_confirm() {
        let mut chain = sample_chain();
        let valid = chain
            .latest_confirmed()
            .successor_hash(ChildType::Valid);
        chain.confirm_node(valid);
        chain.check_invariants();

        // The confirmed node's parent link is severed; its recorded
        // hash must survive the round trip untouched.
        let restored: Chain<TestMachine> = Chain::from_slice(&chain.to_vec()).unwrap();
        restored.check_invariants();
        assert_eq!(restored.checkpoint(), chain.checkpoint());
        assert_eq!(restored.latest_confirmed_hash(), valid);
        assert_eq!(restored.latest_confirmed().prev(), None);
    }

    #[test]
    fn test_missing_node_reference() {
        let chain = sample_chain();
        let mut checkpoint = chain.checkpoint();

        // Drop the root record; its children now reference a missing
        // parent.
        let root = chain.latest_confirmed_hash();
        checkpoint.nodes.retain(|record| record.hash != root);

        match Chain::<TestMachine>::restore(&checkpoint) {
            Err(CheckpointError::UnresolvedPrev { prev, .. }) => assert_eq!(prev, root),
            other => panic!("expected unresolved parent, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_tampered_node() {
        let chain = sample_chain();
        let mut checkpoint = chain.checkpoint();
        checkpoint.nodes[0].machine_hash = Hash([0xff; 32]);

        match Chain::<TestMachine>::restore(&checkpoint) {
            Err(CheckpointError::HashMismatch { .. }) => (),
            other => panic!("expected hash mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_link_type() {
        let chain = sample_chain();
        let mut checkpoint = chain.checkpoint();
        checkpoint.nodes[0].link_type = 9;

        match Chain::<TestMachine>::restore(&checkpoint) {
            Err(CheckpointError::InvalidLinkType { link_type, .. }) => assert_eq!(link_type, 9),
            other => panic!("expected invalid link type, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unresolved_challenge() {
        let chain = sample_chain();
        let mut checkpoint = chain.checkpoint();
        checkpoint.challenges.clear();

        match Chain::<TestMachine>::restore(&checkpoint) {
            Err(CheckpointError::UnresolvedChallenge { challenge, .. }) => {
                assert_eq!(challenge, Address([0xcc; 20]))
            }
            other => panic!("expected unresolved challenge, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unbound_challenge() {
        let chain = sample_chain();
        let mut checkpoint = chain.checkpoint();
        for staker in checkpoint.stakers.iter_mut() {
            staker.challenge = None;
        }

        match Chain::<TestMachine>::restore(&checkpoint) {
            Err(CheckpointError::ChallengeBinding(contract)) => {
                assert_eq!(contract, Address([0xcc; 20]))
            }
            other => panic!("expected unbound challenge, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unresolved_leaf() {
        let chain = sample_chain();
        let mut checkpoint = chain.checkpoint();
        checkpoint.leaves.push(Hash([0xee; 32]));

        match Chain::<TestMachine>::restore(&checkpoint) {
            Err(CheckpointError::UnresolvedLeaf(hash)) => assert_eq!(hash, Hash([0xee; 32])),
            other => panic!("expected unresolved leaf, got {:?}", other.map(|_| ())),
        }
    }
}
