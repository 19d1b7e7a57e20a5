//! Local mirror of the on-chain rollup dispute protocol.
//!
//! The chain tracks the tree of assertion nodes rooted at the latest
//! confirmed node, the current leaves, the stakers bonded to positions
//! on the tree, and the open challenges between them. Mutations are
//! driven by an external, already-ordered stream of on-chain events;
//! the core applies each one synchronously, re-establishing every
//! internal invariant before returning.

pub mod challenge;
pub mod checkpoint;
pub mod inbox;
pub mod machine;
pub mod node;
pub mod params;
pub mod staker;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::{BTreeMap, BTreeSet};

use slog::Logger;

use crate::common::bytes::Address;
use crate::common::crypto::hash::Hash;
use crate::common::logger::get_logger;
use crate::common::time::RollupTime;

use self::challenge::{Challenge, ChallengeKind};
use self::inbox::PendingInbox;
use self::machine::Machine;
use self::node::{ChildType, DisputableNode, LeafSet, Node};
use self::params::ChainParams;
use self::staker::{Staker, StakerSet};

/// Local state of one rollup chain.
pub struct Chain<M: Machine> {
    /// Address of the on-chain rollup contract.
    pub(crate) rollup_addr: Address,
    /// Protocol parameters fixed at rollup creation.
    pub(crate) params: ChainParams,
    /// Latest marshalled pending inbox state.
    pub(crate) pending_inbox: PendingInbox,
    /// Hash of the deepest confirmed node.
    pub(crate) latest_confirmed: Hash,
    /// All live nodes, keyed by content hash. The sole authoritative
    /// index.
    pub(crate) nodes: BTreeMap<Hash, Node<M>>,
    /// Current leaves.
    pub(crate) leaves: LeafSet,
    /// Current stakers.
    pub(crate) stakers: StakerSet,
    /// Open challenges, keyed by challenge contract address.
    pub(crate) challenges: BTreeMap<Address, Challenge>,
    /// Latest observed L1 block height.
    pub(crate) latest_block: RollupTime,
    /// Logger.
    pub(crate) logger: Logger,
}

impl<M: Machine> Chain<M> {
    /// Create a chain consisting of the initial node.
    ///
    /// The initial node commits to the supplied machine's state and an
    /// empty pending inbox; it starts out both confirmed and a leaf.
    pub fn new(
        rollup_addr: Address,
        params: ChainParams,
        pending_inbox: PendingInbox,
        machine: &M,
    ) -> Chain<M> {
        let logger = get_logger("chain");
        let node = Node::initial(machine);
        let hash = node.hash();

        let mut nodes = BTreeMap::new();
        nodes.insert(hash, node);
        let mut leaves = LeafSet::default();
        leaves.add(hash);

        info!(logger, "Created initial node"; "node" => %hash);

        Chain {
            rollup_addr,
            params,
            pending_inbox,
            latest_confirmed: hash,
            nodes,
            leaves,
            stakers: StakerSet::default(),
            challenges: BTreeMap::new(),
            latest_block: RollupTime::default(),
            logger,
        }
    }

    /// Extend the leaf `prev` with the four children of an assertion.
    ///
    /// Creates one `Valid` child carrying the asserted post-state and
    /// one child per invalid kind carrying the parent's state. All four
    /// become leaves in place of `prev`. Returns the children's hashes
    /// indexed by child kind. Asserting on a node that is not currently
    /// a leaf is a fatal error.
    pub fn create_nodes_on_assert(
        &mut self,
        prev: Hash,
        disputable: DisputableNode,
        after_machine_hash: Hash,
        after_machine: Option<&M>,
    ) -> [Hash; ChildType::COUNT] {
        if !self.leaves.contains(&prev) {
            panic!("assertion parent {} is not a leaf", prev);
        }
        self.leaves.delete(&prev);

        let children = {
            let prev_node = self.nodes.get(&prev).expect("leaf is not indexed");
            let mut children = Vec::with_capacity(ChildType::COUNT);
            children.push(Node::valid_child(
                prev_node,
                disputable.clone(),
                after_machine_hash,
                after_machine,
            ));
            for &kind in ChildType::invalid_kinds().iter() {
                children.push(Node::invalid_child(prev_node, disputable.clone(), kind));
            }
            children
        };

        let mut hashes = [Hash::default(); ChildType::COUNT];
        for child in children {
            let hash = child.hash();
            let kind = child.link_type();
            hashes[kind.index()] = hash;
            {
                let prev_node = self.nodes.get_mut(&prev).expect("leaf is not indexed");
                prev_node.has_successors = true;
                prev_node.successor_hashes[kind.index()] = hash;
            }
            self.leaves.add(hash);
            if self.nodes.insert(hash, child).is_some() {
                panic!("node {} already exists", hash);
            }
        }

        debug!(self.logger, "Created assertion nodes";
            "prev" => %prev,
            "valid" => %hashes[ChildType::Valid.index()]
        );
        hashes
    }

    /// Mark the node as the latest confirmed node and reclaim whatever
    /// its confirmation leaves unreachable.
    ///
    /// The confirmed node's link to its former parent is severed; the
    /// parent's matching successor slot is cleared, and parents left
    /// without children cascade the detachment upward. Confirming a
    /// hash that is not indexed is a fatal error.
    pub fn confirm_node(&mut self, hash: Hash) {
        if !self.nodes.contains_key(&hash) {
            panic!("confirmed node {} is unknown", hash);
        }
        self.latest_confirmed = hash;
        self.remove_prev(hash);
        self.collect_unreachable();

        info!(self.logger, "Confirmed node"; "node" => %hash);
    }

    /// Drop the node from the chain and reclaim whatever its removal
    /// leaves unreachable.
    ///
    /// The latest confirmed node and nodes carrying a stake cannot be
    /// pruned; the on-chain contract never emits such an event, so
    /// observing one is fatal, as is pruning a hash that is not
    /// indexed.
    pub fn prune_node(&mut self, hash: Hash) {
        if hash == self.latest_confirmed {
            panic!("pruned node {} is the latest confirmed node", hash);
        }
        if let Some(staker) = self.stakers.iter().find(|s| s.location == hash) {
            panic!("pruned node {} is staked on by {}", hash, staker.address);
        }
        let node = match self.nodes.remove(&hash) {
            Some(node) => node,
            None => panic!("pruned node {} is unknown", hash),
        };
        self.leaves.delete(&hash);

        // Children of a pruned node lose their upward link; their
        // subtrees stay alive through the leaf set.
        for child_hash in node.successor_hashes.iter().filter(|h| !h.is_zero()) {
            if let Some(child) = self.nodes.get_mut(child_hash) {
                child.prev = None;
            }
        }
        if let Some(prev) = node.prev {
            self.clear_successor(prev, node.link_type);
        }
        self.collect_unreachable();

        info!(self.logger, "Pruned node"; "node" => %hash);
    }

    /// Place a new stake on the named node.
    ///
    /// Staking an address that is already staked, or on a node that is
    /// not indexed, is a fatal error.
    pub fn create_stake(&mut self, address: Address, location: Hash, creation_time: RollupTime) {
        if !self.nodes.contains_key(&location) {
            panic!("stake location {} is unknown", location);
        }
        self.stakers.add(Staker {
            address,
            location,
            creation_time,
            challenge: None,
        });

        debug!(self.logger, "Created stake"; "staker" => %address, "node" => %location);
    }

    /// Move an existing stake to the named node.
    ///
    /// A staker bound to an open challenge cannot move; the on-chain
    /// contract never emits such an event, so observing one is fatal.
    pub fn move_stake(&mut self, address: Address, location: Hash) {
        if !self.nodes.contains_key(&location) {
            panic!("stake location {} is unknown", location);
        }
        let staker = match self.stakers.get_mut(&address) {
            Some(staker) => staker,
            None => panic!("staker {} is unknown", address),
        };
        if let Some(challenge) = staker.challenge {
            panic!("staker {} is bound to challenge {}", address, challenge);
        }
        staker.location = location;
        self.collect_unreachable();

        debug!(self.logger, "Moved stake"; "staker" => %address, "node" => %location);
    }

    /// Drop a stake. Absent addresses are ignored; dropping a staker
    /// bound to an open challenge is a fatal error.
    pub fn remove_stake(&mut self, address: Address) {
        if let Some(staker) = self.stakers.get(&address) {
            if let Some(challenge) = staker.challenge {
                panic!("staker {} is bound to challenge {}", address, challenge);
            }
        }
        self.stakers.delete(&address);
        self.collect_unreachable();

        debug!(self.logger, "Removed stake"; "staker" => %address);
    }

    /// Open a challenge between two stakers.
    ///
    /// Both stakers must exist and be free of challenges; anything else
    /// is a fatal error.
    pub fn new_challenge(
        &mut self,
        contract: Address,
        asserter: Address,
        challenger: Address,
        kind: ChallengeKind,
    ) {
        if asserter == challenger {
            panic!("challenge {} binds a staker to itself", contract);
        }
        if self.challenges.contains_key(&contract) {
            panic!("challenge {} already exists", contract);
        }
        for address in [asserter, challenger].iter() {
            match self.stakers.get(address) {
                Some(staker) if staker.challenge.is_some() => {
                    panic!("staker {} is already in a challenge", address)
                }
                Some(_) => (),
                None => panic!("staker {} is unknown", address),
            }
        }

        self.challenges.insert(
            contract,
            Challenge {
                contract,
                asserter,
                challenger,
                kind,
            },
        );
        self.stakers.get_mut(&asserter).expect("staker vanished").challenge = Some(contract);
        self.stakers.get_mut(&challenger).expect("staker vanished").challenge = Some(contract);

        info!(self.logger, "Opened challenge";
            "contract" => %contract,
            "asserter" => %asserter,
            "challenger" => %challenger
        );
    }

    /// Resolve a challenge: the loser's stake is dropped and the winner
    /// is freed.
    ///
    /// The winner's challenge binding is cleared here even though the
    /// on-chain contract leaves it dangling until the winner next acts.
    pub fn challenge_resolved(&mut self, contract: Address, winner: Address, loser: Address) {
        let challenge = match self.challenges.remove(&contract) {
            Some(challenge) => challenge,
            None => panic!("challenge {} is unknown", contract),
        };
        let parties_match = (challenge.asserter == winner && challenge.challenger == loser)
            || (challenge.asserter == loser && challenge.challenger == winner);
        if !parties_match {
            panic!("challenge {} does not bind {} and {}", contract, winner, loser);
        }

        self.stakers.delete(&loser);
        if let Some(staker) = self.stakers.get_mut(&winner) {
            staker.challenge = None;
        }
        self.collect_unreachable();

        info!(self.logger, "Resolved challenge";
            "contract" => %contract,
            "winner" => %winner,
            "loser" => %loser
        );
    }

    /// Record a new L1 block height.
    ///
    /// Checkpointing hooks off this notification; the trigger policy
    /// lives with the embedder.
    pub fn notify_new_block_number(&mut self, block: RollupTime) {
        self.latest_block = block;
    }

    /// Sever the node's link to its former parent, cascading the
    /// detachment through parents left without children.
    fn remove_prev(&mut self, hash: Hash) {
        let detached = match self.nodes.get_mut(&hash) {
            Some(node) => {
                let link_type = node.link_type;
                node.prev.take().map(|prev| (prev, link_type))
            }
            None => None,
        };
        if let Some((prev, link_type)) = detached {
            self.clear_successor(prev, link_type);
        }
    }

    /// Clear the parent's successor slot for a detached child.
    fn clear_successor(&mut self, parent: Hash, link_type: ChildType) {
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.successor_hashes[link_type.index()] = Hash::default();
            self.consider_removing(parent);
        }
    }

    /// Cascade the detachment to a parent whose last child is gone.
    fn consider_removing(&mut self, hash: Hash) {
        let childless = match self.nodes.get(&hash) {
            Some(node) => node.is_childless(),
            None => false,
        };
        if childless {
            self.remove_prev(hash);
        }
    }

    /// Drop every node that is no longer reachable from the live roots.
    ///
    /// A node is live iff it is the latest confirmed node, a leaf, a
    /// staker's location, or an ancestor of one of those through `prev`
    /// links.
    fn collect_unreachable(&mut self) {
        let mut live = BTreeSet::new();
        let mut pending: Vec<Hash> = Vec::new();
        pending.push(self.latest_confirmed);
        pending.extend(self.leaves.iter().cloned());
        pending.extend(self.stakers.iter().map(|s| s.location));

        while let Some(hash) = pending.pop() {
            if !live.insert(hash) {
                continue;
            }
            if let Some(node) = self.nodes.get(&hash) {
                if let Some(prev) = node.prev {
                    pending.push(prev);
                }
            }
        }

        self.nodes.retain(|hash, _| live.contains(hash));
    }
}

impl<M: Machine> Chain<M> {
    /// Address of the on-chain rollup contract.
    pub fn rollup_addr(&self) -> Address {
        self.rollup_addr
    }

    /// Protocol parameters.
    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Latest marshalled pending inbox state.
    pub fn pending_inbox(&self) -> &PendingInbox {
        &self.pending_inbox
    }

    /// Replace the marshalled pending inbox state.
    pub fn set_pending_inbox(&mut self, pending_inbox: PendingInbox) {
        self.pending_inbox = pending_inbox;
    }

    /// The latest confirmed node.
    pub fn latest_confirmed(&self) -> &Node<M> {
        self.nodes
            .get(&self.latest_confirmed)
            .expect("latest confirmed node is not indexed")
    }

    /// Hash of the latest confirmed node.
    pub fn latest_confirmed_hash(&self) -> Hash {
        self.latest_confirmed
    }

    /// Look up a node by hash.
    pub fn node(&self, hash: &Hash) -> Option<&Node<M>> {
        self.nodes.get(hash)
    }

    /// Number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the hash is currently a leaf.
    pub fn is_leaf(&self, hash: &Hash) -> bool {
        self.leaves.contains(hash)
    }

    /// The current leaves.
    pub fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    /// The current stakers.
    pub fn stakers(&self) -> &StakerSet {
        &self.stakers
    }

    /// Look up a staker by address.
    pub fn staker(&self, address: &Address) -> Option<&Staker> {
        self.stakers.get(address)
    }

    /// Look up an open challenge by contract address.
    pub fn challenge(&self, contract: &Address) -> Option<&Challenge> {
        self.challenges.get(contract)
    }

    /// Number of open challenges.
    pub fn challenge_count(&self) -> usize {
        self.challenges.len()
    }

    /// Latest observed L1 block height.
    pub fn latest_block(&self) -> RollupTime {
        self.latest_block
    }

    /// Verify the chain's internal invariants, panicking on violation.
    ///
    /// Linear in the size of the chain; meant for tests.
    #[doc(hidden)]
    pub fn check_invariants(&self) {
        assert!(
            self.nodes.contains_key(&self.latest_confirmed),
            "latest confirmed node is not indexed",
        );

        for (hash, node) in self.nodes.iter() {
            assert_eq!(*hash, node.hash(), "node is indexed under a foreign hash");
            // A severed parent link takes part of the hash preimage with
            // it; only nodes with the link intact (or the initial node)
            // can be re-derived.
            if node.prev().is_some() || node.disputable().is_none() {
                assert_eq!(node.compute_hash(), node.hash(), "node hash is stale");
            }

            if let Some(prev) = node.prev() {
                let parent = self
                    .nodes
                    .get(&prev)
                    .expect("intact parent link references a missing node");
                assert_eq!(
                    parent.successor_hash(node.link_type()),
                    *hash,
                    "parent successor slot does not point back",
                );
            }

            for &kind in [
                ChildType::Valid,
                ChildType::InvalidPendingTop,
                ChildType::InvalidMessages,
                ChildType::InvalidExecution,
            ]
            .iter()
            {
                let successor = node.successor_hash(kind);
                if successor.is_zero() {
                    continue;
                }
                let child = self
                    .nodes
                    .get(&successor)
                    .expect("successor slot references a missing node");
                assert_eq!(child.prev(), Some(*hash), "child does not point back");
                assert_eq!(child.link_type(), kind, "child link type mismatch");
            }
        }

        for leaf in self.leaves.iter() {
            let node = self.nodes.get(leaf).expect("leaf is not indexed");
            assert!(!node.has_successors(), "leaf has successors");
        }

        for staker in self.stakers.iter() {
            assert!(
                self.nodes.contains_key(&staker.location),
                "staker location is not indexed",
            );
            if let Some(contract) = staker.challenge {
                assert!(
                    self.challenges.contains_key(&contract),
                    "staker references a missing challenge",
                );
            }
        }

        for challenge in self.challenges.values() {
            for address in [challenge.asserter, challenge.challenger].iter() {
                let staker = self.stakers.get(address).expect("challenge party is not staked");
                assert_eq!(
                    staker.challenge,
                    Some(challenge.contract),
                    "challenge party is not bound to the challenge",
                );
            }
        }
    }
}
