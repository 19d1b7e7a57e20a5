//! Nodes of the rollup tree.
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::common::crypto::hash::{uint256_be, Hash};
use crate::common::time::RollupTime;

use super::machine::Machine;

/// Kind of edge between a node and its parent.
///
/// An assertion extends a leaf with one `Valid` child and one child per
/// way the assertion could be wrong. The wire values MUST be kept in
/// sync with the on-chain rollup contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum ChildType {
    /// The assertion is claimed correct.
    Valid = 0,
    /// The claimed pending-top commitment is wrong.
    InvalidPendingTop = 1,
    /// The claimed message sequence is wrong.
    InvalidMessages = 2,
    /// The claimed execution is wrong.
    InvalidExecution = 3,
}

impl ChildType {
    /// Number of child kinds.
    pub const COUNT: usize = 4;
    /// Smallest invalid child kind.
    pub const MIN_INVALID: ChildType = ChildType::InvalidPendingTop;
    /// Largest child kind.
    pub const MAX: ChildType = ChildType::InvalidExecution;

    /// The three invalid child kinds, in wire order.
    pub fn invalid_kinds() -> [ChildType; 3] {
        [
            ChildType::InvalidPendingTop,
            ChildType::InvalidMessages,
            ChildType::InvalidExecution,
        ]
    }

    /// Decode a wire integer.
    pub fn from_u8(value: u8) -> Option<ChildType> {
        match value {
            0 => Some(ChildType::Valid),
            1 => Some(ChildType::InvalidPendingTop),
            2 => Some(ChildType::InvalidMessages),
            3 => Some(ChildType::InvalidExecution),
            _ => None,
        }
    }

    /// Index into per-child slot arrays.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// The challengeable payload of an assertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputableNode {
    /// Hash commitment to the full assertion, as computed on-chain.
    pub hash: Hash,
    /// Claimed pending-inbox top at the assertion.
    pub pending_top_hash: Hash,
    /// Deadline by which the assertion may be challenged.
    pub deadline: RollupTime,
}

/// A single position in the rollup tree.
#[derive(Clone, Debug)]
pub struct Node<M> {
    /// Content hash; unique identifier, matching the on-chain
    /// computation.
    pub(crate) hash: Hash,
    /// Assertion payload; absent only on the initial node.
    pub(crate) disputable: Option<DisputableNode>,
    /// Hash of the VM state at this node.
    pub(crate) machine_hash: Hash,
    /// Cached VM state handle. Never part of the node hash or of a
    /// checkpoint.
    pub(crate) machine: Option<M>,
    /// Pending-inbox top as of this node.
    pub(crate) pending_top_hash: Hash,
    /// Parent hash; cleared when the link to the parent is severed.
    pub(crate) prev: Option<Hash>,
    /// How this node relates to its parent.
    pub(crate) link_type: ChildType,
    /// Whether this node has been extended by an assertion.
    pub(crate) has_successors: bool,
    /// Child hash per child kind; zero where absent.
    pub(crate) successor_hashes: [Hash; ChildType::COUNT],
}

impl<M: Machine> Node<M> {
    /// The initial node of a fresh chain.
    ///
    /// Commits to the supplied machine's state and an empty pending
    /// inbox; carries no assertion.
    pub(crate) fn initial(machine: &M) -> Node<M> {
        let mut node = Node {
            hash: Hash::default(),
            disputable: None,
            machine_hash: machine.hash(),
            machine: Some(machine.clone()),
            pending_top_hash: Hash::empty_tuple(),
            prev: None,
            link_type: ChildType::Valid,
            has_successors: false,
            successor_hashes: [Hash::default(); ChildType::COUNT],
        };
        node.hash = node.compute_hash();
        node
    }

    /// The `Valid` child of an assertion, carrying the asserted
    /// post-state.
    pub(crate) fn valid_child(
        prev: &Node<M>,
        disputable: DisputableNode,
        after_machine_hash: Hash,
        after_machine: Option<&M>,
    ) -> Node<M> {
        let pending_top_hash = disputable.pending_top_hash;
        let mut node = Node {
            hash: Hash::default(),
            disputable: Some(disputable),
            machine_hash: after_machine_hash,
            machine: after_machine.cloned(),
            pending_top_hash,
            prev: Some(prev.hash),
            link_type: ChildType::Valid,
            has_successors: false,
            successor_hashes: [Hash::default(); ChildType::COUNT],
        };
        node.hash = node.compute_hash();
        node
    }

    /// An invalid child of an assertion.
    ///
    /// The VM does not advance on an invalid edge; the child carries the
    /// parent's state.
    pub(crate) fn invalid_child(
        prev: &Node<M>,
        disputable: DisputableNode,
        kind: ChildType,
    ) -> Node<M> {
        let mut node = Node {
            hash: Hash::default(),
            disputable: Some(disputable),
            machine_hash: prev.machine_hash,
            machine: prev.machine.clone(),
            pending_top_hash: prev.pending_top_hash,
            prev: Some(prev.hash),
            link_type: kind,
            has_successors: false,
            successor_hashes: [Hash::default(); ChildType::COUNT],
        };
        node.hash = node.compute_hash();
        node
    }

    /// A node materialized from a checkpoint record, under its
    /// recorded hash. Carries no VM state handle.
    pub(crate) fn restored(
        hash: Hash,
        disputable: Option<DisputableNode>,
        machine_hash: Hash,
        pending_top_hash: Hash,
        link_type: ChildType,
        prev: Option<Hash>,
    ) -> Node<M> {
        Node {
            hash,
            disputable,
            machine_hash,
            machine: None,
            pending_top_hash,
            prev,
            link_type,
            has_successors: false,
            successor_hashes: [Hash::default(); ChildType::COUNT],
        }
    }

    /// Derive the content hash from the node's fields.
    ///
    /// This MUST be kept in sync with the on-chain rollup contract. The
    /// initial node, which carries no assertion, hashes a zero
    /// disputable commitment in its place. The hash is fixed at
    /// creation: severing the parent link later does not change it, so
    /// a severed node's hash can no longer be re-derived.
    pub(crate) fn compute_hash(&self) -> Hash {
        let proto_state = Hash::digest_bytes(self.machine_hash.as_ref());
        let disputable_hash = self
            .disputable
            .as_ref()
            .map(|d| d.hash)
            .unwrap_or_default();
        let inner = Hash::digest_packed(&[
            disputable_hash.as_ref(),
            &uint256_be(self.link_type as u64),
            proto_state.as_ref(),
        ]);
        let prev_hash = self.prev.unwrap_or_default();
        Hash::digest_packed(&[prev_hash.as_ref(), inner.as_ref()])
    }
}

impl<M> Node<M> {
    /// Content hash of the node.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// Assertion payload; absent only on the initial node.
    pub fn disputable(&self) -> Option<&DisputableNode> {
        self.disputable.as_ref()
    }

    /// Hash of the VM state at this node.
    pub fn machine_hash(&self) -> Hash {
        self.machine_hash
    }

    /// Cached VM state handle, if one is attached.
    pub fn machine(&self) -> Option<&M> {
        self.machine.as_ref()
    }

    /// Pending-inbox top as of this node.
    pub fn pending_top_hash(&self) -> Hash {
        self.pending_top_hash
    }

    /// Parent hash, if the link to the parent is intact.
    pub fn prev(&self) -> Option<Hash> {
        self.prev
    }

    /// How this node relates to its parent.
    pub fn link_type(&self) -> ChildType {
        self.link_type
    }

    /// Whether this node has been extended by an assertion.
    pub fn has_successors(&self) -> bool {
        self.has_successors
    }

    /// Hash of the child of the given kind; zero when absent.
    pub fn successor_hash(&self, kind: ChildType) -> Hash {
        self.successor_hashes[kind.index()]
    }

    /// Whether every successor slot is empty.
    pub(crate) fn is_childless(&self) -> bool {
        self.successor_hashes.iter().all(Hash::is_zero)
    }
}

/// Uniqueness-enforcing set of leaf nodes, keyed by node hash.
#[derive(Clone, Debug, Default)]
pub struct LeafSet(BTreeSet<Hash>);

impl LeafSet {
    /// Add a leaf. Adding a hash that is already present is a fatal
    /// error.
    pub(crate) fn add(&mut self, hash: Hash) {
        if !self.0.insert(hash) {
            panic!("leaf {} already exists", hash);
        }
    }

    /// Remove a leaf; absent hashes are ignored.
    pub(crate) fn delete(&mut self, hash: &Hash) {
        self.0.remove(hash);
    }

    /// Whether the hash is currently a leaf.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.0.contains(hash)
    }

    /// Iterate over leaf hashes. The order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = &Hash> {
        self.0.iter()
    }

    /// Number of leaves.
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
    use super::super::testing::TestMachine;
    use super::*;

    fn disputable() -> DisputableNode {
        DisputableNode {
            hash: Hash([0x7f; 32]),
            pending_top_hash: Hash([0x55; 32]),
            deadline: RollupTime::from(100),
        }
    }

    #[test]
    fn test_child_type_wire_values() {
        assert_eq!(ChildType::Valid as u8, 0);
        assert_eq!(ChildType::InvalidPendingTop as u8, 1);
        assert_eq!(ChildType::InvalidMessages as u8, 2);
        assert_eq!(ChildType::InvalidExecution as u8, 3);
        assert_eq!(ChildType::MIN_INVALID as u8, 1);
        assert_eq!(ChildType::MAX as u8, 3);
        for v in 0..=3 {
            assert_eq!(ChildType::from_u8(v).map(|t| t as u8), Some(v));
        }
        assert_eq!(ChildType::from_u8(4), None);
    }

    #[test]
    fn test_initial_node() {
        let machine = TestMachine::with_byte(0x01);
        let node = Node::initial(&machine);
        assert_eq!(node.machine_hash(), Hash([0x01; 32]));
        assert_eq!(node.pending_top_hash(), Hash::empty_tuple());
        assert_eq!(node.link_type(), ChildType::Valid);
        assert_eq!(node.prev(), None);
        assert!(node.disputable().is_none());

        // The initial node hashes a zero disputable commitment and a
        // zero parent hash.
        let proto_state = Hash::digest_bytes(Hash([0x01; 32]).as_ref());
        let inner = Hash::digest_packed(&[
            Hash::default().as_ref(),
            &uint256_be(0),
            proto_state.as_ref(),
        ]);
        let expected = Hash::digest_packed(&[Hash::default().as_ref(), inner.as_ref()]);
        assert_eq!(node.hash(), expected);
    }

    #[test]
    fn test_child_nodes() {
        let machine = TestMachine::with_byte(0x01);
        let root = Node::initial(&machine);
        let after = TestMachine::with_byte(0x02);

        let valid = Node::valid_child(&root, disputable(), after.0, Some(&after));
        assert_eq!(valid.machine_hash(), Hash([0x02; 32]));
        assert_eq!(valid.pending_top_hash(), Hash([0x55; 32]));
        assert_eq!(valid.prev(), Some(root.hash()));
        assert_eq!(valid.link_type(), ChildType::Valid);

        // Invalid children carry the parent's state.
        let invalid = Node::invalid_child(&root, disputable(), ChildType::InvalidMessages);
        assert_eq!(invalid.machine_hash(), Hash([0x01; 32]));
        assert_eq!(invalid.pending_top_hash(), Hash::empty_tuple());
        assert_eq!(invalid.machine(), Some(&machine));
        assert_eq!(invalid.prev(), Some(root.hash()));
        assert_eq!(invalid.link_type(), ChildType::InvalidMessages);

        assert_ne!(valid.hash(), invalid.hash());
    }

    #[test]
    fn test_valid_child_hash_by_hand() {
        let machine = TestMachine::with_byte(0x01);
        let root = Node::initial(&machine);
        let valid = Node::valid_child(&root, disputable(), Hash([0x02; 32]), None);

        let expected = Hash::digest_packed(&[
            root.hash().as_ref(),
            Hash::digest_packed(&[
                Hash([0x7f; 32]).as_ref(),
                &uint256_be(0),
                Hash::digest_bytes(Hash([0x02; 32]).as_ref()).as_ref(),
            ])
            .as_ref(),
        ]);
        assert_eq!(valid.hash(), expected);
    }

    #[test]
    fn test_hash_determinism() {
        let machine = TestMachine::with_byte(0x01);
        let root = Node::initial(&machine);
        let a = Node::valid_child(&root, disputable(), Hash([0x02; 32]), None);
        let b = Node::valid_child(&root, disputable(), Hash([0x02; 32]), None);
        assert_eq!(a.hash(), b.hash());

        // The machine handle is not part of the hash.
        let c: Node<TestMachine> = Node::restored(
            a.hash(),
            Some(disputable()),
            Hash([0x02; 32]),
            Hash([0x55; 32]),
            ChildType::Valid,
            Some(root.hash()),
        );
        assert_eq!(c.compute_hash(), a.hash());
    }

    #[test]
    fn test_leaf_set() {
        let mut leaves = LeafSet::default();
        leaves.add(Hash([1; 32]));
        leaves.add(Hash([2; 32]));
        assert!(leaves.contains(&Hash([1; 32])));
        assert_eq!(leaves.len(), 2);

        leaves.delete(&Hash([3; 32]));
        leaves.delete(&Hash([1; 32]));
        assert!(!leaves.contains(&Hash([1; 32])));
        assert_eq!(leaves.len(), 1);
    }

    #[test]
    #[should_panic(expected = "already exists")]
    fn test_duplicate_leaf_is_fatal() {
        let mut leaves = LeafSet::default();
        leaves.add(Hash([1; 32]));
        leaves.add(Hash([1; 32]));
    }
}
