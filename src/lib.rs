//! Rollup validator core.
//!
//! An in-memory mirror of an optimistic rollup's on-chain dispute
//! protocol: the tree of assertion nodes rooted at the latest confirmed
//! node, the stakers bonded to positions on it, and the challenges
//! between them. An external driver feeds the core already-ordered
//! on-chain events through the [`chain::Chain`] mutators; the whole
//! state round-trips through CBOR checkpoints.
//!
//! Node identifiers are Keccak-256 hashes computed exactly the way the
//! on-chain rollup contract computes them, so they can be used as
//! references both locally and on-chain.

#[macro_use]
extern crate slog;

#[macro_use]
pub mod common;
pub mod chain;

// Re-exports.
pub use self::chain::{machine::Machine, Chain};
