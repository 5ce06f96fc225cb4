//! Core primitives for the veris consensus node.
//!
//! This crate holds the small, dependency-free types that every other layer
//! builds on: hashes, addresses, timestamps, and the nested version record
//! carried by the consensus state.

pub mod primitives;
pub mod version;

pub use primitives::{to_hex, Address, Hash32, Time, ADDRESS_SIZE, HASH_SIZE, MAX_CHAIN_ID_LEN};
pub use version::{ConsensusVersion, StateVersion};
