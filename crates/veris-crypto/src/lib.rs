//! Signing keys and address derivation for the veris consensus node.
//!
//! The consensus layer admits key types through the consensus-parameter
//! whitelist; this crate implements the single admitted suite (ed25519) and
//! the canonical address derivation. Callers hold `PublicKey` values and
//! never touch the backend library directly.

pub mod ed25519;
pub mod error;

pub use ed25519::{hash_bytes, Keypair, PublicKey, ED25519_KEY_TYPE, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};
pub use error::CryptoError;
