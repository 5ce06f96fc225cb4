//! ed25519 keys, signatures, and the canonical address derivation.
//!
//! Public keys are stored as raw bytes and validated at verification time,
//! which keeps them trivially wire-encodable and hashable. Addresses are the
//! first 20 bytes of the SHA3-256 hash of the raw key and are immutable for
//! the life of the key.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha3::{Digest, Sha3_256};

use veris_types::{Address, Hash32, ADDRESS_SIZE};

use crate::error::CryptoError;

/// Key-type string used in the consensus-parameter whitelist.
pub const ED25519_KEY_TYPE: &str = "ed25519";

/// Size in bytes of an ed25519 public key.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size in bytes of an ed25519 signature.
pub const SIGNATURE_SIZE: usize = 64;

/// SHA3-256 of arbitrary bytes. All content hashing in the node goes
/// through this single function.
pub fn hash_bytes(bytes: &[u8]) -> Hash32 {
    let mut hasher = Sha3_256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

// ============================================================================
// PublicKey
// ============================================================================

/// An ed25519 public key.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey {
    bytes: [u8; PUBLIC_KEY_SIZE],
}

impl PublicKey {
    /// Wrap raw key bytes. Point validity is checked lazily on verify.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; PUBLIC_KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(PublicKey { bytes })
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.bytes
    }

    /// The key-type string this key matches in the whitelist.
    pub fn type_name(&self) -> &'static str {
        ED25519_KEY_TYPE
    }

    /// The canonical address: first 20 bytes of SHA3-256 of the raw key.
    pub fn address(&self) -> Address {
        let digest = hash_bytes(&self.bytes);
        let mut addr = [0u8; ADDRESS_SIZE];
        addr.copy_from_slice(&digest[..ADDRESS_SIZE]);
        addr
    }

    /// Verify `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let vk =
            VerifyingKey::from_bytes(&self.bytes).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig_bytes: [u8; SIGNATURE_SIZE] = signature
            .try_into()
            .map_err(|_| CryptoError::InvalidSignature)?;
        let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
        vk.verify_strict(message, &sig)
            .map_err(|_| CryptoError::VerificationFailed)
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", veris_types::to_hex(&self.bytes))
    }
}

// ============================================================================
// Keypair
// ============================================================================

/// An ed25519 signing keypair.
///
/// The secret half never leaves this struct; callers get signatures and the
/// public key only.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from the OS entropy source.
    pub fn generate() -> Self {
        Keypair {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Rebuild a keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, CryptoError> {
        let seed: [u8; 32] = seed.try_into().map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Keypair {
            signing: SigningKey::from_bytes(&seed),
        })
    }

    /// The 32-byte seed, for keystore persistence.
    pub fn seed(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    /// The public half.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            bytes: self.signing.verifying_key().to_bytes(),
        }
    }

    /// Sign `message`, returning the 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing.sign(message).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key())
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let kp = Keypair::generate();
        let msg = b"consensus is hard";
        let sig = kp.sign(msg);
        assert_eq!(sig.len(), SIGNATURE_SIZE);
        kp.public_key().verify(msg, &sig).expect("valid signature");
    }

    #[test]
    fn verify_rejects_tampered_message() {
        let kp = Keypair::generate();
        let sig = kp.sign(b"original");
        assert_eq!(
            kp.public_key().verify(b"tampered", &sig),
            Err(CryptoError::VerificationFailed)
        );
    }

    #[test]
    fn verify_rejects_wrong_sized_signature() {
        let kp = Keypair::generate();
        assert_eq!(
            kp.public_key().verify(b"msg", &[0u8; 10]),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn address_is_stable_and_key_derived() {
        let kp = Keypair::generate();
        let pk = kp.public_key();
        assert_eq!(pk.address(), pk.address());
        assert_eq!(pk.address().len(), ADDRESS_SIZE);

        let other = Keypair::generate();
        assert_ne!(pk.address(), other.public_key().address());
    }

    #[test]
    fn seed_roundtrip_preserves_key() {
        let kp = Keypair::generate();
        let restored = Keypair::from_seed(&kp.seed()).expect("seed roundtrip");
        assert_eq!(kp.public_key(), restored.public_key());
    }
}
