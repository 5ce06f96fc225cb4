/// Errors from key handling and signature operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Public key bytes are the wrong size or not a valid curve point.
    InvalidPublicKey,
    /// Signature bytes are the wrong size.
    InvalidSignature,
    /// The signature does not verify against the key and message.
    VerificationFailed,
    /// The signing operation itself failed.
    SigningFailed,
}

impl std::fmt::Display for CryptoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CryptoError::InvalidPublicKey => write!(f, "invalid public key"),
            CryptoError::InvalidSignature => write!(f, "invalid signature"),
            CryptoError::VerificationFailed => write!(f, "signature verification failed"),
            CryptoError::SigningFailed => write!(f, "signing failed"),
        }
    }
}

impl std::error::Error for CryptoError {}
