use veris_crypto::CryptoError;

/// Errors from a signer implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// Signing would regress the persisted high watermark.
    DoubleSign { height: u64, round: u32, step: u8 },
    /// A re-sign at the watermark carried different bytes than the
    /// original signature covered.
    ConflictingData { height: u64, round: u32, step: u8 },
    /// The underlying key operation failed.
    Crypto(CryptoError),
    /// Reading or writing signer state, or the signer link, failed.
    Io(String),
    /// The remote signer answered with an in-band error payload.
    Remote(String),
    /// The remote signer answered with the wrong message variant.
    UnexpectedResponse(&'static str),
}

impl std::fmt::Display for SignerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignerError::DoubleSign {
                height,
                round,
                step,
            } => write!(
                f,
                "refusing to double sign at height {} round {} step {}",
                height, round, step
            ),
            SignerError::ConflictingData {
                height,
                round,
                step,
            } => write!(
                f,
                "conflicting data at height {} round {} step {}",
                height, round, step
            ),
            SignerError::Crypto(err) => write!(f, "crypto error: {}", err),
            SignerError::Io(msg) => write!(f, "signer I/O error: {}", msg),
            SignerError::Remote(msg) => write!(f, "remote signer error: {}", msg),
            SignerError::UnexpectedResponse(kind) => {
                write!(f, "unexpected response from remote signer: {}", kind)
            }
        }
    }
}

impl std::error::Error for SignerError {}

impl From<CryptoError> for SignerError {
    fn from(err: CryptoError) -> Self {
        SignerError::Crypto(err)
    }
}
