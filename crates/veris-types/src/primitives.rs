//! Hashes, addresses, and timestamps.

/// Size in bytes of all content hashes.
pub const HASH_SIZE: usize = 32;

/// Size in bytes of a validator address.
pub const ADDRESS_SIZE: usize = 20;

/// Maximum length in bytes of a chain id string.
///
/// Chain ids are opaque text, fixed for the life of a chain. The bound only
/// exists so wire decoding of hostile input stays cheap.
pub const MAX_CHAIN_ID_LEN: usize = 50;

/// A 32-byte content hash (SHA3-256 throughout the codebase).
pub type Hash32 = [u8; HASH_SIZE];

/// A validator address: the first 20 bytes of the SHA3-256 hash of the
/// validator's public key. Derivation lives in `veris-crypto`.
pub type Address = [u8; ADDRESS_SIZE];

/// Render bytes as lowercase hex for log lines and error messages.
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

// ============================================================================
// Time
// ============================================================================

/// A point in time, as nanoseconds since the Unix epoch.
///
/// Block times and commit-signature times are carried as plain nanosecond
/// counts so they are trivially comparable and wire-encodable. Negative
/// values are representable (pre-epoch) but never produced by this codebase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(i64);

impl Time {
    /// Create a `Time` from raw nanoseconds since the Unix epoch.
    pub const fn from_unix_nanos(nanos: i64) -> Self {
        Time(nanos)
    }

    /// Create a `Time` from whole seconds since the Unix epoch.
    pub const fn from_unix_secs(secs: i64) -> Self {
        Time(secs * 1_000_000_000)
    }

    /// Raw nanoseconds since the Unix epoch.
    pub const fn as_unix_nanos(&self) -> i64 {
        self.0
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => Time(d.as_nanos() as i64),
            // Clock before the epoch: saturate at zero rather than panic.
            Err(_) => Time(0),
        }
    }
}

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_conversions() {
        let t = Time::from_unix_secs(3);
        assert_eq!(t.as_unix_nanos(), 3_000_000_000);
        assert!(Time::from_unix_nanos(1) < Time::from_unix_nanos(2));
    }

    #[test]
    fn hex_rendering() {
        assert_eq!(to_hex(&[0x00, 0xab, 0xff]), "00abff");
        assert_eq!(to_hex(&[]), "");
    }
}
