//! Wire structures and codecs for the veris consensus node.
//!
//! Everything that crosses a process boundary or lands on disk is encoded
//! with the hand-rolled little-endian codec in [`io`]: block structures,
//! votes and proposals, and the remote-signer message union. There is no
//! reflection and no schema compiler; each layout is written out explicitly
//! and documented next to its type, and changing one is a breaking protocol
//! change.

pub mod block;
pub mod consensus;
pub mod error;
pub mod io;
pub mod privval;

pub use error::WireError;
