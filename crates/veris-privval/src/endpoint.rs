//! Framed message transport over a TCP stream.
//!
//! Frames are a u32 little-endian payload length followed by one encoded
//! [`SignerMessage`]; the codec itself lives in `veris-wire`. The endpoint
//! only moves frames and maps socket conditions into typed errors.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use veris_wire::privval::{decode_frame_len, encode_frame, SignerMessage};
use veris_wire::io::WireDecode;
use veris_wire::WireError;

/// Default read timeout for a signer link.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default write timeout for a signer link.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum EndpointError {
    /// The peer closed the connection cleanly.
    Closed,
    Io(std::io::Error),
    Wire(WireError),
}

impl std::fmt::Display for EndpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointError::Closed => write!(f, "signer connection closed"),
            EndpointError::Io(err) => write!(f, "signer connection I/O error: {}", err),
            EndpointError::Wire(err) => write!(f, "signer connection codec error: {}", err),
        }
    }
}

impl std::error::Error for EndpointError {}

impl From<WireError> for EndpointError {
    fn from(err: WireError) -> Self {
        EndpointError::Wire(err)
    }
}

/// One end of a signer link.
pub struct SignerEndpoint {
    stream: TcpStream,
}

impl SignerEndpoint {
    /// Wrap an established stream with the default timeouts.
    pub fn new(stream: TcpStream) -> std::io::Result<Self> {
        stream.set_read_timeout(Some(DEFAULT_READ_TIMEOUT))?;
        stream.set_write_timeout(Some(DEFAULT_WRITE_TIMEOUT))?;
        Ok(SignerEndpoint { stream })
    }

    /// Override the socket timeouts. `None` blocks forever.
    pub fn set_timeouts(
        &self,
        read: Option<Duration>,
        write: Option<Duration>,
    ) -> std::io::Result<()> {
        self.stream.set_read_timeout(read)?;
        self.stream.set_write_timeout(write)
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    /// Read one message, blocking up to the read timeout.
    pub fn read_message(&mut self) -> Result<SignerMessage, EndpointError> {
        let mut prefix = [0u8; 4];
        self.stream.read_exact(&mut prefix).map_err(map_read_err)?;
        let len = decode_frame_len(prefix)?;
        let mut payload = vec![0u8; len];
        self.stream
            .read_exact(&mut payload)
            .map_err(map_read_err)?;
        Ok(SignerMessage::decode_exact(&payload)?)
    }

    /// Write one message.
    pub fn write_message(&mut self, message: &SignerMessage) -> Result<(), EndpointError> {
        let frame = encode_frame(message)?;
        self.stream.write_all(&frame).map_err(EndpointError::Io)?;
        self.stream.flush().map_err(EndpointError::Io)
    }
}

fn map_read_err(err: std::io::Error) -> EndpointError {
    match err.kind() {
        std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset => {
            EndpointError::Closed
        }
        _ => EndpointError::Io(err),
    }
}

impl std::fmt::Debug for SignerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerEndpoint")
            .field("peer", &self.stream.peer_addr().ok())
            .finish()
    }
}
