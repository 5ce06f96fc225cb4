//! The per-connection serving loop of the remote signer.

use std::sync::Arc;

use crate::endpoint::{EndpointError, SignerEndpoint};
use crate::handler::{handle_signer_request, HandlerError};
use crate::PrivValidator;

#[derive(Debug)]
pub enum ServeError {
    Endpoint(EndpointError),
    Handler(HandlerError),
}

impl std::fmt::Display for ServeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServeError::Endpoint(err) => write!(f, "{}", err),
            ServeError::Handler(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ServeError {}

/// Serves one bound chain id and one signer over framed connections.
///
/// One dispatch runs at a time per connection; multiple connections each
/// get their own loop and share the signer by reference (the signer's own
/// watermark lock serializes actual signing).
pub struct SignerServer {
    chain_id: String,
    signer: Arc<dyn PrivValidator>,
}

impl SignerServer {
    pub fn new(chain_id: impl Into<String>, signer: Arc<dyn PrivValidator>) -> Self {
        SignerServer {
            chain_id: chain_id.into(),
            signer,
        }
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// Pull requests and push responses until the peer hangs up or a
    /// dispatch-level error ends the session.
    ///
    /// A clean peer close returns `Ok`. A chain-id mismatch answers the
    /// client with the error-payload response, then returns the handler
    /// error so the caller drops the connection.
    pub fn serve_connection(&self, endpoint: &mut SignerEndpoint) -> Result<(), ServeError> {
        loop {
            let request = match endpoint.read_message() {
                Ok(request) => request,
                Err(EndpointError::Closed) => return Ok(()),
                Err(err) => return Err(ServeError::Endpoint(err)),
            };

            match handle_signer_request(self.signer.as_ref(), request, &self.chain_id) {
                Ok(response) => endpoint
                    .write_message(&response)
                    .map_err(ServeError::Endpoint)?,
                Err(err) => {
                    if let HandlerError::ChainIdMismatch { response, .. } = &err {
                        // Answer before hanging up; the client learns why.
                        let _ = endpoint.write_message(response);
                    }
                    eprintln!("[WARN] dropping signer connection: {}", err);
                    return Err(ServeError::Handler(err));
                }
            }
        }
    }
}

impl std::fmt::Debug for SignerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerServer")
            .field("chain_id", &self.chain_id)
            .finish_non_exhaustive()
    }
}
