//! The `/bootstrap/1.0.0` stream protocol.
//!
//! Clients open a stream to a bootstrap node to announce themselves.
//! The bootstrap node logs the stream together with its current peer
//! count and closes it without answering, so a [`BootstrapReply`] is
//! never actually sent. Both message types travel through the CBOR
//! codec from `libp2p-request-response` (feature `cbor`).

use libp2p::StreamProtocol;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Protocol identifier for the bootstrap handshake stream.
pub const BOOTSTRAP_PROTOCOL: StreamProtocol = StreamProtocol::new("/bootstrap/1.0.0");

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Greeting written by the client when it opens a bootstrap stream.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BootstrapHello {
    /// Free-form agent string, e.g. `quotenet/0.1.0`.
    pub agent: String,
}

impl BootstrapHello {
    pub fn new() -> Self {
        Self {
            agent: format!("quotenet/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Response type of the protocol. Bootstrap nodes close the stream
/// instead of replying.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BootstrapReply;
