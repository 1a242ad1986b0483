use std::time::Duration;
use thiserror::Error;

/// Typed error hierarchy for the relay.
///
/// Used at the connection-supervisor boundary. Leaf functions stay on
/// `anyhow::Result` — the `Internal` variant converts via `?`.
///
/// Per-message failures (`Decode`, `Translation`) are handled inside the
/// receive loop and never escalate to connection-level failure. A registry
/// miss is not an error at all.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("connection closed by remote")]
    ConnectionClosed,

    #[error("frame decode failed: {0}")]
    Decode(String),

    #[error("translation failed: {0}")]
    Translation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RelayError {
    /// Delay before the supervisor re-enters Connecting after this failure.
    ///
    /// Transport-level loss gets the short delay; anything unexpected
    /// (auth exhaustion, handshake errors, internal faults) waits longer.
    pub fn reconnect_delay(&self) -> Duration {
        match self {
            Self::ConnectionClosed => Duration::from_secs(5),
            _ => Duration::from_secs(10),
        }
    }

    /// Whether this failure ends the current connection attempt.
    pub fn is_fatal_to_connection(&self) -> bool {
        !matches!(self, Self::Decode(_) | Self::Translation(_))
    }
}
