use thiserror::Error;

/// Top-level error type for the `icbridge-api` crate.
///
/// Covers every failure mode of the wire layer: connecting, the login
/// handshake, framing, and envelope encoding/decoding.
/// `icbridge-core` maps these into engine-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection ──────────────────────────────────────────────────
    /// TCP connect failed (refused, unreachable, DNS failure, ...).
    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Connect or login did not complete within the configured timeout.
    #[error("Timed out after {timeout_ms}ms while {during}")]
    Timeout { timeout_ms: u64, during: &'static str },

    /// Controller rejected the supplied credentials.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Socket read/write failure on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the connection.
    #[error("Connection closed by controller")]
    Closed,

    /// A send was attempted while no connection is established.
    #[error("Not connected")]
    NotConnected,

    // ── Framing ─────────────────────────────────────────────────────
    /// Pending bytes grew past the configured limit without a newline.
    #[error("Frame buffer exceeded {limit} bytes without a line terminator")]
    FrameOverflow { limit: usize },

    // ── Envelope ────────────────────────────────────────────────────
    /// Outbound request could not be serialized.
    #[error("Failed to encode request: {0}")]
    Encode(#[source] serde_json::Error),

    /// Inbound line is not a valid message envelope.
    #[error("Failed to decode line: {message}")]
    Decode { message: String, line: String },
}

impl Error {
    /// Returns `true` if this error is worth retrying after a delay.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Timeout { .. } | Self::Io(_) | Self::Closed
        )
    }

    /// Returns `true` if the controller rejected the credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}
