// ── Core error types ──
//
// What callers of the engine see. Transport failures from icbridge-api are
// folded into connection-level variants; consumers never match on raw I/O
// or JSON errors.

use icbridge_api::Error as ApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to controller at {addr}: {reason}")]
    ConnectionFailed { addr: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Controller connection timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Controller disconnected")]
    ControllerDisconnected,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Unknown object: {id}")]
    UnknownObject { id: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Worth retrying once the connection recovers.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::ControllerDisconnected
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ApiError> for CoreError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Connect { addr, source } => Self::ConnectionFailed {
                addr,
                reason: source.to_string(),
            },
            ApiError::Timeout { timeout_ms, .. } => Self::Timeout { timeout_ms },
            ApiError::Authentication { message } => Self::AuthenticationFailed { message },
            ApiError::Io(e) => Self::ConnectionFailed {
                addr: String::new(),
                reason: e.to_string(),
            },
            ApiError::Closed | ApiError::NotConnected => Self::ControllerDisconnected,
            ApiError::FrameOverflow { limit } => {
                Self::Internal(format!("frame exceeded {limit} bytes"))
            }
            ApiError::Encode(e) => Self::Internal(format!("failed to encode request: {e}")),
            ApiError::Decode { message, .. } => {
                Self::Internal(format!("failed to decode message: {message}"))
            }
        }
    }
}
