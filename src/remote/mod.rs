//! Remote side of the engine: credential source, gateway and connectivity probe.

pub mod credentials;
pub mod gateway;
pub mod mock;
pub mod probe;

pub use credentials::*;
pub use gateway::*;
pub use probe::*;

use thiserror::Error;

use crate::models::Envelope;

/// Transport-level failure talking to the remote service.
///
/// Kept separate from business rejections (`exitoso = 'N'` envelopes) so the
/// orchestrator can decide on the offline fallback; converts into the same
/// envelope shape when it has to be reported.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Remote service unreachable at {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Remote returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Malformed remote response: {0}")]
    Malformed(String),

    #[error("Remote reported errors: {0}")]
    Remote(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl GatewayError {
    /// True when the remote could not be reached or failed as a whole, as
    /// opposed to answering this particular request with an error.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) | Self::HttpClient(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Malformed(_) | Self::Remote(_) => false,
        }
    }
}

impl From<GatewayError> for Envelope {
    fn from(err: GatewayError) -> Self {
        Envelope::failure(err.to_string())
    }
}
