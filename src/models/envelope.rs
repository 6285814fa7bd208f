use serde::{Deserialize, Serialize};

use super::enums::Outcome;

/// Message returned when a write was accepted by the local replica only.
pub const SAVED_LOCALLY: &str = "saved locally, pending sync";

/// Message returned when the remote looked reachable but the call failed in
/// transit, so the write fell back to the local replica.
pub const TECHNICAL_ERROR_SAVED_LOCALLY: &str =
    "technical error reaching the server; saved locally, pending sync";

/// Uniform `{exitoso, mensaje}` result of every write, remote or local.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub exitoso: Outcome,
    #[serde(default)]
    pub mensaje: String,
}

impl Envelope {
    pub fn success(mensaje: impl Into<String>) -> Self {
        Self {
            exitoso: Outcome::Success,
            mensaje: mensaje.into(),
        }
    }

    pub fn failure(mensaje: impl Into<String>) -> Self {
        Self {
            exitoso: Outcome::Failure,
            mensaje: mensaje.into(),
        }
    }

    pub fn saved_locally() -> Self {
        Self::success(SAVED_LOCALLY)
    }

    pub fn technical_fallback() -> Self {
        Self::success(TECHNICAL_ERROR_SAVED_LOCALLY)
    }

    pub fn is_success(&self) -> bool {
        self.exitoso == Outcome::Success
    }
}
