use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};

use super::gateway::RemoteGateway;
use super::GatewayError;

/// Point-in-time verdict of a connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Cheap reachability check run before every remote operation.
///
/// No retries, no caching: each call is one fresh remote round trip, and the
/// verdict may already be stale when the caller acts on it.
pub trait ConnectivityProbe: Send + Sync {
    fn probe(&self) -> impl Future<Output = Connectivity> + Send;
}

/// Online only when the signal is exactly the expected token; any other
/// value, and any error, reads as offline.
pub fn interpret_signal(signal: &Result<Value, GatewayError>, online_token: &str) -> Connectivity {
    match signal {
        Ok(Value::String(token)) if token == online_token => Connectivity::Online,
        _ => Connectivity::Offline,
    }
}

/// Probe that queries a dedicated remote operation through the gateway.
pub struct RemoteProbe<G> {
    gateway: Arc<G>,
    operation: String,
    online_token: String,
}

impl<G> Clone for RemoteProbe<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            operation: self.operation.clone(),
            online_token: self.online_token.clone(),
        }
    }
}

impl<G: RemoteGateway> RemoteProbe<G> {
    pub fn new(gateway: Arc<G>, operation: &str, online_token: &str) -> Self {
        Self {
            gateway,
            operation: operation.to_string(),
            online_token: online_token.to_string(),
        }
    }
}

impl<G: RemoteGateway> ConnectivityProbe for RemoteProbe<G> {
    async fn probe(&self) -> Connectivity {
        let signal = self.gateway.query(&self.operation, json!({})).await;
        let verdict = interpret_signal(&signal, &self.online_token);
        match &signal {
            Err(e) => tracing::debug!(error = %e, "probe: remote unreachable"),
            Ok(value) if !verdict.is_online() => {
                tracing::debug!(%value, "probe: unexpected signal, treating as offline")
            }
            Ok(_) => {}
        }
        verdict
    }
}
