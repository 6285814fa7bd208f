//! Scripted probe and gateway for exercising the engine without a backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use super::gateway::{MutationReply, RemoteGateway};
use super::probe::{Connectivity, ConnectivityProbe};
use super::GatewayError;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Probe that returns a fixed, switchable verdict and counts its calls.
pub struct ScriptedProbe {
    verdict: Mutex<Connectivity>,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(verdict: Connectivity) -> Self {
        Self {
            verdict: Mutex::new(verdict),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn online() -> Self {
        Self::new(Connectivity::Online)
    }

    pub fn offline() -> Self {
        Self::new(Connectivity::Offline)
    }

    pub fn set(&self, verdict: Connectivity) {
        *guard(&self.verdict) = verdict;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ConnectivityProbe for ScriptedProbe {
    async fn probe(&self) -> Connectivity {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *guard(&self.verdict)
    }
}

/// One call received by the scripted gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: String,
    pub variables: Value,
}

/// Gateway answering from per-operation scripts and recording every call.
///
/// Unscripted queries fail as a remote error; unscripted mutations use the
/// default reply, which accepts.
pub struct ScriptedGateway {
    queries: Mutex<HashMap<String, Result<Value, GatewayError>>>,
    mutations: Mutex<HashMap<String, Result<MutationReply, GatewayError>>>,
    default_mutation: Mutex<Result<MutationReply, GatewayError>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            queries: Mutex::new(HashMap::new()),
            mutations: Mutex::new(HashMap::new()),
            default_mutation: Mutex::new(Ok(MutationReply::accepted("ok"))),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_query(self, operation: &str, result: Result<Value, GatewayError>) -> Self {
        self.set_query(operation, result);
        self
    }

    pub fn with_mutation(self, operation: &str, result: Result<MutationReply, GatewayError>) -> Self {
        self.set_mutation(operation, result);
        self
    }

    pub fn with_default_mutation(self, result: Result<MutationReply, GatewayError>) -> Self {
        *guard(&self.default_mutation) = result;
        self
    }

    pub fn set_query(&self, operation: &str, result: Result<Value, GatewayError>) {
        guard(&self.queries).insert(operation.to_string(), result);
    }

    pub fn set_mutation(&self, operation: &str, result: Result<MutationReply, GatewayError>) {
        guard(&self.mutations).insert(operation.to_string(), result);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        guard(&self.calls).clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        guard(&self.calls)
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    fn record(&self, operation: &str, variables: Value) {
        guard(&self.calls).push(RecordedCall {
            operation: operation.to_string(),
            variables,
        });
    }
}

impl RemoteGateway for ScriptedGateway {
    async fn query(&self, operation: &str, variables: Value) -> Result<Value, GatewayError> {
        self.record(operation, variables);
        let scripted = guard(&self.queries).get(operation).cloned();
        scripted.unwrap_or_else(|| {
            Err(GatewayError::Remote(format!("no scripted response for {operation}")))
        })
    }

    async fn mutate(&self, operation: &str, variables: Value) -> Result<MutationReply, GatewayError> {
        self.record(operation, variables);
        let scripted = guard(&self.mutations).get(operation).cloned();
        scripted.unwrap_or_else(|| guard(&self.default_mutation).clone())
    }
}
