use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::credentials::CredentialSource;
use super::GatewayError;
use crate::models::{Envelope, Outcome};

/// Executes queries and mutations against the authoritative backend.
///
/// Transport failures come back as `GatewayError`; a reachable remote that
/// declines a mutation comes back as `Ok` with an `exitoso = 'N'` envelope.
pub trait RemoteGateway: Send + Sync {
    fn query(
        &self,
        operation: &str,
        variables: Value,
    ) -> impl Future<Output = Result<Value, GatewayError>> + Send;

    fn mutate(
        &self,
        operation: &str,
        variables: Value,
    ) -> impl Future<Output = Result<MutationReply, GatewayError>> + Send;
}

/// Result of a mutation the remote processed: its envelope plus, when the
/// remote echoes it, the accepted record.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationReply {
    pub envelope: Envelope,
    pub record: Option<Value>,
}

impl MutationReply {
    pub fn accepted(mensaje: &str) -> Self {
        Self {
            envelope: Envelope::success(mensaje),
            record: None,
        }
    }

    pub fn rejected(mensaje: &str) -> Self {
        Self {
            envelope: Envelope::failure(mensaje),
            record: None,
        }
    }
}

/// Request body posted to the single remote endpoint.
#[derive(Serialize)]
struct RemoteRequest<'a> {
    operation: &'a str,
    variables: &'a Value,
}

/// Response body from the remote endpoint.
#[derive(Deserialize)]
struct RemoteResponse {
    data: Option<Map<String, Value>>,
    #[serde(default)]
    errors: Vec<RemoteErrorItem>,
}

#[derive(Deserialize)]
struct RemoteErrorItem {
    message: String,
}

/// Mutation value inside `data.<operation>`.
#[derive(Deserialize)]
struct MutationValue {
    exitoso: Outcome,
    mensaje: Option<String>,
    registro: Option<Value>,
}

/// HTTP client for the remote service.
pub struct HttpGateway<C> {
    endpoint: String,
    client: reqwest::Client,
    timeout_secs: u64,
    credentials: C,
}

impl<C: CredentialSource> HttpGateway<C> {
    pub fn new(endpoint: &str, timeout_secs: u64, credentials: C) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| GatewayError::HttpClient(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
            credentials,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify(&self, err: reqwest::Error) -> GatewayError {
        if err.is_connect() {
            GatewayError::Connection(self.endpoint.clone())
        } else if err.is_timeout() {
            GatewayError::Timeout(self.timeout_secs)
        } else {
            GatewayError::HttpClient(err.to_string())
        }
    }

    /// Post one operation and return the value under `data.<operation>`.
    async fn execute(&self, operation: &str, variables: &Value) -> Result<Value, GatewayError> {
        let body = RemoteRequest {
            operation,
            variables,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = self.credentials.credential() {
            request = request.bearer_auth(token.as_str());
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RemoteResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        if !parsed.errors.is_empty() {
            let messages: Vec<String> = parsed.errors.into_iter().map(|e| e.message).collect();
            return Err(GatewayError::Remote(messages.join("; ")));
        }

        parsed
            .data
            .and_then(|mut data| data.remove(operation))
            .ok_or_else(|| GatewayError::Malformed(format!("response has no data.{operation}")))
    }
}

impl<C: CredentialSource> RemoteGateway for HttpGateway<C> {
    async fn query(&self, operation: &str, variables: Value) -> Result<Value, GatewayError> {
        tracing::debug!(operation, "remote query");
        self.execute(operation, &variables).await
    }

    async fn mutate(&self, operation: &str, variables: Value) -> Result<MutationReply, GatewayError> {
        tracing::debug!(operation, "remote mutation");
        let value = self.execute(operation, &variables).await?;
        let parsed: MutationValue = serde_json::from_value(value)
            .map_err(|e| GatewayError::Malformed(format!("{operation}: {e}")))?;

        Ok(MutationReply {
            envelope: Envelope {
                exitoso: parsed.exitoso,
                mensaje: parsed.mensaje.unwrap_or_default(),
            },
            record: parsed.registro,
        })
    }
}
