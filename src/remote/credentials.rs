use zeroize::Zeroizing;

/// Opaque source of the authorization credential attached to remote calls.
/// Read on every request so a refreshed session is picked up immediately.
pub trait CredentialSource: Send + Sync {
    fn credential(&self) -> Option<Zeroizing<String>>;
}

/// No credential: requests go out without an `Authorization` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredential;

impl CredentialSource for NoCredential {
    fn credential(&self) -> Option<Zeroizing<String>> {
        None
    }
}

/// Fixed bearer token, wiped from memory on drop.
pub struct StaticCredential {
    token: Zeroizing<String>,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Zeroizing::new(token.into()),
        }
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredential").field("token", &"<redacted>").finish()
    }
}

impl CredentialSource for StaticCredential {
    fn credential(&self) -> Option<Zeroizing<String>> {
        if self.token.is_empty() {
            None
        } else {
            Some(self.token.clone())
        }
    }
}

/// Token read from an environment variable at request time. An unset or
/// blank variable means no credential.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialSource for EnvCredential {
    fn credential(&self) -> Option<Zeroizing<String>> {
        std::env::var(&self.var)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(Zeroizing::new)
    }
}
