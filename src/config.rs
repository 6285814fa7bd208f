use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Agenda";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Value the probe operation returns when the remote is usable.
pub const DEFAULT_ONLINE_TOKEN: &str = "online";
/// Remote operation queried by the connectivity probe.
pub const DEFAULT_PROBE_OPERATION: &str = "estadoServicio";
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4000/graphql";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Environment variable holding the bearer token for remote calls.
pub const TOKEN_ENV_VAR: &str = "AGENDA_TOKEN";

const ENDPOINT_VAR: &str = "AGENDA_ENDPOINT";
const PROBE_OPERATION_VAR: &str = "AGENDA_PROBE_OPERATION";
const ONLINE_TOKEN_VAR: &str = "AGENDA_ONLINE_TOKEN";
const TIMEOUT_VAR: &str = "AGENDA_TIMEOUT_SECS";
const DB_PATH_VAR: &str = "AGENDA_DB_PATH";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "agenda_lib=info,warn"
}

/// Get the application data directory
/// ~/Agenda/, or ./Agenda when no home directory can be determined
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Get the default replica database path
pub fn replica_db_path() -> PathBuf {
    app_data_dir().join("replica.db")
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },

    #[error("{var} must not be empty")]
    Empty { var: String },
}

/// Settings for the sync engine. Defaults work against a local backend;
/// `from_env` lets a deployment point it elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub endpoint: String,
    pub probe_operation: String,
    pub online_token: String,
    pub timeout_secs: u64,
    pub db_path: PathBuf,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            probe_operation: DEFAULT_PROBE_OPERATION.to_string(),
            online_token: DEFAULT_ONLINE_TOKEN.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            db_path: replica_db_path(),
        }
    }
}

impl SyncConfig {
    /// Defaults overlaid with the `AGENDA_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(|var| std::env::var(var).ok())
    }

    /// Overlay values from `lookup` on top of `self`. Unset variables keep
    /// the current value; set-but-blank ones are rejected.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |var: &str| -> Result<Option<String>, ConfigError> {
            match lookup(var) {
                None => Ok(None),
                Some(value) if value.trim().is_empty() => Err(ConfigError::Empty {
                    var: var.to_string(),
                }),
                Some(value) => Ok(Some(value.trim().to_string())),
            }
        };

        if let Some(endpoint) = read(ENDPOINT_VAR)? {
            self.endpoint = endpoint;
        }
        if let Some(operation) = read(PROBE_OPERATION_VAR)? {
            self.probe_operation = operation;
        }
        if let Some(token) = read(ONLINE_TOKEN_VAR)? {
            self.online_token = token;
        }
        if let Some(timeout) = read(TIMEOUT_VAR)? {
            self.timeout_secs = match timeout.parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: TIMEOUT_VAR.to_string(),
                        value: timeout,
                    })
                }
            };
        }
        if let Some(path) = read(DB_PATH_VAR)? {
            self.db_path = PathBuf::from(path);
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("Agenda"));
    }

    #[test]
    fn replica_db_under_app_data() {
        let db = replica_db_path();
        assert!(db.starts_with(app_data_dir()));
        assert!(db.ends_with("replica.db"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn defaults_point_at_local_backend() {
        let config = SyncConfig::default();
        assert_eq!(config.online_token, "online");
        assert_eq!(config.probe_operation, "estadoServicio");
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn overlay_replaces_set_values_only() {
        let config = SyncConfig::default()
            .overlay(lookup(&[
                ("AGENDA_ENDPOINT", "https://agenda.example.org/graphql"),
                ("AGENDA_TIMEOUT_SECS", " 12 "),
                ("AGENDA_DB_PATH", "/tmp/agenda.db"),
            ]))
            .unwrap();
        assert_eq!(config.endpoint, "https://agenda.example.org/graphql");
        assert_eq!(config.timeout_secs, 12);
        assert_eq!(config.db_path, PathBuf::from("/tmp/agenda.db"));
        assert_eq!(config.online_token, DEFAULT_ONLINE_TOKEN);
    }

    #[test]
    fn bad_timeout_is_rejected() {
        for bad in ["soon", "0", "-3"] {
            let err = SyncConfig::default()
                .overlay(lookup(&[("AGENDA_TIMEOUT_SECS", bad)]))
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }));
        }
    }

    #[test]
    fn blank_value_is_rejected() {
        let err = SyncConfig::default()
            .overlay(lookup(&[("AGENDA_ONLINE_TOKEN", "  ")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Empty {
                var: "AGENDA_ONLINE_TOKEN".into()
            }
        );
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"endpoint": "http://remote/graphql", "timeout_secs": 5}"#).unwrap();
        assert_eq!(config.endpoint, "http://remote/graphql");
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.probe_operation, DEFAULT_PROBE_OPERATION);
    }
}
