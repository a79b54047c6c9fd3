//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::infrastructure::grpc::AdminServiceConfig;
use crate::infrastructure::registry::HubConfig;

/// Inline ACL document.
const ACL_ENV: &str = "GATEWAY_ACL";
/// Path to an ACL document.
const ACL_FILE_ENV: &str = "GATEWAY_ACL_FILE";

/// Where the ACL document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclSource {
    /// JSON text given directly.
    Inline(String),
    /// JSON file on disk.
    File(PathBuf),
}

impl AclSource {
    /// Read the ACL document text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::AclFile` if the file cannot be read.
    pub fn read(&self) -> Result<String, ConfigError> {
        match self {
            Self::Inline(text) => Ok(text.clone()),
            Self::File(path) => {
                std::fs::read_to_string(path).map_err(|source| ConfigError::AclFile {
                    path: path.clone(),
                    source,
                })
            }
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// gRPC listen address.
    pub listen_addr: SocketAddr,
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8082)),
            health_port: 8083,
        }
    }
}

/// Admin subscriber buffer settings.
#[derive(Debug, Clone, Copy)]
pub struct SubscriberSettings {
    /// Events buffered per subscriber before new ones are dropped.
    pub event_buffer: usize,
    /// Outbound messages buffered per streaming client.
    pub stream_buffer: usize,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            event_buffer: 1_024,
            stream_buffer: 256,
        }
    }
}

impl From<SubscriberSettings> for HubConfig {
    fn from(settings: SubscriberSettings) -> Self {
        Self {
            log_capacity: settings.event_buffer,
            stat_capacity: settings.event_buffer,
        }
    }
}

impl From<SubscriberSettings> for AdminServiceConfig {
    fn from(settings: SubscriberSettings) -> Self {
        Self {
            stream_buffer: settings.stream_buffer,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// ACL document source.
    pub acl: AclSource,
    /// Listener settings.
    pub server: ServerSettings,
    /// Subscriber buffer settings.
    pub subscribers: SubscriberSettings,
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if no ACL is configured or a value cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if no ACL is configured or a value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let acl = match (lookup(ACL_ENV), lookup(ACL_FILE_ENV)) {
            (Some(text), _) if !text.trim().is_empty() => AclSource::Inline(text),
            (_, Some(path)) if !path.trim().is_empty() => AclSource::File(PathBuf::from(path)),
            (Some(_), _) => return Err(ConfigError::EmptyValue(ACL_ENV.to_string())),
            (None, Some(_)) => return Err(ConfigError::EmptyValue(ACL_FILE_ENV.to_string())),
            (None, None) => {
                return Err(ConfigError::MissingEnvVar(format!(
                    "{ACL_ENV} or {ACL_FILE_ENV}"
                )));
            }
        };

        let defaults = ServerSettings::default();
        let server = ServerSettings {
            listen_addr: parse_or(&lookup, "GATEWAY_LISTEN_ADDR", defaults.listen_addr)?,
            health_port: parse_or(&lookup, "GATEWAY_HEALTH_PORT", defaults.health_port)?,
        };

        let defaults = SubscriberSettings::default();
        let subscribers = SubscriberSettings {
            event_buffer: parse_or(&lookup, "GATEWAY_SUBSCRIBER_BUFFER", defaults.event_buffer)?,
            stream_buffer: parse_or(&lookup, "GATEWAY_STREAM_BUFFER", defaults.stream_buffer)?,
        };

        if subscribers.event_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "GATEWAY_SUBSCRIBER_BUFFER".to_string(),
                value: "0".to_string(),
            });
        }
        if subscribers.stream_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                key: "GATEWAY_STREAM_BUFFER".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            acl,
            server,
            subscribers,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
    /// ACL file could not be read.
    #[error("failed to read ACL file {path}: {source}")]
    AclFile {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_with_inline_acl() {
        let config = GatewayConfig::from_lookup(lookup(&[(ACL_ENV, "{}")])).unwrap();
        assert_eq!(config.acl, AclSource::Inline("{}".to_string()));
        assert_eq!(config.server.listen_addr.to_string(), "127.0.0.1:8082");
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.subscribers.event_buffer, 1_024);
        assert_eq!(config.subscribers.stream_buffer, 256);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = GatewayConfig::from_lookup(lookup(&[
            (ACL_ENV, "{}"),
            ("GATEWAY_LISTEN_ADDR", "0.0.0.0:9000"),
            ("GATEWAY_HEALTH_PORT", "0"),
            ("GATEWAY_SUBSCRIBER_BUFFER", "16"),
            ("GATEWAY_STREAM_BUFFER", "8"),
        ]))
        .unwrap();

        assert_eq!(config.server.listen_addr.port(), 9000);
        assert_eq!(config.server.health_port, 0);
        assert_eq!(HubConfig::from(config.subscribers).log_capacity, 16);
        assert_eq!(AdminServiceConfig::from(config.subscribers).stream_buffer, 8);
    }

    #[test]
    fn missing_acl_is_an_error() {
        let err = GatewayConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn empty_acl_is_an_error() {
        let err = GatewayConfig::from_lookup(lookup(&[(ACL_ENV, "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));
    }

    #[test]
    fn invalid_listen_addr_is_an_error() {
        let err = GatewayConfig::from_lookup(lookup(&[
            (ACL_ENV, "{}"),
            ("GATEWAY_LISTEN_ADDR", "not-an-address"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn zero_buffer_is_an_error() {
        let err = GatewayConfig::from_lookup(lookup(&[
            (ACL_ENV, "{}"),
            ("GATEWAY_SUBSCRIBER_BUFFER", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn acl_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"alice": ["/Biz/Check"]}}"#).unwrap();

        let path = file.path().to_string_lossy().into_owned();
        let config = GatewayConfig::from_lookup(lookup(&[(ACL_FILE_ENV, &path)])).unwrap();

        assert_eq!(config.acl, AclSource::File(PathBuf::from(&path)));
        assert_eq!(config.acl.read().unwrap(), r#"{"alice": ["/Biz/Check"]}"#);
    }

    #[test]
    fn missing_acl_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = AclSource::File(dir.path().join("absent.json"));
        assert!(matches!(source.read(), Err(ConfigError::AclFile { .. })));
    }
}
