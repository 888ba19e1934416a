//! Request configuration.
//!
//! Timeouts, port defaults, TLS defaults and buffer capacities shared by every
//! [`crate::RequestContext`] created from it. Loadable from TOML.

use crate::netif::SecTag;
use derive_more::From;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest protocol string a request can carry.
pub const PROTOCOL_MAX_LEN: usize = 15;

/// Smallest receive buffer that can hold a status line and a few headers.
pub const MIN_RECV_BUFFER_SIZE: usize = 64;

/// Configuration for request contexts.
///
/// Created via `Default`, [`RequestsConfig::from_toml_str`] or
/// [`RequestsConfig::load`], then adjusted with the `with_*` builder methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestsConfig {
    /// How long to wait for the link-up notification.
    pub link_timeout_ms: u64,
    /// How long to wait for the DNS query to complete.
    pub dns_timeout_ms: u64,
    /// Upper bound for one request/response exchange.
    pub request_timeout_ms: u64,
    /// Upper bound for the TCP connect (and TLS handshake).
    pub connect_timeout_ms: u64,
    pub http_port: u16,
    pub https_port: u16,
    /// Use TLS for every connection, whatever the URL scheme.
    pub force_tls: bool,
    /// Initial TLS hostname verification flag of a context.
    pub verify_host: bool,
    /// Initial TLS peer verification flag of a context.
    pub verify_peer: bool,
    /// Trust store tag of the CA certificate bound when verifying peers.
    pub ca_sec_tag: SecTag,
    /// Maximum bytes of the request uri (path and query).
    pub uri_capacity: usize,
    pub recv_buffer_size: usize,
    pub payload_capacity: usize,
    pub max_header_lines: usize,
    pub default_protocol: String,
}

impl Default for RequestsConfig {
    fn default() -> Self {
        Self {
            link_timeout_ms: 3_000,
            dns_timeout_ms: 2_000,
            request_timeout_ms: 5_000,
            connect_timeout_ms: 3_000,
            http_port: 80,
            https_port: 443,
            force_tls: false,
            verify_host: true,
            verify_peer: true,
            ca_sec_tag: 1,
            uri_capacity: 256,
            recv_buffer_size: 576,
            payload_capacity: 576,
            max_header_lines: 16,
            default_protocol: "HTTP/1.1".to_string(),
        }
    }
}

/// Errors raised while loading or validating a [`RequestsConfig`].
#[derive(From, Debug)]
pub enum ConfigError {
    #[from]
    Io(std::io::Error),

    #[from]
    Toml(toml::de::Error),

    #[from(ignore)]
    Invalid(String),
}

impl std::error::Error for ConfigError {}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read configuration: {err}"),
            Self::Toml(err) => write!(f, "failed to parse configuration: {err}"),
            Self::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl RequestsConfig {
    /// Parses and validates a TOML document. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] for malformed documents and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise see
    /// [`RequestsConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Checks that every capacity can hold a usable request.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recv_buffer_size < MIN_RECV_BUFFER_SIZE {
            return Err(ConfigError::Invalid(format!(
                "recv_buffer_size must be at least {MIN_RECV_BUFFER_SIZE} bytes"
            )));
        }
        if self.uri_capacity == 0 {
            return Err(ConfigError::Invalid("uri_capacity must not be zero".into()));
        }
        if self.payload_capacity == 0 {
            return Err(ConfigError::Invalid(
                "payload_capacity must not be zero".into(),
            ));
        }
        if self.default_protocol.is_empty() || self.default_protocol.len() > PROTOCOL_MAX_LEN {
            return Err(ConfigError::Invalid(format!(
                "default_protocol must be 1..={PROTOCOL_MAX_LEN} bytes"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }

    #[must_use]
    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn with_link_timeout(mut self, timeout: Duration) -> Self {
        self.link_timeout_ms = duration_millis(timeout);
        self
    }

    #[must_use]
    pub fn with_dns_timeout(mut self, timeout: Duration) -> Self {
        self.dns_timeout_ms = duration_millis(timeout);
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_millis(timeout);
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_millis(timeout);
        self
    }

    #[must_use]
    pub fn with_force_tls(mut self, force: bool) -> Self {
        self.force_tls = force;
        self
    }

    #[must_use]
    pub fn with_verification(mut self, verify_host: bool, verify_peer: bool) -> Self {
        self.verify_host = verify_host;
        self.verify_peer = verify_peer;
        self
    }

    #[must_use]
    pub fn with_ca_sec_tag(mut self, tag: SecTag) -> Self {
        self.ca_sec_tag = tag;
        self
    }

    #[must_use]
    pub fn with_uri_capacity(mut self, capacity: usize) -> Self {
        self.uri_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    #[must_use]
    pub fn with_payload_capacity(mut self, capacity: usize) -> Self {
        self.payload_capacity = capacity;
        self
    }
}

fn duration_millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}
