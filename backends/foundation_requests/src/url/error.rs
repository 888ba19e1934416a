//! URL parsing error types.

use std::fmt;
use thiserror::Error;

/// Fixed-capacity fields of [`super::UrlFields`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlField {
    Schema,
    Hostname,
    Port,
    Uri,
    Userinfo,
}

impl fmt::Display for UrlField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Schema => "schema",
            Self::Hostname => "hostname",
            Self::Port => "port",
            Self::Uri => "uri",
            Self::Userinfo => "userinfo",
        };
        f.write_str(name)
    }
}

/// Error returned when a URL cannot be split into [`super::UrlFields`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("url is empty")]
    Empty,

    #[error("url has no recognizable scheme: {0}")]
    MissingScheme(String),

    #[error("unsupported url scheme: {0} (only http and https are supported)")]
    UnsupportedScheme(String),

    #[error("url has no host: {0}")]
    MissingHost(String),

    #[error("invalid port in url: {0}")]
    InvalidPort(String),

    #[error("invalid character {0:?} in url")]
    InvalidCharacter(char),

    #[error("{field} exceeds its capacity ({len} bytes, max {max})")]
    FieldTooLong {
        field: UrlField,
        len: usize,
        max: usize,
    },
}
