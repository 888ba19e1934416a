use crate::config::ConfigError;
use crate::connect::ConnectError;
use crate::netif::DnsError;
use crate::options::OptionError;
use crate::transport::TransportError;
use crate::url::UrlError;
use derive_more::From;
use std::time::Duration;

/// POSIX error numbers reported through [`RequestsError::errno`].
pub mod errno {
    pub const EIO: i32 = 5;
    pub const EINVAL: i32 = 22;
    pub const EAFNOSUPPORT: i32 = 97;
    pub const ENETDOWN: i32 = 100;
    pub const ECONNABORTED: i32 = 103;
    pub const ECONNRESET: i32 = 104;
    pub const ETIMEDOUT: i32 = 110;
    pub const EHOSTUNREACH: i32 = 113;
    pub const ECANCELED: i32 = 125;
}

/// Errors of the request lifecycle.
///
/// Every step fails fast with one of these and nothing is retried; callers
/// decide whether to `init` and `execute` again.
#[derive(From, Debug)]
pub enum RequestsError {
    /// Malformed or over-length URL.
    Parse(UrlError),

    /// The link did not come up within the timeout.
    #[from(ignore)]
    NetworkNotReady(Duration),

    DnsResolutionFailed(DnsError),

    /// The host only resolved to non-IPv4 addresses.
    #[from(ignore)]
    UnsupportedAddressFamily(String),

    /// Socket or TLS setup, or the connect call, failed.
    ConnectionAborted(ConnectError),

    /// The context is not in a state to run the operation.
    #[from(ignore)]
    InvalidArgument(String),

    Transport(TransportError),

    /// A `setopt` value was rejected.
    InvalidOption(OptionError),

    Config(ConfigError),
}

impl RequestsError {
    /// The negative errno equivalent of this error.
    #[must_use]
    pub fn errno(&self) -> i32 {
        let code = match self {
            Self::Parse(_) | Self::InvalidArgument(_) | Self::InvalidOption(_) | Self::Config(_) => {
                errno::EINVAL
            }
            Self::NetworkNotReady(_) => errno::ENETDOWN,
            Self::DnsResolutionFailed(DnsError::Timeout(_)) => errno::ETIMEDOUT,
            Self::DnsResolutionFailed(_) => errno::EHOSTUNREACH,
            Self::UnsupportedAddressFamily(_) => errno::EAFNOSUPPORT,
            Self::ConnectionAborted(_) => errno::ECONNABORTED,
            Self::Transport(TransportError::Timeout) => errno::ETIMEDOUT,
            Self::Transport(TransportError::Aborted) => errno::ECANCELED,
            Self::Transport(TransportError::ConnectionClosed) => errno::ECONNRESET,
            Self::Transport(_) => errno::EIO,
        };
        -code
    }
}

impl std::error::Error for RequestsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::DnsResolutionFailed(err) => Some(err),
            Self::ConnectionAborted(err) => Some(err),
            Self::Transport(err) => Some(err),
            Self::InvalidOption(err) => Some(err),
            Self::Config(err) => Some(err),
            Self::NetworkNotReady(_)
            | Self::UnsupportedAddressFamily(_)
            | Self::InvalidArgument(_) => None,
        }
    }
}

impl core::fmt::Display for RequestsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "URL parsing failed: {err}"),
            Self::NetworkNotReady(timeout) => {
                write!(f, "network not ready after {}ms", timeout.as_millis())
            }
            Self::DnsResolutionFailed(err) => write!(f, "{err}"),
            Self::UnsupportedAddressFamily(host) => {
                write!(f, "{host} resolved only to unsupported address families")
            }
            Self::ConnectionAborted(err) => write!(f, "connection aborted: {err}"),
            Self::InvalidArgument(reason) => write!(f, "invalid argument: {reason}"),
            Self::Transport(err) => write!(f, "{err}"),
            Self::InvalidOption(err) => write!(f, "option rejected: {err}"),
            Self::Config(err) => write!(f, "{err}"),
        }
    }
}
