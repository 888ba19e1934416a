//! Request URL parsing.
//!
//! Splits `scheme://[userinfo@]host[:port][/path][?query][#fragment]` into
//! the fixed-capacity [`UrlFields`] a request is built from. Every field has
//! a maximum length and parsing fails closed when one is exceeded.

mod error;
mod scheme;

pub use error::*;
pub use scheme::*;

use crate::config::RequestsConfig;
use std::borrow::Cow;
use std::fmt;

/// Longest hostname accepted (`NI_MAXHOST` minus the terminator).
pub const HOSTNAME_MAX_LEN: usize = 1024;

/// Longest port text accepted.
pub const PORT_MAX_LEN: usize = 5;

/// Longest `user:password` text accepted.
pub const USERINFO_MAX_LEN: usize = 255;

/// Parsed components of a request URL.
///
/// The hostname is never empty, the uri is `/` when the URL has no path, and
/// the port is either the one written in the URL or the scheme default.
#[derive(Clone, PartialEq, Eq)]
pub struct UrlFields {
    schema: Scheme,
    hostname: String,
    uri: String,
    port: u16,
    is_ssl: bool,
    explicit_port: bool,
    userinfo: Option<String>,
}

impl UrlFields {
    /// Parses `url` with the default [`UrlParser`].
    ///
    /// # Errors
    ///
    /// See [`UrlParser::parse`].
    pub fn parse(url: &str) -> Result<Self, UrlError> {
        UrlParser::default().parse(url)
    }

    #[must_use]
    pub fn schema(&self) -> &Scheme {
        &self.schema
    }

    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Path plus query, as sent on the request line.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// True when the scheme is `https`.
    #[must_use]
    pub fn is_ssl(&self) -> bool {
        self.is_ssl
    }

    /// True when the port was written in the URL rather than defaulted.
    #[must_use]
    pub fn has_explicit_port(&self) -> bool {
        self.explicit_port
    }

    /// The `user:password` part of the authority, if any.
    #[must_use]
    pub fn userinfo(&self) -> Option<&str> {
        self.userinfo.as_deref()
    }
}

impl fmt::Debug for UrlFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlFields")
            .field("schema", &self.schema)
            .field("hostname", &self.hostname)
            .field("uri", &self.uri)
            .field("port", &self.port)
            .field("is_ssl", &self.is_ssl)
            .field("has_userinfo", &self.userinfo.is_some())
            .finish_non_exhaustive()
    }
}

/// Returns `url` with the userinfo of its authority masked, for logs and
/// error messages.
#[must_use]
pub fn redact_userinfo(url: &str) -> Cow<'_, str> {
    let authority_start = url.find("://").map_or(0, |sep| sep + 3);
    let rest = &url[authority_start..];
    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());

    match rest[..authority_end].rfind('@') {
        Some(at) => Cow::Owned(format!("{}***{}", &url[..authority_start], &rest[at..])),
        None => Cow::Borrowed(url),
    }
}

/// URL parser carrying the port defaulting policy and the uri capacity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlParser {
    uri_max_len: usize,
    http_port: u16,
    https_port: u16,
    force_tls: bool,
}

impl Default for UrlParser {
    fn default() -> Self {
        Self::from_config(&RequestsConfig::default())
    }
}

impl UrlParser {
    #[must_use]
    pub fn from_config(config: &RequestsConfig) -> Self {
        Self {
            uri_max_len: config.uri_capacity,
            http_port: config.http_port,
            https_port: config.https_port,
            force_tls: config.force_tls,
        }
    }

    /// Splits `url` into [`UrlFields`].
    ///
    /// A missing port defaults to the https port when the scheme is `https`
    /// or TLS is forced for every connection, else to the http port. A
    /// missing path becomes `/`. The fragment is dropped.
    ///
    /// # Errors
    ///
    /// Returns `UrlError` if:
    /// - The URL is empty or contains whitespace, control or non-ASCII bytes
    /// - The scheme is missing, malformed or not http/https
    /// - The host is empty
    /// - The port is not a number in `1..=65535`
    /// - Any field is longer than its capacity
    pub fn parse(&self, url: &str) -> Result<UrlFields, UrlError> {
        if url.is_empty() {
            return Err(UrlError::Empty);
        }

        if let Some(bad) = url.chars().find(|c| !c.is_ascii_graphic()) {
            return Err(UrlError::InvalidCharacter(bad));
        }

        let (schema, rest) = Scheme::parse_from_url(url)?;

        let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        let (authority, remainder) = rest.split_at(authority_end);

        let (userinfo, host_port) = match authority.rfind('@') {
            Some(at) => (Some(&authority[..at]), &authority[at + 1..]),
            None => (None, authority),
        };

        if let Some(info) = userinfo {
            check_len(UrlField::Userinfo, info, USERINFO_MAX_LEN)?;
        }

        let (hostname, port_text) = split_host_port(host_port)?;
        if hostname.is_empty() {
            return Err(UrlError::MissingHost(redact_userinfo(url).into_owned()));
        }
        check_len(UrlField::Hostname, hostname, HOSTNAME_MAX_LEN)?;

        let is_ssl = schema.is_https();
        let (port, explicit_port) = match port_text {
            Some(text) if !text.is_empty() => (parse_port(text)?, true),
            _ if is_ssl || self.force_tls => (self.https_port, false),
            _ => (self.http_port, false),
        };

        let without_fragment = remainder
            .find('#')
            .map_or(remainder, |hash| &remainder[..hash]);
        let uri = if without_fragment.is_empty() {
            "/".to_string()
        } else if without_fragment.starts_with('?') {
            format!("/{without_fragment}")
        } else {
            without_fragment.to_string()
        };
        check_len(UrlField::Uri, &uri, self.uri_max_len)?;

        tracing::debug!("Hostname: {}, Port: {}, URI: {}", hostname, port, uri);

        Ok(UrlFields {
            schema,
            hostname: hostname.to_string(),
            uri,
            port,
            is_ssl,
            explicit_port,
            userinfo: userinfo.map(str::to_string),
        })
    }
}

fn check_len(field: UrlField, value: &str, max: usize) -> Result<(), UrlError> {
    if value.len() > max {
        return Err(UrlError::FieldTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

/// Splits `host[:port]`, handling bracketed IPv6 literals.
fn split_host_port(host_port: &str) -> Result<(&str, Option<&str>), UrlError> {
    if let Some(bracketed) = host_port.strip_prefix('[') {
        let close = bracketed
            .find(']')
            .ok_or(UrlError::InvalidCharacter('['))?;
        let host = &bracketed[..close];
        let after = &bracketed[close + 1..];
        return match after.strip_prefix(':') {
            Some(port) => Ok((host, Some(port))),
            None if after.is_empty() => Ok((host, None)),
            None => Err(UrlError::InvalidPort(after.to_string())),
        };
    }

    match host_port.rfind(':') {
        Some(colon) => {
            let host = &host_port[..colon];
            if host.contains(':') {
                return Err(UrlError::InvalidCharacter(':'));
            }
            Ok((host, Some(&host_port[colon + 1..])))
        }
        None => Ok((host_port, None)),
    }
}

fn parse_port(text: &str) -> Result<u16, UrlError> {
    check_len(UrlField::Port, text, PORT_MAX_LEN)?;
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(UrlError::InvalidPort(text.to_string()));
    }
    match text.parse::<u16>() {
        Ok(0) | Err(_) => Err(UrlError::InvalidPort(text.to_string())),
        Ok(port) => Ok(port),
    }
}
