//! URL scheme component.

use super::error::{UrlError, UrlField};
use std::fmt;

/// Longest scheme text accepted by the parser.
pub const SCHEMA_MAX_LEN: usize = 7;

/// Scheme of a request URL.
///
/// Only `http` and `https` are recognized. The text is kept as written in the
/// URL, while comparisons ignore case.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Scheme {
    kind: SchemeKind,
    text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum SchemeKind {
    Http,
    Https,
}

impl Scheme {
    /// Splits the scheme off the front of `url`.
    ///
    /// # Returns
    ///
    /// A tuple of (Scheme, remainder) where remainder is everything after
    /// `scheme://`.
    ///
    /// # Errors
    ///
    /// Returns `UrlError` if:
    /// - No `://` separator is found or the scheme is empty
    /// - The scheme contains invalid characters
    /// - The scheme is longer than [`SCHEMA_MAX_LEN`]
    /// - The scheme is neither `http` nor `https`
    pub(crate) fn parse_from_url(url: &str) -> Result<(Self, &str), UrlError> {
        let sep = url
            .find("://")
            .ok_or_else(|| UrlError::MissingScheme(super::redact_userinfo(url).into_owned()))?;

        let text = &url[..sep];
        if !Self::is_valid_scheme(text) {
            return Err(UrlError::MissingScheme(super::redact_userinfo(url).into_owned()));
        }

        if text.len() > SCHEMA_MAX_LEN {
            return Err(UrlError::FieldTooLong {
                field: UrlField::Schema,
                len: text.len(),
                max: SCHEMA_MAX_LEN,
            });
        }

        let kind = if text.eq_ignore_ascii_case("http") {
            SchemeKind::Http
        } else if text.eq_ignore_ascii_case("https") {
            SchemeKind::Https
        } else {
            return Err(UrlError::UnsupportedScheme(text.to_string()));
        };

        let scheme = Scheme {
            kind,
            text: text.to_string(),
        };
        Ok((scheme, &url[sep + 3..]))
    }

    /// RFC 3986: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
    fn is_valid_scheme(s: &str) -> bool {
        let mut chars = s.chars();

        if !chars.next().is_some_and(|c| c.is_ascii_alphabetic()) {
            return false;
        }

        chars.all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
    }

    /// Returns the scheme as written in the URL.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_https(&self) -> bool {
        self.kind == SchemeKind::Https
    }

    #[must_use]
    pub fn is_http(&self) -> bool {
        self.kind == SchemeKind::Http
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_parse_http() {
        let (scheme, rest) = Scheme::parse_from_url("http://example.com").unwrap();
        assert!(scheme.is_http());
        assert_eq!(rest, "example.com");
    }

    #[test]
    fn test_scheme_parse_https() {
        let (scheme, rest) = Scheme::parse_from_url("https://example.com/a").unwrap();
        assert!(scheme.is_https());
        assert_eq!(rest, "example.com/a");
    }

    #[test]
    fn test_scheme_case_is_preserved_but_ignored_for_kind() {
        let (scheme, _) = Scheme::parse_from_url("HtTpS://example.com").unwrap();
        assert!(scheme.is_https());
        assert_eq!(scheme.as_str(), "HtTpS");
    }

    #[test]
    fn test_scheme_validation() {
        assert!(matches!(
            Scheme::parse_from_url("example.com"),
            Err(UrlError::MissingScheme(_))
        ));
        assert!(matches!(
            Scheme::parse_from_url(":///example.com"),
            Err(UrlError::MissingScheme(_))
        ));
        assert!(matches!(
            Scheme::parse_from_url("1http://example.com"),
            Err(UrlError::MissingScheme(_))
        ));
        assert!(matches!(
            Scheme::parse_from_url("ftp://example.com"),
            Err(UrlError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_scheme_over_capacity_fails_closed() {
        let err = Scheme::parse_from_url("httpsxyz://example.com").unwrap_err();
        assert_eq!(
            err,
            UrlError::FieldTooLong {
                field: UrlField::Schema,
                len: 8,
                max: SCHEMA_MAX_LEN,
            }
        );
    }
}
