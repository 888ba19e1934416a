use crate::buffers::{BoundedString, CapacityError, FixedBuffer};
use crate::config::{RequestsConfig, PROTOCOL_MAX_LEN};
use crate::response::ResponseHandler;
use crate::url::USERINFO_MAX_LEN;
use derive_more::From;
use std::fmt;

/// One request parameter accepted by [`crate::RequestContext::setopt`].
pub enum RequestOption {
    /// Header lines, in send order, with or without a trailing CRLF.
    /// Replaces any previously configured list.
    Headers(Vec<String>),
    /// Payload copied into the context's payload buffer. Also sets the
    /// declared size to the body length.
    Body(Vec<u8>),
    /// Declared payload length, at most the payload buffer capacity.
    BodySize(usize),
    /// Protocol version of the request line, e.g. `HTTP/1.1`.
    Protocol(String),
    VerifyHost(bool),
    VerifyPeer(bool),
    /// `user:password` sent as HTTP basic authentication.
    Credentials(String),
    ResponseHandler(Box<dyn ResponseHandler>),
}

impl RequestOption {
    pub fn handler<H>(handler: H) -> Self
    where
        H: ResponseHandler + 'static,
    {
        Self::ResponseHandler(Box::new(handler))
    }

    pub fn body(body: impl Into<Vec<u8>>) -> Self {
        Self::Body(body.into())
    }

    pub fn headers<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Headers(lines.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Headers(_) => "headers",
            Self::Body(_) => "body",
            Self::BodySize(_) => "body_size",
            Self::Protocol(_) => "protocol",
            Self::VerifyHost(_) => "verify_host",
            Self::VerifyPeer(_) => "verify_peer",
            Self::Credentials(_) => "credentials",
            Self::ResponseHandler(_) => "response_handler",
        }
    }
}

impl fmt::Debug for RequestOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Headers(lines) => f.debug_tuple("Headers").field(lines).finish(),
            Self::Body(body) => write!(f, "Body({} bytes)", body.len()),
            Self::BodySize(size) => f.debug_tuple("BodySize").field(size).finish(),
            Self::Protocol(protocol) => f.debug_tuple("Protocol").field(protocol).finish(),
            Self::VerifyHost(flag) => f.debug_tuple("VerifyHost").field(flag).finish(),
            Self::VerifyPeer(flag) => f.debug_tuple("VerifyPeer").field(flag).finish(),
            Self::Credentials(_) => f.write_str("Credentials(<redacted>)"),
            Self::ResponseHandler(_) => f.write_str("ResponseHandler(..)"),
        }
    }
}

/// Reasons a `setopt` value is rejected.
#[derive(From, Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    CapacityExceeded(CapacityError),

    #[from(ignore)]
    InvalidHeader(String),

    #[from(ignore)]
    TooManyHeaders { max: usize, requested: usize },

    #[from(ignore)]
    InvalidProtocol(String),

    #[from(ignore)]
    InvalidCredentials,
}

impl std::error::Error for OptionError {}

impl core::fmt::Display for OptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CapacityExceeded(err) => write!(f, "{err}"),
            Self::InvalidHeader(line) => write!(f, "invalid header line: {line:?}"),
            Self::TooManyHeaders { max, requested } => {
                write!(f, "{requested} header lines exceed the limit of {max}")
            }
            Self::InvalidProtocol(protocol) => write!(f, "invalid protocol: {protocol:?}"),
            Self::InvalidCredentials => {
                write!(f, "credentials must have the form user:password")
            }
        }
    }
}

/// Request parameters of one context, held in context-owned storage.
pub struct OptionStore {
    headers: Vec<String>,
    max_header_lines: usize,
    payload: FixedBuffer,
    payload_size: usize,
    protocol: BoundedString,
    verify_host: bool,
    verify_peer: bool,
    credentials: Option<String>,
    handler: Option<Box<dyn ResponseHandler>>,
}

impl OptionStore {
    /// Creates a store seeded from `config`.
    ///
    /// # Errors
    ///
    /// Fails when the configured default protocol does not fit its buffer.
    pub fn new(config: &RequestsConfig) -> Result<Self, OptionError> {
        Ok(Self {
            headers: Vec::new(),
            max_header_lines: config.max_header_lines,
            payload: FixedBuffer::new("payload", config.payload_capacity),
            payload_size: 0,
            protocol: BoundedString::with_value(
                "protocol",
                PROTOCOL_MAX_LEN,
                &config.default_protocol,
            )?,
            verify_host: config.verify_host,
            verify_peer: config.verify_peer,
            credentials: None,
            handler: None,
        })
    }

    /// Stores `option`, overwriting any previous value of the same kind.
    ///
    /// # Errors
    ///
    /// Returns [`OptionError`] and keeps the previous value when the new one
    /// does not fit its storage or is malformed.
    pub fn apply(&mut self, option: RequestOption) -> Result<(), OptionError> {
        match option {
            RequestOption::Headers(lines) => self.set_headers(lines)?,
            RequestOption::Body(body) => {
                self.payload.copy_from(&body)?;
                self.payload_size = body.len();
            }
            RequestOption::BodySize(size) => {
                if size > self.payload.capacity() {
                    return Err(CapacityError::new("payload", self.payload.capacity(), size).into());
                }
                self.payload_size = size;
            }
            RequestOption::Protocol(protocol) => {
                if protocol.is_empty() || protocol.chars().any(|c| !c.is_ascii_graphic()) {
                    return Err(OptionError::InvalidProtocol(protocol));
                }
                self.protocol.set(&protocol)?;
            }
            RequestOption::VerifyHost(flag) => self.verify_host = flag,
            RequestOption::VerifyPeer(flag) => self.verify_peer = flag,
            RequestOption::Credentials(credentials) => {
                if credentials.len() > USERINFO_MAX_LEN {
                    return Err(CapacityError::new(
                        "credentials",
                        USERINFO_MAX_LEN,
                        credentials.len(),
                    )
                    .into());
                }
                if !credentials.contains(':') || has_line_break(&credentials) {
                    return Err(OptionError::InvalidCredentials);
                }
                self.credentials = Some(credentials);
            }
            RequestOption::ResponseHandler(handler) => self.handler = Some(handler),
        }
        Ok(())
    }

    fn set_headers(&mut self, lines: Vec<String>) -> Result<(), OptionError> {
        if lines.len() > self.max_header_lines {
            return Err(OptionError::TooManyHeaders {
                max: self.max_header_lines,
                requested: lines.len(),
            });
        }

        let mut headers = Vec::with_capacity(lines.len());
        for line in lines {
            let trimmed = line
                .strip_suffix("\r\n")
                .or_else(|| line.strip_suffix('\n'))
                .unwrap_or(&line);

            let well_formed = trimmed
                .split_once(':')
                .is_some_and(|(name, _)| !name.is_empty() && !name.contains(char::is_whitespace));

            if !well_formed || has_line_break(trimmed) {
                return Err(OptionError::InvalidHeader(line));
            }
            headers.push(trimmed.to_string());
        }

        self.headers = headers;
        Ok(())
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Whether a header named `name` (case-insensitive) is configured.
    #[must_use]
    pub fn has_header(&self, name: &str) -> bool {
        has_header_line(&self.headers, name)
    }

    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    #[must_use]
    pub fn payload_capacity(&self) -> usize {
        self.payload.capacity()
    }

    /// The first `payload_size` bytes of the payload buffer.
    ///
    /// # Errors
    ///
    /// Fails when the declared size reaches past the copied body.
    pub fn payload(&self) -> Result<&[u8], CapacityError> {
        self.payload.prefix(self.payload_size)
    }

    /// Checks caller `Content-Length` headers against the body sent.
    ///
    /// # Errors
    ///
    /// Fails with [`OptionError::InvalidHeader`] when a `Content-Length`
    /// header is set but no body is sent, or when its value differs from
    /// the length of `payload`.
    pub fn check_content_length(&self, payload: Option<&[u8]>) -> Result<(), OptionError> {
        for line in &self.headers {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if !name.trim().eq_ignore_ascii_case("Content-Length") {
                continue;
            }

            let declared = value.trim().parse::<usize>().ok();
            match payload {
                Some(body) if declared == Some(body.len()) => {}
                _ => return Err(OptionError::InvalidHeader(line.clone())),
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn protocol(&self) -> &str {
        self.protocol.as_str()
    }

    #[must_use]
    pub fn verify_host(&self) -> bool {
        self.verify_host
    }

    #[must_use]
    pub fn verify_peer(&self) -> bool {
        self.verify_peer
    }

    #[must_use]
    pub fn credentials(&self) -> Option<&str> {
        self.credentials.as_deref()
    }

    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    /// Moves the handler out for the duration of one exchange.
    pub fn take_handler(&mut self) -> Option<Box<dyn ResponseHandler>> {
        self.handler.take()
    }

    /// Puts back a handler taken with [`OptionStore::take_handler`], unless
    /// a new one was configured meanwhile.
    pub fn restore_handler(&mut self, handler: Box<dyn ResponseHandler>) {
        if self.handler.is_none() {
            self.handler = Some(handler);
        }
    }
}

/// Whether `lines` holds a header named `name`, compared case-insensitively.
pub(crate) fn has_header_line(lines: &[String], name: &str) -> bool {
    lines.iter().any(|line| {
        line.split_once(':')
            .is_some_and(|(header, _)| header.trim().eq_ignore_ascii_case(name))
    })
}

fn has_line_break(value: &str) -> bool {
    value.contains(['\r', '\n'])
}

impl fmt::Debug for OptionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptionStore")
            .field("headers", &self.headers)
            .field("payload_size", &self.payload_size)
            .field("protocol", &self.protocol.as_str())
            .field("verify_host", &self.verify_host)
            .field("verify_peer", &self.verify_peer)
            .field("has_credentials", &self.credentials.is_some())
            .field("has_handler", &self.handler.is_some())
            .finish_non_exhaustive()
    }
}
