//! One HTTP/1.x request/response exchange over a connected [`Socket`].
//!
//! The request is written in full, then the response head is read into the
//! caller's fixed receive buffer. Body bytes are handed to the
//! [`ResponseHandler`] as they arrive, reusing the same buffer, so the
//! exchange never allocates per response.

use crate::method::Method;
use crate::netif::Socket;
use crate::options::has_header_line;
use crate::response::{Finality, HandlerAction, ResponseFragment, ResponseHandler};
use base64::Engine;
use derive_more::From;
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Smallest timeout handed to the socket; zero would mean "block forever".
const MIN_SOCKET_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(From, Debug)]
pub enum TransportError {
    Io(io::Error),

    #[from(ignore)]
    Timeout,

    /// The peer closed the connection before the response was complete.
    #[from(ignore)]
    ConnectionClosed,

    #[from(ignore)]
    MalformedResponse(String),

    /// The response head does not fit the receive buffer of this size.
    #[from(ignore)]
    HeadersTooLarge(usize),

    #[from(ignore)]
    UnsupportedTransferEncoding(String),

    /// The response handler asked to stop.
    #[from(ignore)]
    Aborted,
}

impl std::error::Error for TransportError {}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error during exchange: {err}"),
            Self::Timeout => write!(f, "request timed out"),
            Self::ConnectionClosed => write!(f, "connection closed before response completed"),
            Self::MalformedResponse(reason) => write!(f, "malformed response: {reason}"),
            Self::HeadersTooLarge(size) => {
                write!(f, "response headers exceed the {size} byte receive buffer")
            }
            Self::UnsupportedTransferEncoding(encoding) => {
                write!(f, "unsupported transfer encoding: {encoding}")
            }
            Self::Aborted => write!(f, "response handler aborted the exchange"),
        }
    }
}

/// Everything needed to write one request.
#[derive(Debug, Clone, Copy)]
pub struct RequestDescriptor<'a> {
    pub method: Method,
    pub uri: &'a str,
    pub host: &'a str,
    /// Port appended to the `Host` header, set when not the scheme default.
    pub host_port: Option<u16>,
    pub headers: &'a [String],
    pub protocol: &'a str,
    /// `user:password`, sent as basic authentication unless the header list
    /// already carries an `Authorization` line.
    pub credentials: Option<&'a str>,
    /// Body bytes, only for methods that carry one.
    pub payload: Option<&'a [u8]>,
}

impl RequestDescriptor<'_> {
    /// Renders the request line and header block, including the blank line.
    #[must_use]
    pub fn render_head(&self) -> Vec<u8> {
        let mut head = String::with_capacity(128);
        head.push_str(&format!(
            "{} {} {}\r\n",
            self.method.as_str(),
            self.uri,
            self.protocol
        ));

        if !has_header_line(self.headers, "Host") {
            let host = if self.host.contains(':') {
                format!("[{}]", self.host)
            } else {
                self.host.to_string()
            };
            match self.host_port {
                Some(port) => head.push_str(&format!("Host: {host}:{port}\r\n")),
                None => head.push_str(&format!("Host: {host}\r\n")),
            }
        }

        for line in self.headers {
            head.push_str(line);
            head.push_str("\r\n");
        }

        if let Some(credentials) = self.credentials {
            if !has_header_line(self.headers, "Authorization") {
                let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
                head.push_str(&format!("Authorization: Basic {encoded}\r\n"));
            }
        }

        if let Some(payload) = self.payload {
            if !has_header_line(self.headers, "Content-Length") {
                head.push_str(&format!("Content-Length: {}\r\n", payload.len()));
            }
        }

        if !has_header_line(self.headers, "Connection") {
            head.push_str("Connection: close\r\n");
        }

        head.push_str("\r\n");
        head.into_bytes()
    }
}

/// Status and framing of a parsed response head.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResponseHead {
    status: u16,
    content_length: Option<usize>,
}

fn parse_head(raw: &[u8]) -> Result<ResponseHead, TransportError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| TransportError::MalformedResponse("response head is not UTF-8".into()))?;

    let mut lines = text.split("\r\n");
    let status_line = lines.next().unwrap_or_default();

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(TransportError::MalformedResponse(format!(
            "bad status line: {status_line:?}"
        )));
    }

    let status = parts
        .next()
        .filter(|code| code.len() == 3)
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|code| (100..=999).contains(code))
        .ok_or_else(|| {
            TransportError::MalformedResponse(format!("bad status code in {status_line:?}"))
        })?;

    let mut content_length = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            return Err(TransportError::MalformedResponse(format!(
                "bad header line: {line:?}"
            )));
        };
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("Content-Length") {
            let length = value.parse::<usize>().map_err(|_| {
                TransportError::MalformedResponse(format!("bad Content-Length: {value:?}"))
            })?;
            content_length = Some(length);
        } else if name.eq_ignore_ascii_case("Transfer-Encoding")
            && !value.eq_ignore_ascii_case("identity")
        {
            return Err(TransportError::UnsupportedTransferEncoding(value.to_string()));
        }
    }

    Ok(ResponseHead {
        status,
        content_length,
    })
}

/// Drives one exchange on a connected socket.
pub struct Exchange<'a> {
    socket: &'a mut dyn Socket,
    recv: &'a mut [u8],
    deadline: Option<Instant>,
}

impl<'a> Exchange<'a> {
    /// Prepares an exchange bounded by `timeout` as a whole.
    pub fn new(socket: &'a mut dyn Socket, recv: &'a mut [u8], timeout: Duration) -> Self {
        Self {
            socket,
            recv,
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Sends `request` and delivers the response to `handler`.
    ///
    /// Returns the HTTP status code of the response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on I/O failure, timeout, malformed or
    /// unsupported responses, or when `handler` aborts.
    pub fn run(
        mut self,
        request: &RequestDescriptor<'_>,
        handler: &mut dyn ResponseHandler,
    ) -> Result<u16, TransportError> {
        self.send(request)?;

        let (head, body_start, filled) = self.read_head()?;
        tracing::debug!("Response status: {}", head.status);

        let has_body = request.method.expects_response_body()
            && !matches!(head.status, 100..=199 | 204 | 304);

        if has_body {
            self.read_body(&head, body_start, filled, handler)?;
        } else {
            let fragment = ResponseFragment::new(Some(head.status), &[], Finality::Final)
                .with_content_length(head.content_length);
            deliver(handler, &fragment)?;
        }

        Ok(head.status)
    }

    fn send(&mut self, request: &RequestDescriptor<'_>) -> Result<(), TransportError> {
        let head = request.render_head();
        tracing::debug!(
            "Sending {} {} ({} header bytes)",
            request.method,
            request.uri,
            head.len()
        );

        self.write_all(&head)?;
        if let Some(payload) = request.payload {
            self.write_all(payload)?;
        }

        self.arm()?;
        self.socket.flush().map_err(map_io)
    }

    /// Reads until a complete head sits in the buffer, skipping interim
    /// 1xx responses other than 101.
    ///
    /// Returns the head, the offset where the body starts and the number of
    /// valid bytes in the buffer.
    fn read_head(&mut self) -> Result<(ResponseHead, usize, usize), TransportError> {
        let mut filled = 0;

        loop {
            if let Some(end) = memchr::memmem::find(&self.recv[..filled], HEAD_TERMINATOR) {
                let head = parse_head(&self.recv[..end])?;
                let body_start = end + HEAD_TERMINATOR.len();

                if (100..=199).contains(&head.status) && head.status != 101 {
                    tracing::debug!("Skipping interim response {}", head.status);
                    self.recv.copy_within(body_start..filled, 0);
                    filled -= body_start;
                    continue;
                }
                return Ok((head, body_start, filled));
            }

            if filled == self.recv.len() {
                return Err(TransportError::HeadersTooLarge(self.recv.len()));
            }

            let read = self.read_at(filled)?;
            if read == 0 {
                return Err(TransportError::ConnectionClosed);
            }
            filled += read;
        }
    }

    fn read_body(
        &mut self,
        head: &ResponseHead,
        body_start: usize,
        filled: usize,
        handler: &mut dyn ResponseHandler,
    ) -> Result<(), TransportError> {
        let status = Some(head.status);

        match head.content_length {
            Some(total) => {
                let mut remaining = total;

                let leftover = (filled - body_start).min(remaining);
                if leftover > 0 || remaining == 0 {
                    remaining -= leftover;
                    let finality = finality_for(remaining);
                    let fragment = ResponseFragment::new(
                        status,
                        &self.recv[body_start..body_start + leftover],
                        finality,
                    )
                    .with_content_length(head.content_length);
                    deliver(handler, &fragment)?;
                }

                while remaining > 0 {
                    let read = self.read_at(0)?;
                    if read == 0 {
                        return Err(TransportError::ConnectionClosed);
                    }
                    let take = read.min(remaining);
                    remaining -= take;

                    let fragment =
                        ResponseFragment::new(status, &self.recv[..take], finality_for(remaining))
                            .with_content_length(head.content_length);
                    deliver(handler, &fragment)?;
                }
            }
            None => {
                if filled > body_start {
                    let fragment =
                        ResponseFragment::new(status, &self.recv[body_start..filled], Finality::More);
                    deliver(handler, &fragment)?;
                }

                loop {
                    let read = self.read_at(0)?;
                    if read == 0 {
                        break;
                    }
                    let fragment = ResponseFragment::new(status, &self.recv[..read], Finality::More);
                    deliver(handler, &fragment)?;
                }

                deliver(handler, &ResponseFragment::new(status, &[], Finality::Final))?;
            }
        }

        Ok(())
    }

    /// Applies the time left before the deadline to the socket.
    fn arm(&mut self) -> Result<(), TransportError> {
        let Some(deadline) = self.deadline else {
            return self.socket.set_timeout(None).map_err(map_io);
        };

        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(TransportError::Timeout);
        }
        self.socket
            .set_timeout(Some(left.max(MIN_SOCKET_TIMEOUT)))
            .map_err(map_io)
    }

    fn write_all(&mut self, mut data: &[u8]) -> Result<(), TransportError> {
        while !data.is_empty() {
            self.arm()?;
            match self.socket.write(data) {
                Ok(0) => return Err(TransportError::ConnectionClosed),
                Ok(written) => data = &data[written..],
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(map_io(err)),
            }
        }
        Ok(())
    }

    fn read_at(&mut self, offset: usize) -> Result<usize, TransportError> {
        loop {
            self.arm()?;
            match self.socket.read(&mut self.recv[offset..]) {
                Ok(read) => return Ok(read),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                // peers that skip the TLS close_notify
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(0),
                Err(err) => return Err(map_io(err)),
            }
        }
    }
}

fn finality_for(remaining: usize) -> Finality {
    if remaining == 0 {
        Finality::Final
    } else {
        Finality::More
    }
}

fn deliver(
    handler: &mut dyn ResponseHandler,
    fragment: &ResponseFragment<'_>,
) -> Result<(), TransportError> {
    match handler.on_fragment(fragment) {
        HandlerAction::Continue => Ok(()),
        HandlerAction::Abort => {
            tracing::debug!("Response handler aborted the exchange");
            Err(TransportError::Aborted)
        }
    }
}

fn map_io(err: io::Error) -> TransportError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout,
        io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => {
            TransportError::ConnectionClosed
        }
        _ => TransportError::Io(err),
    }
}
