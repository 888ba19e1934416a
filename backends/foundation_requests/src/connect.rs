//! Socket setup for one request.
//!
//! [`ConnectionEstablisher`] picks TCP or TLS from the URL and the
//! [`TlsPolicy`], applies the TLS verification options before connecting
//! and hands back an [`OwnedSocket`]. A socket that fails any setup step is
//! closed before the error is returned.

use crate::errors::RequestsError;
use crate::netif::{PeerVerify, SecTag, Socket, SocketKind, SocketProvider};
use crate::readiness::ResolvedAddress;
use crate::url::UrlFields;
use std::io::{self, Read, Write};
use std::net::SocketAddrV4;
use std::time::Duration;

/// Socket setup step that failed.
#[derive(Debug)]
pub enum ConnectError {
    SocketCreate(io::Error),
    TlsHostname(io::Error),
    TlsSecTag(io::Error),
    TlsPeerVerify(io::Error),
    Connect { addr: SocketAddrV4, source: io::Error },
}

impl std::error::Error for ConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SocketCreate(err)
            | Self::TlsHostname(err)
            | Self::TlsSecTag(err)
            | Self::TlsPeerVerify(err)
            | Self::Connect { source: err, .. } => Some(err),
        }
    }
}

impl core::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SocketCreate(err) => write!(f, "failed to create socket: {err}"),
            Self::TlsHostname(err) => write!(f, "failed to set TLS_HOSTNAME option: {err}"),
            Self::TlsSecTag(err) => write!(f, "failed to set TLS_SEC_TAG_LIST option: {err}"),
            Self::TlsPeerVerify(err) => write!(f, "failed to set TLS_PEER_VERIFY option: {err}"),
            Self::Connect { addr, source } => write!(f, "connect to {addr} failed: {source}"),
        }
    }
}

/// TLS settings applied when opening a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsPolicy {
    /// Use TLS whatever the URL scheme.
    pub force_tls: bool,
    pub verify_host: bool,
    pub verify_peer: bool,
    /// Trust store tag bound when verifying the peer.
    pub sec_tag: SecTag,
}

/// Exclusively owned socket that is closed exactly once.
///
/// Closing happens through [`OwnedSocket::close`] or, failing that, on drop.
pub struct OwnedSocket {
    inner: Option<Box<dyn Socket>>,
}

impl OwnedSocket {
    #[must_use]
    pub fn new(socket: Box<dyn Socket>) -> Self {
        Self {
            inner: Some(socket),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Closes the socket. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns the host error of the first close.
    pub fn close(&mut self) -> io::Result<()> {
        match self.inner.take() {
            Some(mut socket) => socket.close(),
            None => Ok(()),
        }
    }
}

impl Drop for OwnedSocket {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::debug!("Failed to close socket: {}", err);
        }
    }
}

impl Read for OwnedSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.as_mut().ok_or_else(closed)?.read(buf)
    }
}

impl Write for OwnedSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.as_mut().ok_or_else(closed)?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.as_mut().ok_or_else(closed)?.flush()
    }
}

impl Socket for OwnedSocket {
    fn set_tls_hostname(&mut self, hostname: &str) -> io::Result<()> {
        self.inner.as_mut().ok_or_else(closed)?.set_tls_hostname(hostname)
    }

    fn set_sec_tag_list(&mut self, tags: &[SecTag]) -> io::Result<()> {
        self.inner.as_mut().ok_or_else(closed)?.set_sec_tag_list(tags)
    }

    fn set_peer_verify(&mut self, level: PeerVerify) -> io::Result<()> {
        self.inner.as_mut().ok_or_else(closed)?.set_peer_verify(level)
    }

    fn connect(&mut self, addr: SocketAddrV4) -> io::Result<()> {
        self.inner.as_mut().ok_or_else(closed)?.connect(addr)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.inner.as_mut().ok_or_else(closed)?.set_timeout(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        OwnedSocket::close(self)
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket already closed")
}

/// Opens TCP or TLS connections through a [`SocketProvider`].
pub struct ConnectionEstablisher<'a> {
    sockets: &'a dyn SocketProvider,
}

impl<'a> ConnectionEstablisher<'a> {
    #[must_use]
    pub fn new(sockets: &'a dyn SocketProvider) -> Self {
        Self { sockets }
    }

    /// Opens a connected socket to `address`.
    ///
    /// TLS is used when the URL is https or `policy.force_tls` is set. With
    /// host verification the hostname is bound to the session; with peer
    /// verification the trust anchor tag is bound, otherwise verification
    /// is explicitly switched off.
    ///
    /// # Errors
    ///
    /// Returns [`RequestsError::ConnectionAborted`] on any setup or connect
    /// failure, after closing the partially created socket.
    pub fn connect(
        &self,
        fields: &UrlFields,
        address: &ResolvedAddress,
        policy: &TlsPolicy,
    ) -> Result<OwnedSocket, RequestsError> {
        let tls = fields.is_ssl() || policy.force_tls;
        let kind = if tls {
            SocketKind::Tls12
        } else {
            SocketKind::Tcp
        };

        let socket = self.sockets.socket(kind).map_err(|err| {
            tracing::error!("Failed to create socket: {}", err);
            ConnectError::SocketCreate(err)
        })?;
        let mut socket = OwnedSocket::new(socket);

        match Self::setup(&mut socket, fields, address, policy, tls) {
            Ok(()) => {
                tracing::debug!("Connected to {} ({:?})", address.socket_addr(), kind);
                Ok(socket)
            }
            Err(err) => {
                tracing::error!("{}", err);
                if let Err(close_err) = socket.close() {
                    tracing::debug!("Failed to close aborted socket: {}", close_err);
                }
                Err(err.into())
            }
        }
    }

    fn setup(
        socket: &mut OwnedSocket,
        fields: &UrlFields,
        address: &ResolvedAddress,
        policy: &TlsPolicy,
        tls: bool,
    ) -> Result<(), ConnectError> {
        if tls {
            if policy.verify_host {
                socket
                    .set_tls_hostname(fields.hostname())
                    .map_err(ConnectError::TlsHostname)?;
            }

            if policy.verify_peer {
                socket
                    .set_sec_tag_list(&[policy.sec_tag])
                    .map_err(ConnectError::TlsSecTag)?;
            } else {
                tracing::debug!("Peer verification disabled for {}", fields.hostname());
                socket
                    .set_peer_verify(PeerVerify::None)
                    .map_err(ConnectError::TlsPeerVerify)?;
            }
        }

        let addr = address.socket_addr();
        socket
            .connect(addr)
            .map_err(|source| ConnectError::Connect { addr, source })
    }
}
