use std::io::{self, Read, Write};
use std::net::SocketAddrV4;
use std::time::Duration;

/// Identifier of a credential slot holding trust anchors.
pub type SecTag = u32;

/// Transport protocol requested from a [`SocketProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Tcp,
    /// TCP with a TLS 1.2 session layered by the host.
    Tls12,
}

/// TLS peer verification level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerVerify {
    None,
    Optional,
    Required,
}

/// A stream socket handed out by the host.
///
/// The TLS options only apply to [`SocketKind::Tls12`] sockets and must be
/// set before [`Socket::connect`].
pub trait Socket: Read + Write + Send {
    /// Sets the name used for SNI and certificate hostname checks.
    fn set_tls_hostname(&mut self, hostname: &str) -> io::Result<()>;

    /// Binds the trust anchors used to verify the peer.
    fn set_sec_tag_list(&mut self, tags: &[SecTag]) -> io::Result<()>;

    fn set_peer_verify(&mut self, level: PeerVerify) -> io::Result<()>;

    /// Connects and, for TLS sockets, completes the handshake.
    fn connect(&mut self, addr: SocketAddrV4) -> io::Result<()>;

    /// Bounds each subsequent read and write; `None` blocks indefinitely.
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Releases the socket. Further I/O fails.
    fn close(&mut self) -> io::Result<()>;
}

/// Creates sockets on behalf of a request.
pub trait SocketProvider: Send + Sync {
    /// Opens an unconnected socket of the given kind.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the host cannot allocate the socket or does
    /// not support `kind`.
    fn socket(&self, kind: SocketKind) -> io::Result<Box<dyn Socket>>;
}
