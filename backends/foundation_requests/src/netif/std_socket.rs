use super::{PeerVerify, SecTag, Socket, SocketKind, SocketProvider, TrustStore};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, SocketAddrV4, TcpStream};
use std::sync::Arc;
use std::time::Duration;

/// [`SocketProvider`] backed by `std::net::TcpStream`, with TLS 1.2
/// sessions from rustls when the `ssl-rustls` feature is enabled.
#[derive(Debug, Clone)]
pub struct StdSocketProvider {
    trust: Arc<TrustStore>,
    connect_timeout: Duration,
}

impl StdSocketProvider {
    #[must_use]
    pub fn new(trust: Arc<TrustStore>, connect_timeout: Duration) -> Self {
        Self {
            trust,
            connect_timeout,
        }
    }
}

impl SocketProvider for StdSocketProvider {
    fn socket(&self, kind: SocketKind) -> io::Result<Box<dyn Socket>> {
        #[cfg(not(feature = "ssl-rustls"))]
        if kind == SocketKind::Tls12 {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "TLS socket requested but no TLS feature enabled",
            ));
        }

        Ok(Box::new(StdSocket::new(
            kind,
            self.trust.clone(),
            self.connect_timeout,
        )))
    }
}

enum Stream {
    Idle,
    Tcp(TcpStream),
    #[cfg(feature = "ssl-rustls")]
    Tls(Box<rustls::StreamOwned<rustls::ClientConnection, TcpStream>>),
    Closed,
}

pub struct StdSocket {
    kind: SocketKind,
    trust: Arc<TrustStore>,
    connect_timeout: Duration,
    hostname: Option<String>,
    sec_tags: Vec<SecTag>,
    peer_verify: PeerVerify,
    stream: Stream,
}

impl StdSocket {
    fn new(kind: SocketKind, trust: Arc<TrustStore>, connect_timeout: Duration) -> Self {
        Self {
            kind,
            trust,
            connect_timeout,
            hostname: None,
            sec_tags: Vec::new(),
            peer_verify: PeerVerify::Required,
            stream: Stream::Idle,
        }
    }

    fn tcp(&self) -> io::Result<&TcpStream> {
        match &self.stream {
            Stream::Tcp(tcp) => Ok(tcp),
            #[cfg(feature = "ssl-rustls")]
            Stream::Tls(tls) => Ok(&tls.sock),
            Stream::Idle | Stream::Closed => Err(not_connected()),
        }
    }

    fn ensure_tls_option(&self) -> io::Result<()> {
        if self.kind != SocketKind::Tls12 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "TLS option set on a plain TCP socket",
            ));
        }
        if !matches!(self.stream, Stream::Idle) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "TLS option set after connect",
            ));
        }
        Ok(())
    }

    #[cfg(feature = "ssl-rustls")]
    fn handshake(&self, addr: SocketAddrV4, mut tcp: TcpStream) -> io::Result<Stream> {
        use rustls::pki_types::ServerName;

        let config = tls::client_config(
            &self.trust,
            &self.sec_tags,
            self.peer_verify,
            self.hostname.is_some(),
        )?;

        let server_name: ServerName<'static> = match &self.hostname {
            Some(host) => ServerName::try_from(host.clone())
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?,
            None => ServerName::from(std::net::IpAddr::V4(*addr.ip())),
        };

        let mut conn =
            rustls::ClientConnection::new(Arc::new(config), server_name).map_err(io::Error::other)?;

        tcp.set_read_timeout(Some(self.connect_timeout))?;
        tcp.set_write_timeout(Some(self.connect_timeout))?;
        while conn.is_handshaking() {
            conn.complete_io(&mut tcp)?;
        }

        tracing::debug!("TLS session established with {}", addr);
        Ok(Stream::Tls(Box::new(rustls::StreamOwned::new(conn, tcp))))
    }

    #[cfg(not(feature = "ssl-rustls"))]
    fn handshake(&self, addr: SocketAddrV4, _tcp: TcpStream) -> io::Result<Stream> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("TLS requested for {addr} but no TLS feature enabled"),
        ))
    }
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "socket is not connected")
}

impl Socket for StdSocket {
    fn set_tls_hostname(&mut self, hostname: &str) -> io::Result<()> {
        self.ensure_tls_option()?;
        self.hostname = Some(hostname.to_string());
        Ok(())
    }

    fn set_sec_tag_list(&mut self, tags: &[SecTag]) -> io::Result<()> {
        self.ensure_tls_option()?;
        self.sec_tags = tags.to_vec();
        Ok(())
    }

    fn set_peer_verify(&mut self, level: PeerVerify) -> io::Result<()> {
        self.ensure_tls_option()?;
        self.peer_verify = level;
        Ok(())
    }

    fn connect(&mut self, addr: SocketAddrV4) -> io::Result<()> {
        if !matches!(self.stream, Stream::Idle) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "socket already connected or closed",
            ));
        }

        let tcp = TcpStream::connect_timeout(&SocketAddr::V4(addr), self.connect_timeout)?;
        tracing::debug!("TCP connection established with {}", addr);

        self.stream = match self.kind {
            SocketKind::Tcp => Stream::Tcp(tcp),
            SocketKind::Tls12 => self.handshake(addr, tcp)?,
        };
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        let tcp = self.tcp()?;
        tcp.set_read_timeout(timeout)?;
        tcp.set_write_timeout(timeout)
    }

    fn close(&mut self) -> io::Result<()> {
        match std::mem::replace(&mut self.stream, Stream::Closed) {
            Stream::Tcp(tcp) => shutdown(&tcp),
            #[cfg(feature = "ssl-rustls")]
            Stream::Tls(mut tls) => {
                tls.conn.send_close_notify();
                if let Err(err) = tls.conn.complete_io(&mut tls.sock) {
                    tracing::debug!("Failed to flush TLS close notify: {}", err);
                }
                shutdown(&tls.sock)
            }
            Stream::Idle | Stream::Closed => Ok(()),
        }
    }
}

fn shutdown(tcp: &TcpStream) -> io::Result<()> {
    match tcp.shutdown(Shutdown::Both) {
        Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(err),
        _ => Ok(()),
    }
}

impl Read for StdSocket {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.stream {
            Stream::Tcp(tcp) => tcp.read(buf),
            #[cfg(feature = "ssl-rustls")]
            Stream::Tls(tls) => tls.read(buf),
            Stream::Idle | Stream::Closed => Err(not_connected()),
        }
    }
}

impl Write for StdSocket {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.stream {
            Stream::Tcp(tcp) => tcp.write(buf),
            #[cfg(feature = "ssl-rustls")]
            Stream::Tls(tls) => tls.write(buf),
            Stream::Idle | Stream::Closed => Err(not_connected()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.stream {
            Stream::Tcp(tcp) => tcp.flush(),
            #[cfg(feature = "ssl-rustls")]
            Stream::Tls(tls) => tls.flush(),
            Stream::Idle | Stream::Closed => Err(not_connected()),
        }
    }
}

#[cfg(feature = "ssl-rustls")]
mod tls {
    use super::{PeerVerify, SecTag, TrustStore};
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::client::WebPkiServerVerifier;
    use rustls::crypto::{CryptoProvider, WebPkiSupportedAlgorithms};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, SignatureScheme};
    use std::io;
    use std::sync::Arc;

    /// Applies the socket's verification options on top of webpki.
    ///
    /// Handshake signatures are always checked, only the certificate chain
    /// and name checks are relaxed.
    #[derive(Debug)]
    struct PeerVerifier {
        webpki: Option<Arc<WebPkiServerVerifier>>,
        check_name: bool,
        enforce: bool,
        algorithms: WebPkiSupportedAlgorithms,
    }

    impl ServerCertVerifier for PeerVerifier {
        fn verify_server_cert(
            &self,
            end_entity: &CertificateDer<'_>,
            intermediates: &[CertificateDer<'_>],
            server_name: &ServerName<'_>,
            ocsp_response: &[u8],
            now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            let Some(webpki) = &self.webpki else {
                return Ok(ServerCertVerified::assertion());
            };

            match webpki.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            {
                Ok(verified) => Ok(verified),
                Err(rustls::Error::InvalidCertificate(
                    CertificateError::NotValidForName
                    | CertificateError::NotValidForNameContext { .. },
                )) if !self.check_name => Ok(ServerCertVerified::assertion()),
                Err(err) if !self.enforce => {
                    tracing::warn!("Accepting unverified peer certificate: {}", err);
                    Ok(ServerCertVerified::assertion())
                }
                Err(err) => Err(err),
            }
        }

        fn verify_tls12_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls12_signature(message, cert, dss, &self.algorithms)
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            rustls::crypto::verify_tls13_signature(message, cert, dss, &self.algorithms)
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.algorithms.supported_schemes()
        }
    }

    pub(super) fn client_config(
        trust: &TrustStore,
        sec_tags: &[SecTag],
        level: PeerVerify,
        check_name: bool,
    ) -> io::Result<ClientConfig> {
        let provider: Arc<CryptoProvider> = Arc::new(rustls::crypto::ring::default_provider());

        let webpki = match level {
            PeerVerify::None => None,
            PeerVerify::Optional | PeerVerify::Required => {
                let roots = trust
                    .root_store(sec_tags)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;

                match WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
                    .build()
                {
                    Ok(verifier) => Some(verifier),
                    Err(err) if level == PeerVerify::Optional => {
                        tracing::warn!("No usable trust anchors, peer left unverified: {}", err);
                        None
                    }
                    Err(err) => return Err(io::Error::new(io::ErrorKind::InvalidInput, err)),
                }
            }
        };

        let verifier = Arc::new(PeerVerifier {
            webpki,
            check_name,
            enforce: level == PeerVerify::Required,
            algorithms: provider.signature_verification_algorithms,
        });

        let config = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS12])
            .map_err(io::Error::other)?
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();

        Ok(config)
    }
}
