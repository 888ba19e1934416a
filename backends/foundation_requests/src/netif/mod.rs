//! Host network collaborators.
//!
//! The request lifecycle only talks to the host through the traits in this
//! module: a link-state source, an asynchronous DNS resolver and a socket
//! layer with TLS session options. `std` backed implementations are provided
//! for hosted targets, while embedded hosts plug in their own.

mod dns;
mod link;
mod socket;
mod std_socket;
mod trust;

pub use dns::*;
pub use link::*;
pub use socket::*;
pub use std_socket::*;
pub use trust::*;

use crate::config::RequestsConfig;
use std::fmt;
use std::sync::Arc;

/// The host collaborators a [`crate::RequestContext`] drives.
#[derive(Clone)]
pub struct HostStack {
    pub link: Arc<dyn LinkMonitor>,
    pub resolver: Arc<dyn DnsResolver>,
    pub sockets: Arc<dyn SocketProvider>,
}

impl HostStack {
    #[must_use]
    pub fn new(
        link: Arc<dyn LinkMonitor>,
        resolver: Arc<dyn DnsResolver>,
        sockets: Arc<dyn SocketProvider>,
    ) -> Self {
        Self {
            link,
            resolver,
            sockets,
        }
    }

    /// Wires the std implementations: an always-up link, the system
    /// resolver and `TcpStream` sockets with TLS anchored in `trust`.
    #[must_use]
    pub fn system(trust: Arc<TrustStore>, config: &RequestsConfig) -> Self {
        Self {
            link: Arc::new(LinkStateMonitor::up()),
            resolver: Arc::new(SystemDnsResolver::new()),
            sockets: Arc::new(StdSocketProvider::new(trust, config.connect_timeout())),
        }
    }
}

impl fmt::Debug for HostStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostStack").finish_non_exhaustive()
    }
}
