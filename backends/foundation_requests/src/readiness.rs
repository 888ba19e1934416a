//! Link readiness and name resolution ahead of a connection.
//!
//! Both waits block the calling thread on a [`Completion`] created for the
//! current request, so two contexts resolving at the same time never share
//! a wait handle.

use crate::config::RequestsConfig;
use crate::errors::RequestsError;
use crate::netif::{
    AddrInfo, DnsError, DnsResolver, DnsStatus, HostStack, LinkEvent, LinkMonitor, QueryType,
};
use crate::synca::Completion;
use crate::url::UrlFields;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddrV4};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// IPv4 endpoint produced by the [`ReadinessGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedAddress {
    ip: Ipv4Addr,
    port: u16,
}

impl ResolvedAddress {
    #[must_use]
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    #[must_use]
    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Raw address bytes in network order.
    #[must_use]
    pub fn octets(&self) -> [u8; 4] {
        self.ip.octets()
    }

    #[must_use]
    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.port)
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Partial answers gathered by one DNS query.
#[derive(Debug, Default)]
struct Candidates {
    first_ipv4: Option<Ipv4Addr>,
    rejected: usize,
}

/// Waits for the link and resolves the host of a parsed URL.
pub struct ReadinessGate<'a> {
    link: &'a dyn LinkMonitor,
    resolver: &'a dyn DnsResolver,
    link_timeout: Duration,
    dns_timeout: Duration,
}

impl<'a> ReadinessGate<'a> {
    #[must_use]
    pub fn new(host: &'a HostStack, config: &RequestsConfig) -> Self {
        Self {
            link: host.link.as_ref(),
            resolver: host.resolver.as_ref(),
            link_timeout: config.link_timeout(),
            dns_timeout: config.dns_timeout(),
        }
    }

    /// Waits for the link, then resolves `fields`' hostname.
    ///
    /// # Errors
    ///
    /// See [`ReadinessGate::wait_for_link`] and [`ReadinessGate::resolve`].
    pub fn prepare(&self, fields: &UrlFields) -> Result<ResolvedAddress, RequestsError> {
        self.wait_for_link()?;
        self.resolve(fields)
    }

    /// Blocks until the link reports up.
    ///
    /// # Errors
    ///
    /// Returns [`RequestsError::NetworkNotReady`] when no up event arrives
    /// within the link timeout.
    pub fn wait_for_link(&self) -> Result<(), RequestsError> {
        let ready = Arc::new(Completion::<()>::new());

        let signal = ready.clone();
        let id = self.link.subscribe(Arc::new(move |event: LinkEvent| {
            if event == LinkEvent::Up {
                signal.complete(());
            }
        }));

        // events are edge triggered, replay the current state
        self.link.resend_status();

        let result = ready.wait_timeout(self.link_timeout);
        self.link.unsubscribe(id);

        if result.is_none() {
            tracing::error!("Network connection timeout");
            return Err(RequestsError::NetworkNotReady(self.link_timeout));
        }

        tracing::debug!("Network link is up");
        Ok(())
    }

    /// Resolves the hostname of `fields` to an IPv4 endpoint.
    ///
    /// Dotted IPv4 literals are used as is. Otherwise an A query is issued
    /// and the first IPv4 answer is kept once the query reports its final
    /// status.
    ///
    /// # Errors
    ///
    /// - [`RequestsError::DnsResolutionFailed`] when the query cannot start,
    ///   times out, or ends canceled, failed or without data
    /// - [`RequestsError::UnsupportedAddressFamily`] when only non-IPv4
    ///   addresses were returned
    pub fn resolve(&self, fields: &UrlFields) -> Result<ResolvedAddress, RequestsError> {
        let host = fields.hostname();
        let port = fields.port();

        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            tracing::debug!("Using literal address {}", ip);
            return Ok(ResolvedAddress::new(ip, port));
        }
        if host.parse::<Ipv6Addr>().is_ok() {
            tracing::error!("Unsupported address family for {}", host);
            return Err(RequestsError::UnsupportedAddressFamily(host.to_string()));
        }

        let candidates = Arc::new(Mutex::new(Candidates::default()));
        let done = Arc::new(Completion::<DnsStatus>::new());

        let (sink, signal) = (candidates.clone(), done.clone());
        let callback = Box::new(move |status: DnsStatus, info: Option<AddrInfo>| {
            if let Some(info) = info {
                let mut found = sink.lock().unwrap_or_else(PoisonError::into_inner);
                match info.addr {
                    IpAddr::V4(ip) => {
                        if found.first_ipv4.is_none() {
                            found.first_ipv4 = Some(ip);
                        }
                    }
                    IpAddr::V6(ip) => {
                        tracing::warn!("Ignoring non-IPv4 DNS answer {}", ip);
                        found.rejected += 1;
                    }
                }
            }

            if status.is_final() {
                signal.complete(status);
            }
        });

        self.resolver
            .get_addr_info(host, QueryType::A, self.dns_timeout, callback)
            .map_err(|err| {
                tracing::error!("Cannot resolve IPv4 address ({})", err);
                err
            })?;

        let Some(status) = done.wait_timeout(self.dns_timeout) else {
            tracing::error!("DNS query for {} timed out", host);
            return Err(DnsError::Timeout(host.to_string()).into());
        };

        let found = candidates.lock().unwrap_or_else(PoisonError::into_inner);
        let address = match (status, found.first_ipv4) {
            (DnsStatus::AllDone | DnsStatus::InProgress, Some(ip)) => ResolvedAddress::new(ip, port),
            (DnsStatus::AllDone | DnsStatus::InProgress, None) if found.rejected > 0 => {
                tracing::error!("Unsupported address family for {}", host);
                return Err(RequestsError::UnsupportedAddressFamily(host.to_string()));
            }
            (DnsStatus::Canceled, _) => {
                tracing::error!("DNS query for {} was canceled", host);
                return Err(DnsError::Canceled(host.to_string()).into());
            }
            (DnsStatus::Failed, _) => {
                tracing::error!("DNS query for {} failed", host);
                return Err(DnsError::ResolutionFailed(host.to_string()).into());
            }
            (DnsStatus::AllDone | DnsStatus::InProgress | DnsStatus::NoData, _) => {
                tracing::error!("No DNS data for {}", host);
                return Err(DnsError::NoAddressesFound(host.to_string()).into());
            }
        };

        tracing::debug!("Resolved {} to {}", host, address);
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netif::{
        LinkStateMonitor, MockDnsResolver, SocketProvider, StdSocketProvider, TrustStore,
    };
    use std::thread;
    use std::time::Instant;

    fn host(link: Arc<LinkStateMonitor>, resolver: MockDnsResolver) -> HostStack {
        let sockets: Arc<dyn SocketProvider> = Arc::new(StdSocketProvider::new(
            Arc::new(TrustStore::empty()),
            Duration::from_secs(1),
        ));
        HostStack::new(link, Arc::new(resolver), sockets)
    }

    fn config() -> RequestsConfig {
        RequestsConfig::default()
            .with_link_timeout(Duration::from_millis(100))
            .with_dns_timeout(Duration::from_millis(100))
    }

    fn resolve(resolver: MockDnsResolver, url: &str) -> Result<ResolvedAddress, RequestsError> {
        let stack = host(Arc::new(LinkStateMonitor::up()), resolver);
        let fields = UrlFields::parse(url).unwrap();
        ReadinessGate::new(&stack, &config()).prepare(&fields)
    }

    #[test]
    fn test_link_already_up_passes_immediately() {
        let link = Arc::new(LinkStateMonitor::up());
        let stack = host(link.clone(), MockDnsResolver::new());

        ReadinessGate::new(&stack, &config()).wait_for_link().unwrap();
        assert_eq!(link.subscriber_count(), 0);
    }

    #[test]
    fn test_link_down_times_out() {
        let link = Arc::new(LinkStateMonitor::default());
        let stack = host(link.clone(), MockDnsResolver::new());

        let err = ReadinessGate::new(&stack, &config())
            .wait_for_link()
            .unwrap_err();
        assert!(matches!(err, RequestsError::NetworkNotReady(_)));
        assert_eq!(link.subscriber_count(), 0);
    }

    /// WHY: The link may come up while the gate is already waiting
    /// WHAT: A later Up transition releases the waiter
    #[test]
    fn test_link_coming_up_later_releases_wait() {
        let link = Arc::new(LinkStateMonitor::default());
        let stack = host(link.clone(), MockDnsResolver::new());
        let config = config().with_link_timeout(Duration::from_secs(5));

        let driver = link.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            driver.set_state(LinkEvent::Up);
        });

        ReadinessGate::new(&stack, &config).wait_for_link().unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_first_ipv4_answer_wins() {
        let resolver = MockDnsResolver::new().with_response(
            "example.com",
            vec![
                "2001:db8::1".parse().unwrap(),
                "192.0.2.10".parse().unwrap(),
                "192.0.2.11".parse().unwrap(),
            ],
        );

        let address = resolve(resolver, "https://example.com/").unwrap();
        assert_eq!(address, ResolvedAddress::new(Ipv4Addr::new(192, 0, 2, 10), 443));
    }

    #[test]
    fn test_only_ipv6_answers_are_unsupported() {
        let resolver = MockDnsResolver::new()
            .with_response("v6.test", vec!["2001:db8::1".parse().unwrap()]);

        let err = resolve(resolver, "http://v6.test/").unwrap_err();
        assert!(matches!(err, RequestsError::UnsupportedAddressFamily(_)));
    }

    #[test]
    fn test_final_failure_statuses_map_to_dns_errors() {
        for (status, expected) in [
            (DnsStatus::Canceled, "canceled"),
            (DnsStatus::Failed, "failed"),
            (DnsStatus::NoData, "No addresses"),
        ] {
            let resolver = MockDnsResolver::new().with_status("x.test", status);
            let err = resolve(resolver, "http://x.test/").unwrap_err();
            assert!(matches!(err, RequestsError::DnsResolutionFailed(_)));
            assert!(err.to_string().contains(expected), "{err}");
        }
    }

    /// WHY: A resolver that never answers must not hang the caller
    /// WHAT: The wait ends after the DNS timeout with a timeout error
    #[test]
    fn test_silent_resolver_times_out() {
        let resolver = MockDnsResolver::new().with_silence("slow.test");
        let started = Instant::now();

        let err = resolve(resolver, "http://slow.test/").unwrap_err();
        assert!(matches!(
            err,
            RequestsError::DnsResolutionFailed(DnsError::Timeout(_))
        ));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_rejected_query_fails_resolution() {
        let resolver = MockDnsResolver::new()
            .with_error("bad.test", DnsError::QueryRejected("busy".into()));
        let err = resolve(resolver, "http://bad.test/").unwrap_err();
        assert!(matches!(
            err,
            RequestsError::DnsResolutionFailed(DnsError::QueryRejected(_))
        ));
    }

    #[test]
    fn test_ipv4_literal_skips_dns() {
        let resolver = MockDnsResolver::new();
        let counter = resolver.clone();

        let address = resolve(resolver, "http://10.1.2.3:8080/").unwrap();
        assert_eq!(
            address.socket_addr(),
            "10.1.2.3:8080".parse::<SocketAddrV4>().unwrap()
        );
        assert_eq!(counter.query_count(), 0);
    }
}
