use derive_more::From;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Record type of a DNS query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// IPv4 address records.
    A,
    /// IPv6 address records.
    Aaaa,
}

/// Status reported to a [`DnsCallback`].
///
/// `InProgress` accompanies each candidate address; every other status is
/// final and is reported exactly once per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsStatus {
    InProgress,
    AllDone,
    Canceled,
    Failed,
    NoData,
}

impl DnsStatus {
    #[must_use]
    pub fn is_final(self) -> bool {
        self != Self::InProgress
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Inet,
    Inet6,
}

/// One candidate address produced by a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrInfo {
    pub addr: IpAddr,
}

impl AddrInfo {
    #[must_use]
    pub fn new(addr: IpAddr) -> Self {
        Self { addr }
    }

    #[must_use]
    pub fn family(&self) -> AddressFamily {
        match self.addr {
            IpAddr::V4(_) => AddressFamily::Inet,
            IpAddr::V6(_) => AddressFamily::Inet6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(pub u64);

/// Receives the partial results and final status of one query.
pub type DnsCallback = Box<dyn FnMut(DnsStatus, Option<AddrInfo>) + Send>;

/// DNS resolution errors.
#[derive(From, Debug, Clone, PartialEq, Eq)]
pub enum DnsError {
    /// The resolver reported a failure for the given hostname.
    #[from(ignore)]
    ResolutionFailed(String),

    /// Invalid hostname provided.
    #[from(ignore)]
    InvalidHost(String),

    /// The resolver answered without any address.
    #[from(ignore)]
    NoAddressesFound(String),

    /// The query was canceled before completing.
    #[from(ignore)]
    Canceled(String),

    /// No completion arrived within the wait.
    #[from(ignore)]
    Timeout(String),

    /// The resolver refused to start the query.
    #[from(ignore)]
    QueryRejected(String),

    /// I/O error during DNS resolution.
    #[from(ignore)]
    IoError(String),
}

impl From<io::Error> for DnsError {
    fn from(err: io::Error) -> Self {
        DnsError::IoError(err.to_string())
    }
}

impl std::error::Error for DnsError {}

impl core::fmt::Display for DnsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResolutionFailed(host) => write!(f, "DNS resolution failed for host: {host}"),
            Self::InvalidHost(host) => write!(f, "Invalid hostname: {host}"),
            Self::NoAddressesFound(host) => write!(f, "No addresses found for host: {host}"),
            Self::Canceled(host) => write!(f, "DNS query canceled for host: {host}"),
            Self::Timeout(host) => write!(f, "DNS query timed out for host: {host}"),
            Self::QueryRejected(msg) => write!(f, "DNS query could not be started: {msg}"),
            Self::IoError(err) => write!(f, "I/O error during DNS resolution: {err}"),
        }
    }
}

/// Asynchronous resolver contract.
///
/// `get_addr_info` starts a query and returns at once; results are pushed
/// into `callback`, possibly from another thread, possibly before
/// `get_addr_info` returns.
pub trait DnsResolver: Send + Sync {
    /// Starts a query for `host`.
    ///
    /// # Errors
    ///
    /// Returns `DnsError` when the query cannot be started; the callback is
    /// then never invoked.
    fn get_addr_info(
        &self,
        host: &str,
        query: QueryType,
        timeout: Duration,
        callback: DnsCallback,
    ) -> Result<QueryId, DnsError>;
}

/// System DNS resolver using `std::net::ToSocketAddrs`.
///
/// Each query runs on its own worker thread, so the lookup itself is only
/// bounded by the caller's wait.
#[derive(Debug, Default)]
pub struct SystemDnsResolver {
    next_id: AtomicU64,
}

impl SystemDnsResolver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
        }
    }
}

impl DnsResolver for SystemDnsResolver {
    fn get_addr_info(
        &self,
        host: &str,
        query: QueryType,
        timeout: Duration,
        mut callback: DnsCallback,
    ) -> Result<QueryId, DnsError> {
        if host.is_empty() {
            return Err(DnsError::InvalidHost(host.to_string()));
        }

        let id = QueryId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let host = host.to_string();

        tracing::debug!("Starting DNS query {:?} for {} ({:?})", id, host, timeout);

        thread::Builder::new()
            .name(format!("requests-dns-{}", id.0))
            .spawn(move || {
                let addrs = match (host.as_str(), 0).to_socket_addrs() {
                    Ok(addrs) => addrs,
                    Err(err) => {
                        tracing::error!("DNS resolve of {} failed: {}", host, err);
                        callback(DnsStatus::Failed, None);
                        return;
                    }
                };

                let mut found = false;
                for addr in addrs {
                    let wanted = match query {
                        QueryType::A => addr.is_ipv4(),
                        QueryType::Aaaa => addr.is_ipv6(),
                    };
                    if wanted {
                        found = true;
                        callback(DnsStatus::InProgress, Some(AddrInfo::new(addr.ip())));
                    }
                }

                if found {
                    callback(DnsStatus::AllDone, None);
                } else {
                    callback(DnsStatus::NoData, None);
                }
            })
            .map_err(|err| DnsError::QueryRejected(err.to_string()))?;

        Ok(id)
    }
}

#[derive(Debug, Clone)]
enum MockAnswer {
    Addresses(Vec<IpAddr>),
    Status(DnsStatus),
    Silent,
    Reject(DnsError),
}

/// Mock DNS resolver for testing.
///
/// Answers are delivered synchronously from `get_addr_info`. Hosts without a
/// configured answer get `DnsStatus::NoData`.
#[derive(Debug, Clone, Default)]
pub struct MockDnsResolver {
    answers: Arc<Mutex<HashMap<String, MockAnswer>>>,
    queries: Arc<AtomicUsize>,
}

impl MockDnsResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `host` with `addrs`, in order, followed by `AllDone`.
    #[must_use]
    pub fn with_response(self, host: &str, addrs: Vec<IpAddr>) -> Self {
        self.answer(host, MockAnswer::Addresses(addrs))
    }

    /// Answers `host` with a bare final status.
    #[must_use]
    pub fn with_status(self, host: &str, status: DnsStatus) -> Self {
        self.answer(host, MockAnswer::Status(status))
    }

    /// Accepts queries for `host` but never completes them.
    #[must_use]
    pub fn with_silence(self, host: &str) -> Self {
        self.answer(host, MockAnswer::Silent)
    }

    /// Refuses to start queries for `host`.
    #[must_use]
    pub fn with_error(self, host: &str, error: DnsError) -> Self {
        self.answer(host, MockAnswer::Reject(error))
    }

    /// Number of queries started, including rejected ones.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn answer(self, host: &str, answer: MockAnswer) -> Self {
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.to_string(), answer);
        self
    }
}

impl DnsResolver for MockDnsResolver {
    fn get_addr_info(
        &self,
        host: &str,
        _query: QueryType,
        _timeout: Duration,
        mut callback: DnsCallback,
    ) -> Result<QueryId, DnsError> {
        let count = self.queries.fetch_add(1, Ordering::SeqCst);
        let id = QueryId(count as u64 + 1);

        let answer = self
            .answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned();

        match answer {
            Some(MockAnswer::Addresses(addrs)) => {
                for addr in addrs {
                    callback(DnsStatus::InProgress, Some(AddrInfo::new(addr)));
                }
                callback(DnsStatus::AllDone, None);
            }
            Some(MockAnswer::Status(status)) => callback(status, None),
            // accepted, never answered
            Some(MockAnswer::Silent) => {}
            Some(MockAnswer::Reject(err)) => return Err(err),
            None => callback(DnsStatus::NoData, None),
        }

        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::mpsc;

    fn collect(
        resolver: &dyn DnsResolver,
        host: &str,
    ) -> (Result<QueryId, DnsError>, mpsc::Receiver<(DnsStatus, Option<AddrInfo>)>) {
        let (sender, receiver) = mpsc::channel();
        let result = resolver.get_addr_info(
            host,
            QueryType::A,
            Duration::from_secs(2),
            Box::new(move |status, info| {
                let _ = sender.send((status, info));
            }),
        );
        (result, receiver)
    }

    #[test]
    fn test_mock_resolver_delivers_addresses_then_all_done() {
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let resolver = MockDnsResolver::new().with_response("example.com", vec![addr]);

        let (result, events) = collect(&resolver, "example.com");
        assert!(result.is_ok());

        let events: Vec<_> = events.try_iter().collect();
        assert_eq!(
            events,
            vec![
                (DnsStatus::InProgress, Some(AddrInfo::new(addr))),
                (DnsStatus::AllDone, None),
            ]
        );
        assert_eq!(resolver.query_count(), 1);
    }

    #[test]
    fn test_mock_resolver_unconfigured_host_has_no_data() {
        let resolver = MockDnsResolver::new();
        let (_, events) = collect(&resolver, "unknown.test");
        assert_eq!(events.try_recv().unwrap(), (DnsStatus::NoData, None));
    }

    #[test]
    fn test_mock_resolver_silent_host_never_calls_back() {
        let resolver = MockDnsResolver::new().with_silence("slow.test");
        let (result, events) = collect(&resolver, "slow.test");
        assert!(result.is_ok());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_mock_resolver_rejects_configured_host() {
        let resolver = MockDnsResolver::new()
            .with_error("bad.test", DnsError::QueryRejected("no servers".into()));
        let (result, _) = collect(&resolver, "bad.test");
        assert!(matches!(result, Err(DnsError::QueryRejected(_))));
    }

    /// WHY: The system resolver must honour the A-record contract
    /// WHAT: Resolving localhost yields only IPv4 candidates then a final status
    #[test]
    fn test_system_resolver_localhost() {
        let resolver = SystemDnsResolver::new();
        let (result, events) = collect(&resolver, "localhost");
        assert!(result.is_ok());

        let mut seen_final = false;
        while let Ok((status, info)) = events.recv_timeout(Duration::from_secs(5)) {
            if let Some(info) = info {
                assert_eq!(info.family(), AddressFamily::Inet);
            }
            if status.is_final() {
                seen_final = true;
                break;
            }
        }
        assert!(seen_final);
    }

    #[test]
    fn test_system_resolver_rejects_empty_host() {
        let resolver = SystemDnsResolver::new();
        let (result, _) = collect(&resolver, "");
        assert!(matches!(result, Err(DnsError::InvalidHost(_))));
    }

    #[test]
    fn test_dns_error_display() {
        let error = DnsError::Timeout("example.com".to_string());
        assert!(error.to_string().contains("timed out"));
        assert!(error.to_string().contains("example.com"));
    }
}
