//! The per-request state container and its lifecycle operations.
//!
//! A [`RequestContext`] is driven through `init`, any number of `setopt`
//! calls and one `execute`. Each operation returns a `Result`; the errno
//! of the last failure stays available through
//! [`RequestContext::last_error`].

use crate::config::RequestsConfig;
use crate::connect::{ConnectionEstablisher, OwnedSocket, TlsPolicy};
use crate::errors::RequestsError;
use crate::method::Method;
use crate::netif::HostStack;
use crate::options::{OptionStore, RequestOption};
use crate::readiness::{ReadinessGate, ResolvedAddress};
use crate::response::{DiscardHandler, ResponseHandler};
use crate::transport::{Exchange, RequestDescriptor};
use crate::url::{redact_userinfo, UrlFields, UrlParser};
use std::fmt;

/// State of one HTTP request.
///
/// Not meant to be shared between threads; use one context per request.
pub struct RequestContext {
    host: HostStack,
    config: RequestsConfig,
    fields: Option<UrlFields>,
    address: Option<ResolvedAddress>,
    method: Option<Method>,
    options: Option<OptionStore>,
    recv_buffer: Vec<u8>,
    socket: Option<OwnedSocket>,
    status_code: Option<u16>,
    last_error: i32,
}

impl RequestContext {
    #[must_use]
    pub fn new(host: HostStack, config: RequestsConfig) -> Self {
        Self {
            host,
            config,
            fields: None,
            address: None,
            method: None,
            options: None,
            recv_buffer: Vec::new(),
            socket: None,
            status_code: None,
            last_error: 0,
        }
    }

    /// Resets the context, parses `url` and resolves its host.
    ///
    /// # Errors
    ///
    /// - [`RequestsError::Config`] when the configuration is invalid
    /// - [`RequestsError::Parse`] for malformed URLs
    /// - [`RequestsError::NetworkNotReady`], [`RequestsError::DnsResolutionFailed`]
    ///   or [`RequestsError::UnsupportedAddressFamily`] from the readiness gate
    #[tracing::instrument(skip(self, url), fields(url = %redact_userinfo(url)))]
    pub fn init(&mut self, url: &str) -> Result<(), RequestsError> {
        let result = self.prepare(url);
        self.record(result)
    }

    fn prepare(&mut self, url: &str) -> Result<(), RequestsError> {
        self.reset();
        self.config.validate()?;

        let fields = UrlParser::from_config(&self.config)
            .parse(url)
            .inspect_err(|_| tracing::error!("URL parsing failed"))?;

        self.options = Some(OptionStore::new(&self.config)?);
        self.recv_buffer = vec![0; self.config.recv_buffer_size];

        let address = ReadinessGate::new(&self.host, &self.config).prepare(&fields);
        self.fields = Some(fields);
        self.address = Some(address?);
        Ok(())
    }

    fn reset(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(err) = socket.close() {
                tracing::debug!("Failed to close stale socket: {}", err);
            }
        }
        self.fields = None;
        self.address = None;
        self.method = None;
        self.options = None;
        self.status_code = None;
        self.last_error = 0;
    }

    /// Stores one request option, overwriting its previous value.
    ///
    /// # Errors
    ///
    /// - [`RequestsError::InvalidArgument`] before a successful `init`
    /// - [`RequestsError::InvalidOption`] when the value does not fit its
    ///   storage or is malformed
    pub fn setopt(&mut self, option: RequestOption) -> Result<(), RequestsError> {
        let result = match self.options.as_mut() {
            Some(options) => {
                let name = option.name();
                options.apply(option).map_err(|err| {
                    tracing::error!("Rejected {} option: {}", name, err);
                    RequestsError::from(err)
                })
            }
            None => Err(RequestsError::InvalidArgument(
                "setopt called before init".into(),
            )),
        };
        self.record(result)
    }

    /// Connects, performs one `method` request and returns the HTTP status.
    ///
    /// The socket is closed before returning, on success and on every
    /// failure.
    ///
    /// # Errors
    ///
    /// - [`RequestsError::InvalidArgument`] without a successful `init`, or
    ///   when the declared body size exceeds the configured body
    /// - [`RequestsError::ConnectionAborted`] when the socket cannot be set up
    /// - [`RequestsError::Transport`] when the exchange fails
    #[tracing::instrument(skip(self))]
    pub fn execute(&mut self, method: Method) -> Result<u16, RequestsError> {
        self.status_code = None;
        self.method = Some(method);

        let result = self.run(method);
        self.close_socket();

        if let Ok(status) = result {
            self.status_code = Some(status);
        }
        self.record(result)
    }

    fn run(&mut self, method: Method) -> Result<u16, RequestsError> {
        let (Some(fields), Some(address), Some(options)) =
            (self.fields.as_ref(), self.address, self.options.as_mut())
        else {
            tracing::error!("Request context is not initialized");
            return Err(RequestsError::InvalidArgument(
                "execute called without a successful init".into(),
            ));
        };

        let mut taken = options.take_handler();
        let mut discard = DiscardHandler;
        let handler: &mut dyn ResponseHandler = match taken.as_deref_mut() {
            Some(handler) => handler,
            None => &mut discard,
        };

        let outcome = Self::exchange(
            &self.host,
            &self.config,
            fields,
            address,
            options,
            &mut self.socket,
            &mut self.recv_buffer,
            method,
            handler,
        );

        if let Some(handler) = taken {
            options.restore_handler(handler);
        }
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn exchange(
        host: &HostStack,
        config: &RequestsConfig,
        fields: &UrlFields,
        address: ResolvedAddress,
        options: &OptionStore,
        socket_slot: &mut Option<OwnedSocket>,
        recv_buffer: &mut [u8],
        method: Method,
        handler: &mut dyn ResponseHandler,
    ) -> Result<u16, RequestsError> {
        let payload = if method.carries_body() {
            let payload = options.payload().map_err(|err| {
                tracing::error!("Declared body size exceeds the body: {}", err);
                RequestsError::InvalidArgument(err.to_string())
            })?;
            Some(payload)
        } else {
            None
        };

        options.check_content_length(payload).map_err(|err| {
            tracing::error!("Content-Length disagrees with the body: {}", err);
            RequestsError::InvalidArgument(err.to_string())
        })?;

        let tls = fields.is_ssl() || config.force_tls;
        let default_port = if tls {
            config.https_port
        } else {
            config.http_port
        };

        let userinfo = fields.userinfo().map(|info| {
            if info.contains(':') {
                info.to_string()
            } else {
                format!("{info}:")
            }
        });

        let request = RequestDescriptor {
            method,
            uri: fields.uri(),
            host: fields.hostname(),
            host_port: (fields.port() != default_port).then_some(fields.port()),
            headers: options.headers(),
            protocol: options.protocol(),
            credentials: options.credentials().or(userinfo.as_deref()),
            payload,
        };

        let policy = TlsPolicy {
            force_tls: config.force_tls,
            verify_host: options.verify_host(),
            verify_peer: options.verify_peer(),
            sec_tag: config.ca_sec_tag,
        };

        let socket = ConnectionEstablisher::new(host.sockets.as_ref()).connect(
            fields,
            &address,
            &policy,
        )?;
        let socket = socket_slot.insert(socket);

        let status = Exchange::new(socket, recv_buffer, config.request_timeout())
            .run(&request, handler)
            .inspect_err(|err| tracing::error!("Request failed: {}", err))?;

        tracing::debug!("{} {} completed with status {}", method, fields.uri(), status);
        Ok(status)
    }

    fn close_socket(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            if let Err(err) = socket.close() {
                tracing::debug!("Failed to close socket: {}", err);
            }
        }
    }

    fn record<T>(&mut self, result: Result<T, RequestsError>) -> Result<T, RequestsError> {
        self.last_error = match &result {
            Ok(_) => 0,
            Err(err) => err.errno(),
        };
        result
    }

    /// HTTP status of the last successful `execute`.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Negative errno of the last failed operation, 0 after a success.
    #[must_use]
    pub fn last_error(&self) -> i32 {
        self.last_error
    }

    #[must_use]
    pub fn url_fields(&self) -> Option<&UrlFields> {
        self.fields.as_ref()
    }

    #[must_use]
    pub fn resolved_address(&self) -> Option<ResolvedAddress> {
        self.address
    }

    #[must_use]
    pub fn method(&self) -> Option<Method> {
        self.method
    }

    #[must_use]
    pub fn options(&self) -> Option<&OptionStore> {
        self.options.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &RequestsConfig {
        &self.config
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("fields", &self.fields)
            .field("address", &self.address)
            .field("method", &self.method)
            .field("options", &self.options)
            .field("status_code", &self.status_code)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}
