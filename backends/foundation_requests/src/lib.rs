//! Minimal blocking HTTP(S) client over a pluggable host network stack.
//!
//! A request runs through a fixed lifecycle: the URL is parsed into
//! [`url::UrlFields`], the [`readiness::ReadinessGate`] waits for the link to
//! come up and resolves the host, the [`connect::ConnectionEstablisher`] opens
//! a TCP or TLS socket, and [`context::RequestContext::execute`] performs one
//! request/response exchange, streaming the body to a
//! [`response::ResponseHandler`] fragment by fragment.
//!
//! ```no_run
//! use foundation_requests::{
//!     HandlerAction, HostStack, Method, RequestContext, RequestOption, RequestsConfig,
//!     ResponseFragment, TrustStore,
//! };
//! use std::sync::Arc;
//!
//! let config = RequestsConfig::default();
//! let host = HostStack::system(Arc::new(TrustStore::empty()), &config);
//!
//! let mut ctx = RequestContext::new(host, config);
//! ctx.init("http://example.com/").expect("init");
//! ctx.setopt(RequestOption::handler(|fragment: &ResponseFragment<'_>| {
//!     print!("{}", String::from_utf8_lossy(fragment.body));
//!     HandlerAction::Continue
//! }))
//! .expect("handler");
//!
//! let status = ctx.execute(Method::Get).expect("request");
//! println!("status: {status}");
//! ```

pub mod buffers;
pub mod config;
pub mod connect;
pub mod context;
pub mod errors;
pub mod method;
pub mod netif;
pub mod options;
pub mod readiness;
pub mod response;
pub mod synca;
pub mod transport;
pub mod url;

pub use buffers::*;
pub use config::*;
pub use connect::*;
pub use context::*;
pub use errors::*;
pub use method::*;
pub use netif::*;
pub use options::*;
pub use readiness::*;
pub use response::*;
pub use transport::*;
pub use url::{Scheme, UrlError, UrlField, UrlFields, UrlParser};
