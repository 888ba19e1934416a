//! End to end requests against a loopback HTTP server.
//!
//! WHY: The std socket provider, resolver shortcut for IPv4 literals and the
//! transport must work together over a real TCP connection.
//!
//! WHAT: A one-shot server thread answers a single request on 127.0.0.1,
//! while the client runs the full init/setopt/execute lifecycle.

use foundation_requests::{
    CollectingHandler, Finality, HostStack, Method, RequestContext, RequestOption,
    RequestsConfig, RequestsError, TransportError, TrustStore,
};
use ntest::timeout;
use serial_test::serial;
use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing_test::traced_test;

/// Request as seen by the server: head text and body bytes.
struct Received {
    head: String,
    body: Vec<u8>,
}

fn read_request(stream: &mut TcpStream) -> Received {
    let mut data = Vec::new();
    let mut buf = [0u8; 512];

    let head_end = loop {
        let read = stream.read(&mut buf).expect("should read request");
        assert!(read > 0, "client closed before sending a full head");
        data.extend_from_slice(&buf[..read]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8(data[..head_end].to_vec()).expect("head should be UTF-8");
    let length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    let mut body = data[head_end..].to_vec();
    while body.len() < length {
        let read = stream.read(&mut buf).expect("should read body");
        assert!(read > 0, "client closed before sending the body");
        body.extend_from_slice(&buf[..read]);
    }

    Received { head, body }
}

/// Serves one connection with `respond`, returning what the client sent.
fn serve_once<F>(respond: F) -> (u16, JoinHandle<Received>)
where
    F: FnOnce(&Received, &mut TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("should bind");
    let port = listener.local_addr().expect("should have addr").port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("should accept");
        let received = read_request(&mut stream);
        respond(&received, &mut stream);
        received
    });

    (port, handle)
}

fn context() -> RequestContext {
    let config = RequestsConfig::default()
        .with_link_timeout(Duration::from_secs(1))
        .with_request_timeout(Duration::from_secs(3))
        .with_connect_timeout(Duration::from_secs(2));
    let host = HostStack::system(Arc::new(TrustStore::empty()), &config);
    RequestContext::new(host, config)
}

/// WHY: A plain GET must reach the server and stream the body back
/// WHAT: The body arrives intact, the last fragment is final
#[test]
#[traced_test]
#[serial]
fn test_get_against_loopback_server() {
    let (port, server) = serve_once(|_, stream| {
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\nhello world")
            .expect("should respond");
    });

    let collector = CollectingHandler::new();
    let mut ctx = context();
    ctx.init(&format!("http://127.0.0.1:{port}/greeting?lang=en"))
        .expect("init should succeed");
    ctx.setopt(RequestOption::handler(collector.clone()))
        .expect("handler should be accepted");

    let status = ctx.execute(Method::Get).expect("request should succeed");
    assert_eq!(status, 200);
    assert_eq!(collector.body(), b"hello world");
    assert_eq!(
        collector.fragments().last().map(|f| f.finality),
        Some(Finality::Final)
    );

    let received = server.join().expect("server should finish");
    assert!(received
        .head
        .starts_with("GET /greeting?lang=en HTTP/1.1\r\n"));
    assert!(received
        .head
        .contains(&format!("Host: 127.0.0.1:{port}\r\n")));
    assert!(received.head.contains("Connection: close\r\n"));
}

#[test]
#[serial]
#[timeout(10000)]
fn test_put_body_reaches_server() {
    let (port, server) = serve_once(|received, stream| {
        let reply = format!(
            "HTTP/1.1 201 Created\r\nContent-Length: {}\r\n\r\n",
            received.body.len()
        );
        stream.write_all(reply.as_bytes()).expect("should respond");
        stream.write_all(&received.body).expect("should echo");
    });

    let collector = CollectingHandler::new();
    let mut ctx = context();
    ctx.init(&format!("http://127.0.0.1:{port}/items/1"))
        .expect("init should succeed");
    ctx.setopt(RequestOption::headers(["Content-Type: application/json"]))
        .expect("headers should be accepted");
    ctx.setopt(RequestOption::body(r#"{"name":"lamp"}"#))
        .expect("body should fit");
    ctx.setopt(RequestOption::handler(collector.clone()))
        .expect("handler should be accepted");

    assert_eq!(ctx.execute(Method::Put).expect("request should succeed"), 201);
    assert_eq!(collector.body(), br#"{"name":"lamp"}"#);

    let received = server.join().expect("server should finish");
    assert!(received.head.starts_with("PUT /items/1 HTTP/1.1\r\n"));
    assert!(received.head.contains("Content-Length: 15\r\n"));
    assert_eq!(received.body, br#"{"name":"lamp"}"#);
}

/// WHY: Servers without Content-Length delimit the body by closing
/// WHAT: The body is read until EOF and ends with an empty final fragment
#[test]
#[serial]
#[timeout(10000)]
fn test_body_until_close() {
    let (port, server) = serve_once(|_, stream| {
        stream
            .write_all(b"HTTP/1.0 200 OK\r\n\r\nstreamed until close")
            .expect("should respond");
    });

    let collector = CollectingHandler::new();
    let mut ctx = context();
    ctx.init(&format!("http://127.0.0.1:{port}/"))
        .expect("init should succeed");
    ctx.setopt(RequestOption::handler(collector.clone()))
        .expect("handler should be accepted");

    assert_eq!(ctx.execute(Method::Get).expect("request should succeed"), 200);
    server.join().expect("server should finish");

    assert_eq!(collector.body(), b"streamed until close");
    let last = collector.fragments().pop().expect("should have fragments");
    assert!(last.body.is_empty());
    assert_eq!(last.finality, Finality::Final);
}

#[test]
#[serial]
#[timeout(10000)]
fn test_silent_server_times_out() {
    let (port, server) = serve_once(|_, _stream| {
        thread::sleep(Duration::from_millis(1500));
    });

    let config = RequestsConfig::default().with_request_timeout(Duration::from_millis(300));
    let host = HostStack::system(Arc::new(TrustStore::empty()), &config);
    let mut ctx = RequestContext::new(host, config);
    ctx.init(&format!("http://127.0.0.1:{port}/slow"))
        .expect("init should succeed");

    let err = ctx.execute(Method::Get).expect_err("request should time out");
    assert!(matches!(err, RequestsError::Transport(TransportError::Timeout)));
    server.join().expect("server should finish");
}

#[test]
#[serial]
#[timeout(10000)]
fn test_refused_connection_is_aborted() {
    let port = {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("should bind");
        listener.local_addr().expect("should have addr").port()
    };

    let mut ctx = context();
    ctx.init(&format!("http://127.0.0.1:{port}/"))
        .expect("init should succeed");

    let err = ctx.execute(Method::Get).expect_err("connect should fail");
    assert!(matches!(err, RequestsError::ConnectionAborted(_)));
    assert_eq!(ctx.status_code(), None);
}
