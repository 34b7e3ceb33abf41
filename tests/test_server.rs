use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::time::Duration;

use rampart::config::ServerConfig;
use rampart::error::HttpError;
use rampart::http::handler::{Handler, HandlerResult};
use rampart::http::request::Request;
use rampart::http::response::{Response, StatusCode};
use rampart::server::{ServerBuilder, ServerHandle};

struct OkHandler;

impl Handler for OkHandler {
    fn get(&self, _request: &Request, response: &mut Response) -> HandlerResult {
        response.write("ok");
        Ok(())
    }
}

struct EchoHandler;

impl Handler for EchoHandler {
    fn post(&self, request: &Request, response: &mut Response) -> HandlerResult {
        response.write(&request.body);
        Ok(())
    }
}

struct PanicHandler;

impl Handler for PanicHandler {
    fn get(&self, _request: &Request, _response: &mut Response) -> HandlerResult {
        panic!("kaboom");
    }
}

struct GuardedHandler;

impl Handler for GuardedHandler {
    fn get(&self, _request: &Request, _response: &mut Response) -> HandlerResult {
        Err(HttpError::new(StatusCode::Unauthorized, "login required"))
    }
}

struct FileHandler {
    path: PathBuf,
}

impl Handler for FileHandler {
    fn get(&self, _request: &Request, response: &mut Response) -> HandlerResult {
        response.write_file(&self.path).expect("test file readable");
        Ok(())
    }
}

fn start(configure: impl FnOnce(ServerBuilder) -> ServerBuilder) -> (SocketAddr, ServerHandle) {
    start_with_config(ServerConfig::default(), configure)
}

fn start_with_config(
    config: ServerConfig,
    configure: impl FnOnce(ServerBuilder) -> ServerBuilder,
) -> (SocketAddr, ServerHandle) {
    let builder =
        ServerBuilder::with_config(config).bind_addr("127.0.0.1:0".parse().unwrap());
    let server = configure(builder).build().unwrap();
    let addr = server.local_addrs()[0];
    let handle = server.start().unwrap();
    (addr, handle)
}

fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.set_nodelay(true).unwrap();
    stream
}

struct RawResponse {
    status_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl RawResponse {
    fn status(&self) -> u16 {
        self.status_line
            .split(' ')
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn read_response(stream: &mut TcpStream) -> RawResponse {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).expect("read response head");
        assert!(n > 0, "connection closed before the response head arrived");
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8(buf[..head_end].to_vec()).unwrap();
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| {
            line.split_once(':')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).expect("read response body");
        assert!(n > 0, "connection closed mid-body");
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    RawResponse {
        status_line,
        headers,
        body,
    }
}

/// Reads until the peer closes; passes only if EOF arrives.
fn assert_closed(stream: &mut TcpStream) {
    let mut chunk = [0u8; 64];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => return,
            Ok(_) => continue,
            Err(e) => panic!("expected the server to close the connection, got {e}"),
        }
    }
}

#[test]
fn test_get_registered_route() {
    let (addr, handle) = start(|b| b.route("/", OkHandler));

    let mut stream = connect(addr);
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: test\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);

    assert_eq!(response.status(), 200);
    assert_eq!(response.body, b"ok");
    assert_eq!(response.header("Content-Length"), Some("2"));
    assert!(response.header("Server").is_some());

    handle.stop();
    handle.join();
}

#[test]
fn test_unknown_path_yields_404_naming_the_path() {
    let (addr, handle) = start(|b| b.route("/", OkHandler));

    let mut stream = connect(addr);
    stream
        .write_all(b"GET /missing/page HTTP/1.1\r\nHost: test\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);

    assert_eq!(response.status(), 404);
    assert!(String::from_utf8_lossy(&response.body).contains("/missing/page"));
    assert_eq!(response.header("Connection"), Some("close"));
    assert_closed(&mut stream);

    handle.stop();
    handle.join();
}

#[test]
fn test_connection_close_is_never_rearmed() {
    let (addr, handle) = start(|b| b.route("/", OkHandler));

    let mut stream = connect(addr);
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);

    assert_eq!(response.status(), 200);
    assert_eq!(response.header("Connection"), Some("close"));
    assert_closed(&mut stream);

    handle.stop();
    handle.join();
}

#[test]
fn test_post_body_split_across_three_reads() {
    let (addr, handle) = start(|b| b.route("/echo", EchoHandler));

    let mut stream = connect(addr);
    stream
        .write_all(b"POST /echo HTTP/1.1\r\nHost: test\r\nContent-Length: 5\r\n\r\n")
        .unwrap();
    for piece in [&b"he"[..], &b"ll"[..], &b"o"[..]] {
        std::thread::sleep(Duration::from_millis(50));
        stream.write_all(piece).unwrap();
        stream.flush().unwrap();
    }

    let response = read_response(&mut stream);
    assert_eq!(response.status(), 200);
    assert_eq!(response.body, b"hello");

    handle.stop();
    handle.join();
}

#[test]
fn test_keep_alive_serves_sequential_requests_on_one_socket() {
    let (addr, handle) = start(|b| b.route("/", OkHandler));

    let mut stream = connect(addr);
    for _ in 0..2 {
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: test\r\nConnection: keep-alive\r\n\r\n")
            .unwrap();
        let response = read_response(&mut stream);
        assert_eq!(response.status(), 200);
        assert_eq!(response.body, b"ok");
        assert_eq!(response.header("Connection"), Some("Keep-Alive"));
    }

    handle.stop();
    handle.join();
}

#[test]
fn test_expect_continue_round_trip() {
    let (addr, handle) = start(|b| b.route("/echo", EchoHandler));

    let mut stream = connect(addr);
    stream
        .write_all(
            b"POST /echo HTTP/1.1\r\nHost: test\r\nConnection: keep-alive\r\n\
              Expect: 100-continue\r\nContent-Length: 5\r\n\r\n",
        )
        .unwrap();

    let interim = read_response(&mut stream);
    assert_eq!(interim.status(), 100);
    assert!(interim.body.is_empty());

    stream.write_all(b"hello").unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status(), 200);
    assert_eq!(response.body, b"hello");

    handle.stop();
    handle.join();
}

#[test]
fn test_connect_method_is_refused_without_a_handler() {
    let (addr, handle) = start(|b| b.route("/", OkHandler));

    let mut stream = connect(addr);
    stream
        .write_all(b"CONNECT example.com:443 HTTP/1.1\r\nHost: test\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status(), 405);

    handle.stop();
    handle.join();
}

#[test]
fn test_unimplemented_verb_returns_501() {
    let (addr, handle) = start(|b| b.route("/", OkHandler));

    let mut stream = connect(addr);
    stream
        .write_all(b"POST / HTTP/1.1\r\nHost: test\r\nContent-Length: 0\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status(), 501);

    handle.stop();
    handle.join();
}

#[test]
fn test_handler_declared_error_becomes_its_status() {
    let (addr, handle) = start(|b| b.route("/private", GuardedHandler));

    let mut stream = connect(addr);
    stream
        .write_all(b"GET /private HTTP/1.1\r\nHost: test\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);

    assert_eq!(response.status(), 401);
    assert!(String::from_utf8_lossy(&response.body).contains("login required"));
    // authentication failures close the connection regardless of keep-alive
    assert_eq!(response.header("Connection"), Some("close"));
    assert_closed(&mut stream);

    handle.stop();
    handle.join();
}

#[test]
fn test_panicking_handler_becomes_500_with_diagnostic() {
    let (addr, handle) = start(|b| b.route("/boom", PanicHandler));

    let mut stream = connect(addr);
    stream
        .write_all(b"GET /boom HTTP/1.1\r\nHost: test\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);

    assert_eq!(response.status(), 500);
    assert!(String::from_utf8_lossy(&response.body).contains("kaboom"));

    handle.stop();
    handle.join();
}

#[test]
fn test_malformed_request_yields_400_and_close() {
    let (addr, handle) = start(|b| b.route("/", OkHandler));

    let mut stream = connect(addr);
    stream.write_all(b"FROB / HTTP/1.1\r\n\r\n").unwrap();
    let response = read_response(&mut stream);

    assert_eq!(response.status(), 400);
    assert_eq!(response.header("Connection"), Some("close"));
    assert_closed(&mut stream);

    handle.stop();
    handle.join();
}

#[test]
fn test_file_response_arrives_byte_for_byte() {
    let path = std::env::temp_dir().join("rampart-test-file-transfer.bin");
    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, &payload).unwrap();

    let (addr, handle) = start(|b| {
        b.route(
            "/download",
            FileHandler {
                path: path.clone(),
            },
        )
    });

    let mut stream = connect(addr);
    stream
        .write_all(b"GET /download HTTP/1.1\r\nHost: test\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);

    assert_eq!(response.status(), 200);
    assert_eq!(response.header("Content-Length"), Some("100000"));
    assert_eq!(response.body, payload);

    handle.stop();
    handle.join();
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_idle_keep_alive_connection_is_closed_by_its_timer() {
    let config = ServerConfig {
        keep_alive_timeout_ms: 300,
        ..ServerConfig::default()
    };
    let (addr, handle) = start_with_config(config, |b| b.route("/", OkHandler));

    let mut stream = connect(addr);
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: test\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    let response = read_response(&mut stream);
    assert_eq!(response.status(), 200);

    // sit idle past the keep-alive deadline; the reactor should hang up
    assert_closed(&mut stream);

    handle.stop();
    handle.join();
}
