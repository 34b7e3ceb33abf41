use rampart::http::request::{Method, Request};

#[test]
fn test_method_from_str() {
    assert_eq!(Method::from_str("GET"), Some(Method::GET));
    assert_eq!(Method::from_str("POST"), Some(Method::POST));
    assert_eq!(Method::from_str("TRACE"), Some(Method::TRACE));
    assert_eq!(Method::from_str("CONNECT"), Some(Method::CONNECT));
    assert_eq!(Method::from_str("get"), None);
    assert_eq!(Method::from_str("FROB"), None);
}

#[test]
fn test_method_round_trip() {
    for name in ["GET", "POST", "PUT", "DELETE", "HEAD", "OPTIONS", "PATCH"] {
        assert_eq!(Method::from_str(name).unwrap().as_str(), name);
    }
}

#[test]
fn test_request_line_and_query_split() {
    let request = Request::new(Method::GET, "/search?q=rust", "HTTP/1.1");
    assert_eq!(request.request_line, "GET /search?q=rust HTTP/1.1");
    assert_eq!(request.path, "/search");
    assert_eq!(request.param("q"), Some("rust"));
}

#[test]
fn test_header_lookup_is_case_insensitive() {
    let mut request = Request::new(Method::GET, "/", "HTTP/1.1");
    request.push_header("Content-Type", "text/plain");
    assert_eq!(request.header("content-type"), Some("text/plain"));
    assert_eq!(request.header("CONTENT-TYPE"), Some("text/plain"));
}

#[test]
fn test_repeated_header_joins_values() {
    let mut request = Request::new(Method::GET, "/", "HTTP/1.1");
    request.push_header("X-Tag", " one ");
    request.push_header("x-tag", "two");
    assert_eq!(request.header("x-tag"), Some("one;two"));
}

#[test]
fn test_keep_alive_defaults_to_close() {
    let request = Request::new(Method::GET, "/", "HTTP/1.1");
    assert!(!request.keep_alive());
}

#[test]
fn test_keep_alive_honors_connection_header() {
    let mut request = Request::new(Method::GET, "/", "HTTP/1.1");
    request.push_header("Connection", "keep-alive");
    assert!(request.keep_alive());

    let mut request = Request::new(Method::GET, "/", "HTTP/1.1");
    request.push_header("Connection", "Close");
    assert!(!request.keep_alive());
}

#[test]
fn test_content_length_accessor() {
    let mut request = Request::new(Method::POST, "/", "HTTP/1.1");
    assert_eq!(request.content_length(), 0);
    request.push_header("Content-Length", "42");
    assert_eq!(request.content_length(), 42);
}

#[test]
fn test_chunked_detection() {
    let mut request = Request::new(Method::POST, "/", "HTTP/1.1");
    assert!(!request.is_chunked());
    request.push_header("Transfer-Encoding", "chunked");
    assert!(request.is_chunked());
}

#[test]
fn test_cookie_parsing() {
    let mut request = Request::new(Method::GET, "/", "HTTP/1.1");
    request.push_header("Cookie", "session=abc123; theme=dark");
    let cookies = request.cookies();
    assert_eq!(cookies.get("session").map(String::as_str), Some("abc123"));
    assert_eq!(cookies.get("theme").map(String::as_str), Some("dark"));
}

#[test]
fn test_no_cookie_header_means_no_cookies() {
    let request = Request::new(Method::GET, "/", "HTTP/1.1");
    assert!(request.cookies().is_empty());
}

#[test]
fn test_context_map_round_trip() {
    let mut request = Request::new(Method::GET, "/", "HTTP/1.1");
    request.context.insert("user".to_string(), "alice".to_string());
    assert_eq!(request.context.get("user").map(String::as_str), Some("alice"));
}

#[test]
fn test_body_str_lossy() {
    let mut request = Request::new(Method::POST, "/", "HTTP/1.1");
    request.body = b"hello".to_vec();
    assert_eq!(request.body_str(), "hello");
}
