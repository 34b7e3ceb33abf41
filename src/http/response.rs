use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// HTTP status codes emitted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 100 Continue
    Continue,
    /// 200 OK
    Ok,
    /// 201 Created
    Created,
    /// 204 No Content
    NoContent,
    /// 301 Moved Permanently
    MovedPermanently,
    /// 302 Found
    Found,
    /// 304 Not Modified
    NotModified,
    /// 400 Bad Request
    BadRequest,
    /// 401 Unauthorized
    Unauthorized,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 408 Request Timeout
    RequestTimeout,
    /// 413 Payload Too Large
    PayloadTooLarge,
    /// 500 Internal Server Error
    InternalServerError,
    /// 501 Not Implemented
    NotImplemented,
    /// 503 Service Unavailable
    ServiceUnavailable,
}

impl StatusCode {
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Continue => 100,
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::NoContent => 204,
            StatusCode::MovedPermanently => 301,
            StatusCode::Found => 302,
            StatusCode::NotModified => 304,
            StatusCode::BadRequest => 400,
            StatusCode::Unauthorized => 401,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::RequestTimeout => 408,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Continue => "Continue",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::NoContent => "No Content",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::Found => "Found",
            StatusCode::NotModified => "Not Modified",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Unauthorized => "Unauthorized",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::RequestTimeout => "Request Timeout",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// The full HTTP/1.1 status line, terminated with CRLF.
    pub fn line(&self) -> String {
        format!("HTTP/1.1 {} {}\r\n", self.as_u16(), self.reason_phrase())
    }
}

/// Optional cookie attributes for [`Response::set_cookie_opts`].
#[derive(Debug, Clone, Default)]
pub struct CookieOptions {
    /// Seconds from now until the cookie expires; `Some(0)` expires it at
    /// the epoch, `None` makes it a session cookie.
    pub max_age: Option<i64>,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

/// An HTTP response under construction.
///
/// Handlers write into the body buffer; `prepare()` then serializes the
/// status line, headers and cookies and prepends them, producing the byte
/// stream handed to the writer. `reset()` discards everything buffered so an
/// error path can start over.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    buffer: BytesMut,
    file: Option<File>,
    file_len: u64,
    headers_created: bool,
    create_etag: bool,
}

impl Response {
    /// Creates an empty 200 response. The keep-alive decision is fixed at
    /// construction, stored as the `Connection` header.
    pub fn new(keep_alive: bool) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Date".to_string(), http_date(Utc::now()));
        let mut response = Self {
            status: StatusCode::Ok,
            headers,
            cookies: HashMap::new(),
            buffer: BytesMut::with_capacity(4096),
            file: None,
            file_len: 0,
            headers_created: false,
            create_etag: false,
        };
        response.set_keep_alive(keep_alive);
        response
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.as_str())
    }

    /// Sets a header; names are emitted exactly as given here.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn set_content_type(&mut self, content_type: &str) -> &mut Self {
        self.set_header("Content-Type", content_type)
    }

    pub fn set_keep_alive(&mut self, keep_alive: bool) -> &mut Self {
        self.set_header("Connection", if keep_alive { "Keep-Alive" } else { "close" })
    }

    pub fn is_keep_alive(&self) -> bool {
        self.header("Connection").map(|v| v == "Keep-Alive").unwrap_or(false)
    }

    /// Opts this response into ETag computation during `prepare()`.
    pub fn set_create_etag(&mut self, create: bool) -> &mut Self {
        self.create_etag = create;
        self
    }

    pub fn set_cookie(&mut self, name: &str, value: &str) -> &mut Self {
        self.set_cookie_opts(name, value, CookieOptions::default())
    }

    pub fn set_cookie_opts(&mut self, name: &str, value: &str, opts: CookieOptions) -> &mut Self {
        let name = name.trim();
        if name.is_empty() || name.starts_with('$') {
            tracing::warn!(name, "ignoring cookie with invalid name");
            return self;
        }
        let mut cookie = format!("{}={}", name, value.trim());
        if let Some(max_age) = opts.max_age {
            let expires = if max_age == 0 {
                http_date(DateTime::UNIX_EPOCH)
            } else {
                http_date(Utc::now() + chrono::Duration::seconds(max_age))
            };
            cookie.push_str("; Expires=");
            cookie.push_str(&expires);
        }
        if let Some(domain) = &opts.domain {
            cookie.push_str("; Domain=");
            cookie.push_str(domain.trim());
        }
        if let Some(path) = &opts.path {
            cookie.push_str("; Path=");
            cookie.push_str(path.trim());
        }
        if opts.secure {
            cookie.push_str("; Secure");
        }
        if opts.http_only {
            cookie.push_str("; HttpOnly");
        }
        self.cookies.insert(name.to_string(), cookie);
        self
    }

    /// Expires a cookie on the client by resending it with an epoch expiry.
    pub fn clear_cookie(&mut self, name: &str) -> &mut Self {
        self.set_cookie_opts(
            name,
            "",
            CookieOptions {
                max_age: Some(0),
                ..CookieOptions::default()
            },
        )
    }

    /// Appends bytes to the body buffer. May be called any number of times
    /// before the framework finalizes the response.
    pub fn write(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        self.buffer.extend_from_slice(data.as_ref());
        self
    }

    /// Attaches a file whose bytes are transferred to the socket without
    /// staging them through the body buffer. Sets Content-Length from the
    /// file size.
    pub fn write_file(&mut self, path: impl AsRef<Path>) -> io::Result<u64> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        self.set_header("Content-Length", len.to_string());
        self.file = Some(file);
        self.file_len = len;
        Ok(len)
    }

    /// Finalizes the response: computes Content-Length (and the ETag when
    /// requested) from the buffered byte count, serializes status line,
    /// headers and `Set-Cookie` lines, and prepends them to the body.
    /// Called exactly once, after the handler has returned.
    pub fn prepare(&mut self) {
        self.set_etag_and_content_length();
        if !self.headers_created {
            let head = self.initial_line_and_headers();
            let mut data = BytesMut::with_capacity(head.len() + self.buffer.len());
            data.extend_from_slice(head.as_bytes());
            data.extend_from_slice(&self.buffer);
            self.buffer = data;
            self.headers_created = true;
        }
    }

    fn set_etag_and_content_length(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        if self.create_etag {
            let digest = Sha256::digest(&self.buffer);
            self.set_header("Etag", format!("\"{:x}\"", digest));
        }
        let len = self.buffer.len();
        self.set_header("Content-Length", len.to_string());
    }

    fn initial_line_and_headers(&self) -> String {
        let mut head = self.status.line();
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        for cookie in self.cookies.values() {
            head.push_str("Set-Cookie: ");
            head.push_str(cookie);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        head
    }

    /// Discards all buffered state so an error body can be written instead.
    pub fn reset(&mut self) -> &mut Self {
        self.buffer.clear();
        self.headers.clear();
        self.cookies.clear();
        self.headers_created = false;
        self.file = None;
        self.file_len = 0;
        self
    }

    /// The current contents of the output buffer (the full serialized
    /// response once `prepare()` has run).
    pub fn payload(&self) -> &[u8] {
        &self.buffer
    }

    pub(crate) fn take_payload(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    pub(crate) fn take_file(&mut self) -> Option<(File, u64)> {
        let len = self.file_len;
        self.file.take().map(|file| (file, len))
    }
}

/// RFC 1123 date in GMT, the format HTTP headers use.
fn http_date(when: DateTime<Utc>) -> String {
    when.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
