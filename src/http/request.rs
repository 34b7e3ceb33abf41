use std::collections::HashMap;

/// HTTP request methods.
///
/// `TRACE` and `CONNECT` parse successfully but are never dispatched to a
/// handler; the dispatcher answers them with 405 Method Not Allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    OPTIONS,
    PATCH,
    TRACE,
    CONNECT,
}

impl Method {
    /// Parses an HTTP method token (case-sensitive, per the wire format).
    ///
    /// # Example
    ///
    /// ```
    /// # use rampart::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            "TRACE" => Some(Method::TRACE),
            "CONNECT" => Some(Method::CONNECT),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::TRACE => "TRACE",
            Method::CONNECT => "CONNECT",
        }
    }
}

/// A parsed HTTP request.
///
/// Built incrementally by the parser; `finished` flips once the full message
/// has been assembled, after which the request is never mutated again.
/// Header names are stored lowercased; repeated headers are joined with `;`.
#[derive(Debug, Clone)]
pub struct Request {
    pub request_line: String,
    pub method: Method,
    pub path: String,
    pub version: String,
    headers: HashMap<String, String>,
    params: HashMap<String, Vec<String>>,
    pub body: Vec<u8>,
    pub finished: bool,
    /// Set on the early yield for `Expect: 100-continue`; the snapshot
    /// handed to the worker carries it, the accumulating partial does not.
    pub expect_continue: bool,
    /// Free-form per-request scratch space for collaborating handlers.
    pub context: HashMap<String, String>,
}

impl Request {
    /// Creates a request from the pieces of its request line. The query
    /// string is split off the URI and decoded into multi-valued parameters.
    pub fn new(method: Method, uri: &str, version: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((p, q)) => (p, q),
            None => (uri, ""),
        };
        Self {
            request_line: format!("{} {} {}", method.as_str(), uri, version),
            method,
            path: path.to_string(),
            version: version.to_string(),
            headers: HashMap::new(),
            params: parse_query(query),
            body: Vec::new(),
            finished: false,
            expect_continue: false,
            context: HashMap::new(),
        }
    }

    /// Retrieves a header value by name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Appends a header value. A repeated header name concatenates with the
    /// previous value using `;` as separator.
    pub fn push_header(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        let value = value.trim();
        match self.headers.get_mut(&name) {
            Some(existing) => {
                existing.push(';');
                existing.push_str(value);
            }
            None => {
                self.headers.insert(name, value.to_string());
            }
        }
    }

    /// First value of a query parameter, if present.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .and_then(|values| values.first())
            .map(|v| v.as_str())
    }

    /// All values of a query parameter.
    pub fn param_values(&self, name: &str) -> Option<&Vec<String>> {
        self.params.get(name)
    }

    pub fn params(&self) -> &HashMap<String, Vec<String>> {
        &self.params
    }

    /// Parses the `Cookie` header per RFC 6265 section 5.4.
    pub fn cookies(&self) -> HashMap<String, String> {
        let mut cookies = HashMap::new();
        if let Some(header) = self.header("cookie") {
            for pair in header.split(';') {
                if let Some((name, value)) = pair.split_once('=') {
                    cookies.insert(name.trim().to_string(), value.trim().to_string());
                }
            }
        }
        cookies
    }

    /// Content-Length header value, or 0 when absent or unparsable.
    pub fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .map(|v| v.contains("chunked"))
            .unwrap_or(false)
    }

    /// Whether the connection stays open after the response. An absent
    /// `Connection` header or `close` means the connection is closed; any
    /// other value keeps it alive.
    pub fn keep_alive(&self) -> bool {
        match self.header("connection") {
            None => false,
            Some(v) => !v.eq_ignore_ascii_case("close"),
        }
    }

    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

fn parse_query(query: &str) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        params.entry(name.into_owned()).or_default().push(value.into_owned());
    }
    params
}
