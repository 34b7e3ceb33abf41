//! HTTP protocol implementation.
//!
//! The HTTP layer is organized into several submodules:
//!
//! - **`parser`**: incremental request assembly across any number of reads
//! - **`request`**: HTTP request representation and accessors
//! - **`response`**: HTTP response with prepare/reset lifecycle
//! - **`writer`**: non-blocking response streaming, including file hand-off
//! - **`handler`**: per-verb dispatch contract and built-in handlers
//! - **`router`**: absolute-path route table behind the `HandlerFactory` seam

pub mod handler;
pub mod parser;
pub mod request;
pub mod response;
pub mod router;
pub mod writer;

use std::sync::Arc;

use crate::http::handler::dispatch;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::router::HandlerFactory;

const SERVER_TOKEN: &str = concat!("rampart/", env!("CARGO_PKG_VERSION"));

/// Turns finished requests into prepared responses.
///
/// Shared by all worker threads; the per-connection parser state lives with
/// the connection, not here.
pub struct HttpProtocol {
    factory: Arc<dyn HandlerFactory>,
}

impl HttpProtocol {
    pub fn new(factory: Arc<dyn HandlerFactory>) -> Self {
        Self { factory }
    }

    /// Runs on a worker thread: selects a handler, dispatches the verb,
    /// stamps the server header and finalizes the response for the wire.
    pub fn process_request(&self, request: &Request) -> Response {
        tracing::debug!(
            method = request.method.as_str(),
            path = %request.path,
            "dispatching request"
        );
        let mut response = Response::new(request.keep_alive());
        let handler = self.factory.handler(request);
        dispatch(handler.as_ref(), request, &mut response);
        response.set_header("Server", SERVER_TOKEN);
        response.prepare();
        response
    }
}
