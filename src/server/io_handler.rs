use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::net::SocketAddr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::{TcpListener, TcpStream};
use mio::{Interest, Registry, Token};

use crate::config::ServerConfig;
use crate::error::ParseError;
use crate::http::HttpProtocol;
use crate::http::handler::panic_message;
use crate::http::parser::{ParseStatus, RequestParser};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::{ResponseWriter, WriteOutcome};
use crate::server::callback::CallbackQueue;
use crate::server::connector::ServerConnector;
use crate::server::pool::WorkerPool;
use crate::server::timeout::TimerManager;

/// What a worker hands back through the callback queue: a prepared response,
/// or the reason processing fell over.
pub type Completion = Result<Response, String>;

/// State for one accepted socket.
///
/// At most one partial request and one pending writer exist per connection.
struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    partial: Option<RequestParser>,
    writer: Option<ResponseWriter>,
    processing: bool,
    registered: bool,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            partial: None,
            writer: None,
            processing: false,
            registered: true,
        }
    }
}

enum ReadAction {
    None,
    Closed,
    Failed,
    Submit(Request),
    Malformed(ParseError),
}

enum WriteAction {
    None,
    Finished(bool),
    Failed,
}

/// Turns socket readiness into parser, dispatcher and writer calls.
///
/// Owns the connection table; registration changes and timer updates go
/// through the collaborators the reactor passes in. Workers never see any
/// of this state — their results re-enter through the callback queue.
pub struct IoHandler {
    connections: HashMap<Token, Connection>,
    protocol: Arc<HttpProtocol>,
    pool: WorkerPool,
    next_token: usize,
    read_buffer_size: usize,
    keep_alive_timeout: Duration,
}

impl IoHandler {
    pub fn new(
        protocol: Arc<HttpProtocol>,
        pool: WorkerPool,
        config: &ServerConfig,
        first_token: usize,
    ) -> Self {
        Self {
            connections: HashMap::new(),
            protocol,
            pool,
            next_token: first_token,
            read_buffer_size: config.read_buffer_size,
            keep_alive_timeout: config.keep_alive_timeout(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Accepts every pending connection and registers each for reads.
    pub fn on_accept(&mut self, listener: &mut TcpListener, registry: &Registry) {
        loop {
            match listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    match registry.register(&mut stream, token, Interest::READABLE) {
                        Ok(()) => {
                            tracing::debug!(%peer, token = token.0, "accepted connection");
                            self.connections.insert(token, Connection::new(stream, peer));
                        }
                        Err(e) => {
                            tracing::error!(%peer, error = %e, "could not register connection");
                        }
                    }
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    /// Drains the socket, feeds the parser, and submits a yielded request to
    /// the worker pool. EOF closes the connection; a pending keep-alive
    /// deadline is refreshed on every successful read.
    pub fn on_read(
        &mut self,
        token: Token,
        registry: &Registry,
        timers: &mut TimerManager<ServerConnector>,
        callbacks: &Arc<CallbackQueue<ServerConnector>>,
    ) {
        let read_buffer_size = self.read_buffer_size;
        let keep_alive_timeout = self.keep_alive_timeout;

        let action = {
            let Some(conn) = self.connections.get_mut(&token) else {
                tracing::warn!(token = token.0, "read event for unknown connection");
                return;
            };
            if conn.processing {
                // one request in flight per connection
                return;
            }
            let mut scratch = vec![0u8; read_buffer_size];
            let mut action = ReadAction::None;
            loop {
                match conn.stream.read(&mut scratch) {
                    Ok(0) => {
                        action = ReadAction::Closed;
                        break;
                    }
                    Ok(n) => {
                        if timers.has_keep_alive(token) {
                            timers.add_keep_alive(token, Instant::now() + keep_alive_timeout);
                        }
                        let parser = conn.partial.get_or_insert_with(RequestParser::new);
                        match parser.feed(&scratch[..n]) {
                            Ok(ParseStatus::Partial) => continue,
                            Ok(ParseStatus::ExpectContinue) => {
                                // partial stays behind to accumulate the body
                                if let Some(request) = parser.snapshot() {
                                    action = ReadAction::Submit(request);
                                }
                                break;
                            }
                            Ok(ParseStatus::Complete) => {
                                if let Some(request) =
                                    conn.partial.take().and_then(RequestParser::finish)
                                {
                                    action = ReadAction::Submit(request);
                                }
                                break;
                            }
                            Err(e) => {
                                tracing::warn!(peer = %conn.peer, error = %e, "malformed request");
                                conn.partial = None;
                                action = ReadAction::Malformed(e);
                                break;
                            }
                        }
                    }
                    Err(ref e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::error!(peer = %conn.peer, error = %e, "read failed");
                        action = ReadAction::Failed;
                        break;
                    }
                }
            }
            if let ReadAction::Submit(_) = &action {
                // one request in flight: stop listening for reads until the
                // response is on the wire
                conn.processing = true;
                conn.registered = false;
                if let Err(e) = registry.deregister(&mut conn.stream) {
                    tracing::error!(peer = %conn.peer, error = %e, "deregister failed");
                    action = ReadAction::Failed;
                }
            }
            action
        };

        match action {
            ReadAction::None => {}
            ReadAction::Closed | ReadAction::Failed => self.close(token, registry, timers),
            ReadAction::Submit(request) => self.submit(token, request, callbacks, registry, timers),
            ReadAction::Malformed(e) => {
                self.fail_request(
                    token,
                    StatusCode::BadRequest,
                    &e.to_string(),
                    registry,
                    timers,
                );
            }
        }
    }

    /// Hands a request to the pool; the worker's result re-enters the
    /// reactor through the callback queue, never directly.
    fn submit(
        &mut self,
        token: Token,
        request: Request,
        callbacks: &Arc<CallbackQueue<ServerConnector>>,
        registry: &Registry,
        timers: &mut TimerManager<ServerConnector>,
    ) {
        let protocol = Arc::clone(&self.protocol);
        let queue = Arc::clone(callbacks);
        let submitted = self.pool.execute(move || {
            let completion: Completion =
                match catch_unwind(AssertUnwindSafe(|| protocol.process_request(&request))) {
                    Ok(response) => Ok(response),
                    Err(panic) => Err(panic_message(panic)),
                };
            queue.submit(move |connector: &mut ServerConnector| {
                connector.complete_request(token, completion);
            });
        });
        if let Err(e) = submitted {
            tracing::warn!(token = token.0, error = %e, "worker pool rejected request");
            self.fail_request(
                token,
                StatusCode::ServiceUnavailable,
                "server is overloaded",
                registry,
                timers,
            );
        }
    }

    /// Short-circuit response produced on the reactor thread itself (parse
    /// errors, pool saturation). Always closes the connection afterwards.
    fn fail_request(
        &mut self,
        token: Token,
        status: StatusCode,
        body: &str,
        registry: &Registry,
        timers: &mut TimerManager<ServerConnector>,
    ) {
        timers.remove_keep_alive(token);
        let mut response = Response::new(false);
        response
            .set_status(status)
            .set_content_type("text/plain")
            .write(body);
        response.prepare();
        self.attach_response(token, response, registry, timers);
    }

    /// Arms the connection to stream a prepared response.
    pub fn attach_response(
        &mut self,
        token: Token,
        response: Response,
        registry: &Registry,
        timers: &mut TimerManager<ServerConnector>,
    ) {
        let armed = {
            let Some(conn) = self.connections.get_mut(&token) else {
                tracing::warn!(token = token.0, "response for a connection that is gone");
                return;
            };
            conn.writer = Some(ResponseWriter::new(response));
            conn.processing = true;
            let result = if conn.registered {
                registry.reregister(&mut conn.stream, token, Interest::WRITABLE)
            } else {
                registry.register(&mut conn.stream, token, Interest::WRITABLE)
            };
            match result {
                Ok(()) => {
                    conn.registered = true;
                    true
                }
                Err(e) => {
                    tracing::error!(peer = %conn.peer, error = %e, "write registration failed");
                    false
                }
            }
        };
        if !armed {
            self.close(token, registry, timers);
        }
    }

    /// Streams the pending response; once fully flushed the connection is
    /// closed or re-armed for the next request per its keep-alive flag.
    pub fn on_write(
        &mut self,
        token: Token,
        registry: &Registry,
        timers: &mut TimerManager<ServerConnector>,
    ) {
        let action = {
            let Some(conn) = self.connections.get_mut(&token) else {
                tracing::warn!(token = token.0, "write event for unknown connection");
                return;
            };
            match conn.writer.as_mut() {
                None => WriteAction::None,
                Some(writer) => match writer.write_to(&mut conn.stream) {
                    Ok(WriteOutcome::Pending) => WriteAction::None,
                    Ok(WriteOutcome::Done) => {
                        let keep_alive = writer.keep_alive();
                        conn.writer = None;
                        conn.processing = false;
                        WriteAction::Finished(keep_alive)
                    }
                    Err(e) => {
                        tracing::error!(peer = %conn.peer, error = %e, "write failed");
                        WriteAction::Failed
                    }
                },
            }
        };

        match action {
            WriteAction::None => {}
            WriteAction::Failed => self.close(token, registry, timers),
            WriteAction::Finished(keep_alive) => {
                self.close_or_rearm(token, keep_alive, registry, timers)
            }
        }
    }

    /// After a complete response: either tear the connection down or go back
    /// to reading with a fresh keep-alive deadline.
    fn close_or_rearm(
        &mut self,
        token: Token,
        keep_alive: bool,
        registry: &Registry,
        timers: &mut TimerManager<ServerConnector>,
    ) {
        if !keep_alive {
            self.close(token, registry, timers);
            return;
        }
        let keep_alive_timeout = self.keep_alive_timeout;
        let rearmed = {
            let Some(conn) = self.connections.get_mut(&token) else {
                return;
            };
            match registry.reregister(&mut conn.stream, token, Interest::READABLE) {
                Ok(()) => {
                    conn.registered = true;
                    true
                }
                Err(e) => {
                    tracing::error!(peer = %conn.peer, error = %e, "read re-registration failed");
                    false
                }
            }
        };
        if rearmed {
            timers.add_keep_alive(token, Instant::now() + keep_alive_timeout);
        } else {
            self.close(token, registry, timers);
        }
    }

    /// Tears a connection down: removes its keep-alive entry, deregisters
    /// the socket and drops the stream, the partial request and any writer
    /// (releasing an attached file with it).
    pub fn close(
        &mut self,
        token: Token,
        registry: &Registry,
        timers: &mut TimerManager<ServerConnector>,
    ) {
        timers.remove_keep_alive(token);
        if let Some(mut conn) = self.connections.remove(&token) {
            if conn.registered {
                if let Err(e) = registry.deregister(&mut conn.stream) {
                    tracing::debug!(peer = %conn.peer, error = %e, "deregister on close failed");
                }
            }
            tracing::debug!(peer = %conn.peer, token = token.0, "connection closed");
        }
    }
}
