use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};

use crate::config::ServerConfig;
use crate::http::HttpProtocol;
use crate::server::callback::CallbackQueue;
use crate::server::io_handler::{Completion, IoHandler};
use crate::server::pool::WorkerPool;
use crate::server::timeout::{Timeout, TimeoutHandle, TimerManager};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CONNECTION: usize = 2;

/// Ceiling on the poll interval; also its initial value.
const MAX_INTERVAL: Duration = Duration::from_millis(250);
/// Floor on the poll interval, applied after a drain that did work so
/// callback-spawned activity is picked up promptly.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// One reactor: a listening socket, its poller, timers, callback queue and
/// connection handling, driven by a single thread in [`run`].
///
/// [`run`]: ServerConnector::run
pub struct ServerConnector {
    listener: TcpListener,
    local_addr: SocketAddr,
    poll: Poll,
    timers: TimerManager<ServerConnector>,
    callbacks: Arc<CallbackQueue<ServerConnector>>,
    io: IoHandler,
    shutdown: Arc<AtomicBool>,
}

/// Stops a running connector from any thread.
pub struct ConnectorControl {
    shutdown: Arc<AtomicBool>,
    callbacks: Arc<CallbackQueue<ServerConnector>>,
}

impl ConnectorControl {
    /// Requests shutdown and wakes a parked poll so it takes effect now,
    /// not at the next deadline. The current iteration's timer and callback
    /// work still completes.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.callbacks.wake();
    }
}

impl ServerConnector {
    /// Binds a non-blocking listener (with address reuse) and assembles the
    /// reactor around it. Nothing runs until [`run`] is called.
    ///
    /// [`run`]: ServerConnector::run
    pub fn bind(
        addr: SocketAddr,
        protocol: Arc<HttpProtocol>,
        config: &ServerConfig,
    ) -> io::Result<Self> {
        let mut listener = TcpListener::bind(addr)?;
        let local_addr = listener.local_addr()?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Waker::new(poll.registry(), WAKER)?;
        let callbacks = Arc::new(CallbackQueue::with_waker(waker));
        let pool = WorkerPool::new(config.worker_threads, config.worker_queue_depth)?;
        let io = IoHandler::new(protocol, pool, config, FIRST_CONNECTION);
        tracing::info!(addr = %local_addr, "listening");
        Ok(Self {
            listener,
            local_addr,
            poll,
            timers: TimerManager::new(),
            callbacks,
            io,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn control(&self) -> ConnectorControl {
        ConnectorControl {
            shutdown: Arc::clone(&self.shutdown),
            callbacks: Arc::clone(&self.callbacks),
        }
    }

    /// The queue other threads use to run work on this reactor.
    pub fn callbacks(&self) -> Arc<CallbackQueue<ServerConnector>> {
        Arc::clone(&self.callbacks)
    }

    /// Schedules a one-shot timeout on this reactor. Reactor thread only —
    /// other threads schedule through the callback queue.
    pub fn add_timeout_in(
        &mut self,
        delay: Duration,
        callback: impl FnOnce(&mut ServerConnector) + Send + 'static,
    ) -> TimeoutHandle {
        let (timeout, handle) = Timeout::new(Instant::now() + delay, callback);
        self.timers.add_timeout(timeout);
        handle
    }

    /// Runs the event loop on the calling thread until a control requests
    /// shutdown. A poll failure is fatal to this connector; a failure on a
    /// single connection only closes that connection.
    pub fn run(&mut self) -> io::Result<()> {
        let mut events = Events::with_capacity(1024);
        let mut interval = MAX_INTERVAL;

        while !self.shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.poll.poll(&mut events, Some(interval)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                tracing::error!(error = %e, "poll failed, stopping connector");
                return Err(e);
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.io.on_accept(&mut self.listener, self.poll.registry()),
                    WAKER => {}
                    token => {
                        if event.is_readable() {
                            self.io.on_read(
                                token,
                                self.poll.registry(),
                                &mut self.timers,
                                &self.callbacks,
                            );
                        }
                        if event.is_writable() {
                            self.io
                                .on_write(token, self.poll.registry(), &mut self.timers);
                        }
                    }
                }
            }

            // timers, then callbacks, exactly once per iteration
            let sweep = self.timers.execute(Instant::now());
            for token in &sweep.expired {
                tracing::debug!(token = token.0, "keep-alive timeout expired");
                self.io.close(*token, self.poll.registry(), &mut self.timers);
            }
            for timeout in sweep.due {
                timeout.run(self);
            }
            let callbacks = Arc::clone(&self.callbacks);
            let drained = callbacks.drain(self);

            interval = match sweep.next {
                Some(until_next) => until_next.clamp(MIN_INTERVAL, MAX_INTERVAL),
                None => MAX_INTERVAL,
            };
            if drained {
                interval = MIN_INTERVAL;
            }
        }

        tracing::info!(addr = %self.local_addr, "connector stopped");
        Ok(())
    }

    /// Completion delivery from a worker, routed here by the callback queue.
    pub fn complete_request(&mut self, token: Token, completion: Completion) {
        match completion {
            Ok(response) => {
                self.io
                    .attach_response(token, response, self.poll.registry(), &mut self.timers);
            }
            Err(message) => {
                tracing::error!(token = token.0, error = %message, "request processing failed");
                self.io.close(token, self.poll.registry(), &mut self.timers);
            }
        }
    }
}
