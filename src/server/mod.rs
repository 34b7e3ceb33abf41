//! The reactor side of the engine.
//!
//! - **`connector`**: the event loop — one per listening socket
//! - **`io_handler`**: socket readiness → parser/dispatcher/writer calls
//! - **`timeout`**: deadline-ordered one-shot timers and the keep-alive index
//! - **`callback`**: cross-thread re-entry onto the reactor thread
//! - **`pool`**: bounded worker threads for request processing

pub mod callback;
pub mod connector;
pub mod io_handler;
pub mod pool;
pub mod timeout;

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::ServerConfig;
use crate::http::HttpProtocol;
use crate::http::handler::Handler;
use crate::http::router::{HandlerFactory, RouteMap};
use crate::server::connector::{ConnectorControl, ServerConnector};

/// A set of bound connectors ready to run.
pub struct Server {
    connectors: Vec<ServerConnector>,
}

/// Running server: one reactor thread per connector.
pub struct ServerHandle {
    controls: Vec<ConnectorControl>,
    threads: Vec<JoinHandle<()>>,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The addresses actually bound — useful with port 0.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.connectors.iter().map(|c| c.local_addr()).collect()
    }

    /// Spawns one reactor thread per connector and returns without blocking.
    pub fn start(self) -> std::io::Result<ServerHandle> {
        let mut controls = Vec::with_capacity(self.connectors.len());
        let mut threads = Vec::with_capacity(self.connectors.len());
        for mut connector in self.connectors {
            controls.push(connector.control());
            let thread = std::thread::Builder::new()
                .name("rampart-reactor".to_string())
                .spawn(move || {
                    if let Err(e) = connector.run() {
                        tracing::error!(error = %e, "connector terminated");
                    }
                })?;
            threads.push(thread);
        }
        Ok(ServerHandle { controls, threads })
    }

    /// Runs the server and blocks the calling thread until every reactor
    /// stops.
    pub fn start_and_wait(self) -> std::io::Result<()> {
        self.start()?.join();
        Ok(())
    }
}

impl ServerHandle {
    /// Asks every connector to stop after its current iteration.
    pub fn stop(&self) {
        for control in &self.controls {
            control.stop();
        }
    }

    /// Waits for every reactor thread to exit.
    pub fn join(self) {
        for thread in self.threads {
            let _ = thread.join();
        }
    }
}

/// Assembles a [`Server`]: bind addresses, routes, configuration.
pub struct ServerBuilder {
    config: ServerConfig,
    addrs: Vec<SocketAddr>,
    routes: RouteMap,
    factory: Option<Arc<dyn HandlerFactory>>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            addrs: Vec::new(),
            routes: RouteMap::new(),
            factory: None,
        }
    }

    /// Binds every interface on the given port.
    pub fn bind(mut self, port: u16) -> Self {
        self.addrs.push(SocketAddr::from(([0, 0, 0, 0], port)));
        self
    }

    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.addrs.push(addr);
        self
    }

    /// Registers a handler for an absolute path.
    pub fn route(mut self, path: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.routes.add_route(path, handler);
        self
    }

    /// Replaces the built-in route table with a custom factory.
    pub fn handler_factory(mut self, factory: Arc<dyn HandlerFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Binds all requested addresses (the configured listen address when
    /// none was given) and assembles the connectors.
    pub fn build(self) -> anyhow::Result<Server> {
        let factory: Arc<dyn HandlerFactory> = match self.factory {
            Some(factory) => factory,
            None => Arc::new(self.routes),
        };
        let protocol = Arc::new(HttpProtocol::new(factory));

        let addrs = if self.addrs.is_empty() {
            vec![self.config.listen_addr.parse()?]
        } else {
            self.addrs
        };

        let mut connectors = Vec::with_capacity(addrs.len());
        for addr in addrs {
            connectors.push(ServerConnector::bind(addr, Arc::clone(&protocol), &self.config)?);
        }
        Ok(Server { connectors })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
