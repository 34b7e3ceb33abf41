//! Rampart - embeddable event-driven HTTP server engine.
//!
//! One reactor thread per listening socket multiplexes connections, a
//! bounded worker pool runs application handlers, and completions re-enter
//! the reactor through a callback queue.

pub mod config;
pub mod error;
pub mod http;
pub mod server;
