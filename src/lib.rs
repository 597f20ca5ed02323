//! Async WebSocket implementation for the Tokio stack.
//!
//! Implements the WebSocket protocol described in
//! [RFC 6455](https://datatracker.ietf.org/doc/html/rfc6455), including the
//! `permessage-deflate` extension from
//! [RFC 7692](https://datatracker.ietf.org/doc/html/rfc7692), on top of a
//! plain `TcpStream` or a `rustls`-wrapped TLS stream.
//!
//! [`handshake::accept_async`] and [`handshake::connect_async`] (and their
//! `_with_config` variants) are the main entry points for servers and
//! clients respectively. [`server::start_server`] wraps the server side into
//! a ready-to-use accept loop that hands back an [`event::EventStream`].

pub mod config;
mod decoder;
mod encoder;
pub mod error;
pub mod event;
pub mod extensions;
pub mod frame;
pub mod handshake;
pub mod message;
mod read;
mod request;
pub mod server;
pub mod split;
pub mod stream;
mod utils;
mod write;
