//! Infrastructure layer for the mission control server.
//!
//! Contains the I/O adapters: the WebSocket server clients connect to, the
//! UDP discovery listener and pixel sender for LED controllers, and the
//! configuration file loader.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `mission_core`, but MUST NOT be imported by the `application` layer.

pub mod network;
pub mod storage;
pub mod ws_server;

pub use ws_server::{run_server, serve, WsServerConfig};
