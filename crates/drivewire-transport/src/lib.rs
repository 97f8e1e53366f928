//! DriveWire Transport Layer
//!
//! Drives the realtime channel end to end:
//! - Polling negotiation to obtain session parameters
//! - Websocket upgrade with the probe handshake
//! - Ping/pong heartbeat and dead-connection detection
//! - Packet decoding and subscriber dispatch
//! - Connection lifecycle (connect, read loop, close)
//!
//! The transport is decoupled from the platform's request/response API; the
//! only HTTP it performs is the one polling call in [`negotiate`].

pub mod config;
pub mod connection;
pub mod dispatch;
mod heartbeat;
pub mod http;
pub mod negotiate;
pub mod upgrade;

pub use config::StreamConfig;
pub use connection::{Connection, ConnectionState};
pub use dispatch::{Dispatcher, EventCallback, StreamEvent, Subscription};
pub use negotiate::negotiate;
pub use upgrade::{upgrade, WsStream};
