//! DriveWire — async client for a vehicle telematics platform.
//!
//! The platform pushes trip and vehicle notifications over a realtime
//! channel negotiated in two steps: a polling request establishes a session,
//! then the client upgrades to a websocket and completes a probe handshake.
//! [`Client`] wraps that lifecycle behind subscribe/connect/close:
//!
//! ```no_run
//! use std::sync::Arc;
//! use drivewire::Client;
//!
//! # async fn run() -> drivewire::Result<()> {
//! let client = Client::new("my-client-id", "my-client-secret");
//!
//! let _sub = client.on("location:updated", Arc::new(|kind, event| {
//!     println!("{kind}: {event:?}");
//! }))?;
//!
//! let handle = client.connect().await?;
//! // ... the read loop now feeds subscribers until the connection ends.
//! handle.await.expect("read loop panicked")?;
//! # Ok(())
//! # }
//! ```
//!
//! Subscribers for the reserved `error` and `closed` kinds observe
//! server-sent error messages and the end of the connection. The client must
//! be created inside a Tokio runtime; callbacks run on a dispatch task, never
//! inline with the read loop, so a slow subscriber cannot stall the
//! heartbeat.

use std::sync::Arc;

use tokio::task::JoinHandle;

pub use drivewire_protocol::{
    decode_frames, Error, EventBase, EventDetail, EventKind, Frame, FrameType, Packet,
    RealtimeEvent, Result, SessionParameters,
};
pub use drivewire_protocol::events;
pub use drivewire_transport::{
    ConnectionState, EventCallback, StreamConfig, StreamEvent, Subscription,
};

use drivewire_transport::{Connection, Dispatcher};

/// Client for the DriveWire realtime channel.
pub struct Client {
    dispatcher: Arc<Dispatcher>,
    connection: Arc<Connection>,
}

impl Client {
    /// Create a client against the production platform endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::with_config(StreamConfig::new(client_id, client_secret))
    }

    /// Create a client against explicit endpoints.
    pub fn with_config(config: StreamConfig) -> Self {
        let dispatcher = Arc::new(Dispatcher::new());
        let connection = Arc::new(Connection::new(
            config,
            reqwest::Client::new(),
            Arc::clone(&dispatcher),
        ));
        Self {
            dispatcher,
            connection,
        }
    }

    /// Register a callback for one event kind.
    ///
    /// Valid kinds are the platform's realtime events plus the reserved
    /// `error` and `closed`; any other name is rejected immediately. The
    /// returned handle unregisters the callback.
    pub fn on(&self, event: &str, callback: EventCallback) -> Result<Subscription> {
        self.dispatcher.subscribe(event, callback)
    }

    /// Register a callback for every realtime event kind.
    ///
    /// The reserved `error`/`closed` kinds are not included. One handle
    /// removes all of the registrations.
    pub fn on_app_event(&self, callback: EventCallback) -> Subscription {
        self.dispatcher.subscribe_all(callback)
    }

    /// Open the realtime connection.
    ///
    /// Returns the read-loop handle; it resolves when the connection ends,
    /// with the transport error when the end was a failure. Fails with a
    /// transport error if a connection is already open.
    pub async fn connect(&self) -> Result<JoinHandle<Result<()>>> {
        self.connection.connect().await
    }

    /// Close the realtime connection. No-op when not connected; safe to
    /// call repeatedly and from subscriber callbacks.
    pub async fn close(&self) {
        self.connection.close().await;
    }

    /// Whether the realtime connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.connection.state() == ConnectionState::Connected
    }
}
