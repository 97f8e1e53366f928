//! Connection lifecycle.
//!
//! State machine: Disconnected → Negotiating → Upgrading → Connected →
//! Closing → Disconnected. `connect` runs negotiation and the websocket
//! upgrade, fires the first ping, and spawns the read loop; `close` is the
//! single cancellation path and is safe to call from anywhere — a caller, a
//! heartbeat timer, the read loop, or a subscriber callback — any number of
//! times.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use drivewire_protocol::packet::{PACKET_ENGINE_CLOSE, PACKET_SOCKET_CLOSE};
use drivewire_protocol::{Error, EventKind, Packet, RealtimeEvent, Result, SessionParameters};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::StreamConfig;
use crate::dispatch::{Dispatcher, StreamEvent};
use crate::negotiate::negotiate;
use crate::upgrade::{upgrade, WsStream};

/// Lifecycle states of the realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Negotiating = 1,
    Upgrading = 2,
    Connected = 3,
    Closing = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Negotiating,
            2 => Self::Upgrading,
            3 => Self::Connected,
            4 => Self::Closing,
            _ => Self::Disconnected,
        }
    }
}

/// State guarded by the connection mutex: the send half of the channel,
/// the negotiated session, and the two heartbeat timer handles. At most one
/// timer of each kind is outstanding; arming replaces (and aborts) the old
/// handle. `epoch` counts successful connects, so a read loop that outlived
/// its connection can tell it no longer owns the channel.
pub(crate) struct Inner {
    pub(crate) sink: Option<SplitSink<WsStream, Message>>,
    pub(crate) session: Option<SessionParameters>,
    pub(crate) pong_deadline: Option<JoinHandle<()>>,
    pub(crate) ping_interval: Option<JoinHandle<()>>,
    epoch: u64,
}

/// The realtime connection to the platform.
pub struct Connection {
    pub(crate) config: StreamConfig,
    pub(crate) http: reqwest::Client,
    pub(crate) dispatcher: Arc<Dispatcher>,
    state: AtomicU8,
    pub(crate) inner: tokio::sync::Mutex<Inner>,
}

impl Connection {
    pub fn new(config: StreamConfig, http: reqwest::Client, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            http,
            dispatcher,
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            inner: tokio::sync::Mutex::new(Inner {
                sink: None,
                session: None,
                pong_deadline: None,
                ping_interval: None,
                epoch: 0,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn try_transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Open the realtime connection.
    ///
    /// Fails fast if a connection is already open or in progress. On success
    /// the first ping has been sent and the read loop is running; the
    /// returned handle resolves when the connection ends, carrying the
    /// transport error when that end was a failure.
    pub async fn connect(self: &Arc<Self>) -> Result<JoinHandle<Result<()>>> {
        if !self.try_transition(ConnectionState::Disconnected, ConnectionState::Negotiating) {
            return Err(Error::Transport("connection already open".into()));
        }

        info!("opening realtime connection");
        let ws = match self.establish().await {
            Ok(ws) => ws,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let (sink, stream) = ws.split();
        let epoch = {
            let mut inner = self.inner.lock().await;
            inner.sink = Some(sink);
            inner.epoch += 1;
            self.set_state(ConnectionState::Connected);
            inner.epoch
        };

        self.send_ping().await;

        let conn = Arc::clone(self);
        Ok(tokio::spawn(async move { conn.read_loop(stream, epoch).await }))
    }

    async fn establish(self: &Arc<Self>) -> Result<WsStream> {
        let session = negotiate(&self.http, &self.config).await?;
        self.set_state(ConnectionState::Upgrading);
        let ws = upgrade(&self.config, &session).await?;
        self.inner.lock().await.session = Some(session);
        Ok(ws)
    }

    /// Receive until the channel ends, then run the close sequence and
    /// notify `closed` subscribers. A transport error is surfaced to the
    /// awaiter only after that cleanup has completed. `epoch` identifies
    /// the connection this loop was spawned for: if the caller has already
    /// closed and reconnected, the stale loop must not tear down the
    /// replacement.
    async fn read_loop(
        self: Arc<Self>,
        mut stream: SplitStream<WsStream>,
        epoch: u64,
    ) -> Result<()> {
        let mut result = Ok(());
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => self.handle_packet(text.as_str()).await,
                Some(Ok(Message::Close(_))) | None => {
                    debug!("realtime channel closed by peer");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("realtime channel error: {e}");
                    result = Err(Error::Transport(e.to_string()));
                    break;
                }
            }
        }

        self.close_if_current(epoch).await;
        self.dispatcher.dispatch(EventKind::Closed, StreamEvent::Closed);
        result
    }

    async fn handle_packet(self: &Arc<Self>, text: &str) {
        match Packet::parse(text) {
            Ok(Packet::Pong) => self.handle_pong().await,
            Ok(Packet::Event { name, payload }) => {
                let kind = match EventKind::parse(&name) {
                    Ok(kind) if kind.is_realtime() => kind,
                    _ => {
                        error!("invalid event {name} received from platform");
                        debug!(%payload);
                        return;
                    }
                };
                match RealtimeEvent::decode(kind, &payload) {
                    Ok(event) => self
                        .dispatcher
                        .dispatch(kind, StreamEvent::Realtime(Arc::new(event))),
                    Err(e) => warn!("discarding undecodable {kind} event: {e}"),
                }
            }
            Ok(Packet::Error(value)) => {
                self.dispatcher.dispatch(EventKind::Error, StreamEvent::Error(value));
            }
            Ok(Packet::Other(text)) => debug!("unhandled packet {text}"),
            Err(e) => warn!("dropping malformed packet: {e}"),
        }
    }

    /// Close the connection. No-op unless currently connected.
    ///
    /// The socket/engine close packets are best-effort; faults sending them
    /// are swallowed. Both heartbeat timers are canceled, the channel is
    /// disposed, and the state returns to `Disconnected` so a later
    /// `connect` can succeed.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        self.close_locked(&mut inner).await;
    }

    /// Close on behalf of the read loop spawned for `epoch`. A later
    /// connect bumps the epoch, so a loop whose connection was already
    /// replaced backs off instead of closing the new one.
    async fn close_if_current(&self, epoch: u64) {
        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            debug!("read loop outlived its connection; skipping close");
            return;
        }
        self.close_locked(&mut inner).await;
    }

    async fn close_locked(&self, inner: &mut Inner) {
        if !self.try_transition(ConnectionState::Connected, ConnectionState::Closing) {
            return;
        }

        if let Some(mut sink) = inner.sink.take() {
            let _ = sink.send(Message::Text(PACKET_SOCKET_CLOSE.into())).await;
            let _ = sink.send(Message::Text(PACKET_ENGINE_CLOSE.into())).await;
            let _ = sink.close().await;
        }
        if let Some(timer) = inner.pong_deadline.take() {
            timer.abort();
        }
        if let Some(timer) = inner.ping_interval.take() {
            timer.abort();
        }
        inner.session = None;

        self.set_state(ConnectionState::Disconnected);
        info!("realtime connection closed");
    }
}
