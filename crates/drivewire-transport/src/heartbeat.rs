//! Ping/pong heartbeat.
//!
//! Steady state is a cycle: send a ping and arm the pong deadline; when the
//! pong arrives, cancel the deadline and arm the interval; when the interval
//! fires, ping again. A missed pong fires the deadline, which closes the
//! connection. Timers are spawned sleep tasks; their handles live on the
//! connection so that arming one kind always aborts its predecessor first,
//! keeping at most one of each kind outstanding.

use std::sync::Arc;

use drivewire_protocol::packet::PACKET_PING;
use futures_util::SinkExt;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::connection::{Connection, ConnectionState};

impl Connection {
    /// Send a ping and arm the pong-deadline timer.
    pub(crate) async fn send_ping(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        if self.state() != ConnectionState::Connected {
            return;
        }
        let Some(timeout) = inner.session.as_ref().map(|s| s.ping_timeout) else {
            return;
        };

        if let Some(sink) = inner.sink.as_mut() {
            debug!("sending ping");
            if let Err(e) = sink.send(Message::Text(PACKET_PING.into())).await {
                warn!("ping send failed: {e}");
            }
        }

        if let Some(timer) = inner.pong_deadline.take() {
            timer.abort();
        }
        let conn = Arc::clone(self);
        inner.pong_deadline = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!("pong deadline elapsed; closing connection");
            conn.close().await;
        }));
    }

    /// Handle a pong: cancel the pong deadline and arm the interval timer
    /// that triggers the next ping.
    pub(crate) async fn handle_pong(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        if let Some(timer) = inner.pong_deadline.take() {
            timer.abort();
        }
        let Some(interval) = inner.session.as_ref().map(|s| s.ping_interval) else {
            return;
        };

        if let Some(timer) = inner.ping_interval.take() {
            timer.abort();
        }
        let conn = Arc::clone(self);
        inner.ping_interval = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            conn.send_ping().await;
        }));
    }
}
