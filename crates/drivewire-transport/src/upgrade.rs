//! Websocket upgrade and probe handshake.
//!
//! Handshake flow on the fresh socket:
//!   1. Send `"2probe"`, expect `"3probe"`.
//!   2. Send `"5"` (upgrade), expect `"40"` (connect ack).
//!
//! A `"44"`-prefixed reply at step 2 is a server-sent error whose JSON
//! string payload selects the specific error variant. Every network fault
//! or deadline miss is normalized to a transport error.

use drivewire_protocol::packet::{
    ERROR_PREFIX, PACKET_CONNECT_ACK, PACKET_PROBE, PACKET_PROBE_ACK, PACKET_UPGRADE,
};
use drivewire_protocol::{Error, Result, SessionParameters};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::config::{StreamConfig, ENGINE_VERSION};

/// The upgraded realtime channel.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Open the websocket form of the endpoint and run the probe handshake.
///
/// The negotiated `ping_timeout` bounds the connect and each handshake
/// receive.
pub async fn upgrade(config: &StreamConfig, session: &SessionParameters) -> Result<WsStream> {
    let url = format!(
        "{}?EIO={}&transport=websocket&token={}&sid={}",
        config.websocket_url,
        ENGINE_VERSION,
        config.token(),
        session.sid,
    );

    let (mut ws, _) = timeout(session.ping_timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| Error::Transport("websocket connect timed out".into()))?
        .map_err(|e| Error::Transport(e.to_string()))?;

    send(&mut ws, PACKET_PROBE).await?;
    let resp = receive(&mut ws, session).await?;
    if resp != PACKET_PROBE_ACK {
        return Err(Error::Protocol(format!(
            "probe response packet not received: {resp}"
        )));
    }

    send(&mut ws, PACKET_UPGRADE).await?;
    let resp = receive(&mut ws, session).await?;
    if resp != PACKET_CONNECT_ACK {
        if let Some(rest) = resp.strip_prefix(ERROR_PREFIX) {
            // A parsable error payload names the rejection reason.
            if let Ok(message) = serde_json::from_str::<String>(rest) {
                return Err(Error::socket_error(message));
            }
        }
        return Err(Error::Protocol(format!(
            "connect packet not received: {resp}"
        )));
    }

    debug!(sid = %session.sid, "websocket upgraded");
    Ok(ws)
}

async fn send(ws: &mut WsStream, text: &str) -> Result<()> {
    ws.send(Message::Text(text.into()))
        .await
        .map_err(|e| Error::Transport(e.to_string()))
}

async fn receive(ws: &mut WsStream, session: &SessionParameters) -> Result<String> {
    let msg = timeout(session.ping_timeout, ws.next())
        .await
        .map_err(|_| Error::Transport("handshake receive timed out".into()))?
        .ok_or_else(|| Error::Transport("connection closed during handshake".into()))?
        .map_err(|e| Error::Transport(e.to_string()))?;

    match msg {
        Message::Text(text) => Ok(text.to_string()),
        other => Err(Error::Protocol(format!(
            "non-text message during handshake: {other:?}"
        ))),
    }
}
