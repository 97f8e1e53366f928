//! Steady-state packet model for the realtime channel.
//!
//! Once the websocket is upgraded, every message is a small text packet.
//! `Packet::parse` decodes each one into a closed variant set so downstream
//! handling is an exhaustive match instead of ordered prefix checks.

use serde_json::Value;

use crate::error::{Error, Result};

/// Engine-level ping, sent by the client.
pub const PACKET_PING: &str = "2";
/// Engine-level pong, sent by the platform in response to a ping.
pub const PACKET_PONG: &str = "3";
/// Probe sent on the fresh websocket.
pub const PACKET_PROBE: &str = "2probe";
/// Expected reply to the probe.
pub const PACKET_PROBE_ACK: &str = "3probe";
/// Engine upgrade packet finalizing the transport switch.
pub const PACKET_UPGRADE: &str = "5";
/// Socket-level connect acknowledgement.
pub const PACKET_CONNECT_ACK: &str = "40";
/// Socket-level disconnect, sent during graceful close.
pub const PACKET_SOCKET_CLOSE: &str = "41";
/// Engine-level close, sent during graceful close.
pub const PACKET_ENGINE_CLOSE: &str = "1";
/// Prefix of an event packet; the remainder is `[name, payload]` JSON.
pub const EVENT_PREFIX: &str = "42";
/// Prefix of an error packet; the remainder is a JSON value.
pub const ERROR_PREFIX: &str = "44";

/// One decoded steady-state packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Heartbeat pong.
    Pong,
    /// A named realtime event with its raw payload.
    Event { name: String, payload: Value },
    /// A server-sent error value.
    Error(Value),
    /// Anything else; carried verbatim for diagnostics.
    Other(String),
}

impl Packet {
    /// Decode one text packet.
    ///
    /// An event or error prefix followed by unparsable JSON is a protocol
    /// fault; unrecognized packets are not.
    pub fn parse(text: &str) -> Result<Packet> {
        if text == PACKET_PONG {
            return Ok(Packet::Pong);
        }

        if let Some(rest) = text.strip_prefix(EVENT_PREFIX) {
            let value: Value = serde_json::from_str(rest)
                .map_err(|e| Error::Protocol(format!("bad event packet {text:?}: {e}")))?;
            let Some([name, payload]) = value.as_array().and_then(|a| a.first_chunk::<2>())
            else {
                return Err(Error::Protocol(format!(
                    "event packet is not a 2-element array: {text:?}"
                )));
            };
            let Some(name) = name.as_str() else {
                return Err(Error::Protocol(format!(
                    "event packet name is not a string: {text:?}"
                )));
            };
            return Ok(Packet::Event {
                name: name.to_string(),
                payload: payload.clone(),
            });
        }

        if let Some(rest) = text.strip_prefix(ERROR_PREFIX) {
            let value: Value = serde_json::from_str(rest)
                .map_err(|e| Error::Protocol(format!("bad error packet {text:?}: {e}")))?;
            return Ok(Packet::Error(value));
        }

        Ok(Packet::Other(text.to_string()))
    }
}
