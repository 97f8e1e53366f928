//! Negotiated session parameters.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Parameters returned by the polling negotiation.
///
/// Produced once per connection and wholly replaced on reconnect. The
/// platform reports the timing fields in milliseconds; they are converted
/// here so the rest of the client only ever sees [`Duration`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParameters {
    /// Session id to present when upgrading to the websocket transport.
    pub sid: String,
    /// How long to wait for a pong before the connection is considered dead.
    pub ping_timeout: Duration,
    /// How long to wait after a pong before sending the next ping.
    pub ping_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct RawSession {
    sid: String,
    #[serde(rename = "pingTimeout")]
    ping_timeout_ms: u64,
    #[serde(rename = "pingInterval")]
    ping_interval_ms: u64,
}

impl SessionParameters {
    /// Parse the JSON payload of the negotiation open frame.
    pub fn parse(payload: &str) -> Result<Self> {
        let raw: RawSession = serde_json::from_str(payload)
            .map_err(|e| Error::Protocol(format!("bad session payload {payload:?}: {e}")))?;
        Ok(Self {
            sid: raw.sid,
            ping_timeout: Duration::from_millis(raw.ping_timeout_ms),
            ping_interval: Duration::from_millis(raw.ping_interval_ms),
        })
    }
}
