//! Polling negotiation.
//!
//! Before the websocket can be opened, one GET against the polling form of
//! the endpoint establishes a session. The response body is a frame buffer
//! whose first frame must be an `open` frame carrying the session JSON.

use std::time::{SystemTime, UNIX_EPOCH};

use drivewire_protocol::{decode_frames, Error, FrameType, Result, SessionParameters};
use tracing::debug;

use crate::config::{StreamConfig, ENGINE_VERSION};
use crate::http;

/// Obtain session parameters from the platform.
pub async fn negotiate(
    client: &reqwest::Client,
    config: &StreamConfig,
) -> Result<SessionParameters> {
    let url = format!(
        "{}?EIO={}&transport=polling&token={}&t={}",
        config.session_url,
        ENGINE_VERSION,
        config.token(),
        cache_buster(),
    );

    let body = http::get_bytes(client, &url).await?;
    let frame = decode_frames(&body)
        .next()
        .ok_or_else(|| Error::Protocol("negotiation response contains no frames".into()))?;
    if frame.frame_type != FrameType::Open {
        return Err(Error::Protocol(format!(
            "negotiation frame is not open type: {}",
            frame.payload
        )));
    }

    let session = SessionParameters::parse(&frame.payload)?;
    debug!(sid = %session.sid, "negotiated session");
    Ok(session)
}

/// Marker defeating HTTP caches between negotiation attempts.
fn cache_buster() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{millis}-0")
}
