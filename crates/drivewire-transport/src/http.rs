//! Request/response collaborator.
//!
//! Thin wrapper over `reqwest` that normalizes every fault into the
//! DriveWire error taxonomy: network/timeout problems become
//! [`Error::Transport`], non-success statuses become [`Error::Status`] with
//! the body's `error`/`error_description` fields folded in when present,
//! and an unparsable JSON body becomes [`Error::InvalidResponse`].

use drivewire_protocol::{Error, Result};
use reqwest::{Method, Response};
use serde_json::Value;
use tracing::debug;

/// Issue a request and return the parsed JSON body.
///
/// Entry point for the platform's JSON request/response surface. The
/// realtime transport itself only performs the polling negotiation, which
/// goes through [`get_bytes`] because its body is a frame buffer.
pub async fn request_json(client: &reqwest::Client, method: Method, url: &str) -> Result<Value> {
    let resp = send(client, method, url).await?;
    resp.json::<Value>()
        .await
        .map_err(|e| Error::InvalidResponse(e.to_string()))
}

/// Issue a GET and return the raw response body.
///
/// Negotiation needs the body verbatim; it is a frame buffer, not JSON.
pub async fn get_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let resp = send(client, Method::GET, url).await?;
    let body = resp
        .bytes()
        .await
        .map_err(|e| Error::Transport(e.to_string()))?;
    Ok(body.to_vec())
}

async fn send(client: &reqwest::Client, method: Method, url: &str) -> Result<Response> {
    debug!(%method, url, "sending request");
    let resp = client
        .request(method, url)
        .send()
        .await
        .map_err(|e| Error::Transport(e.to_string()))?;

    let status = resp.status();
    if !status.is_success() {
        // The error body is nice to have, but not required.
        let message = resp
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| error_message(&body));
        return Err(Error::from_status(status.as_u16(), message));
    }
    Ok(resp)
}

fn error_message(body: &Value) -> Option<String> {
    let error = body.get("error").and_then(Value::as_str);
    let description = body.get("error_description").and_then(Value::as_str);
    match (error, description) {
        (Some(e), Some(d)) => Some(format!("{e}: {d}")),
        (Some(e), None) => Some(e.to_string()),
        (None, Some(d)) => Some(d.to_string()),
        (None, None) => None,
    }
}
