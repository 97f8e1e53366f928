//! Stream endpoint and credential configuration.

/// Engine protocol version sent with every negotiation and upgrade request.
pub const ENGINE_VERSION: u8 = 3;

const DEFAULT_SESSION_URL: &str = "https://stream.drivewire.io/socket.io/";
const DEFAULT_WEBSOCKET_URL: &str = "wss://stream.drivewire.io/socket.io/";

/// Configuration for the realtime channel.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Polling form of the endpoint, used for negotiation.
    pub session_url: String,
    /// Websocket form of the endpoint, used after negotiation.
    pub websocket_url: String,
    /// Application client id.
    pub client_id: String,
    /// Application client secret.
    pub client_secret: String,
}

impl StreamConfig {
    /// Configuration against the production platform endpoints.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            session_url: DEFAULT_SESSION_URL.into(),
            websocket_url: DEFAULT_WEBSOCKET_URL.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// The opaque `id:secret` token sent as a query parameter.
    pub fn token(&self) -> String {
        format!("{}:{}", self.client_id, self.client_secret)
    }
}
