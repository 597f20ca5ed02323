use crate::extensions::Extensions;
use rustls::ServerConfig as RustlsConfig;
use std::sync::Arc;

/// Configuration accepted by [`crate::server::start_server_with_config`].
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub web_socket_config: Option<WebSocketConfig>,
    /// When set, every accepted TCP connection is wrapped in TLS before the
    /// handshake runs. Loading the certificate/key material into this value
    /// is the caller's responsibility.
    pub tls_config: Option<Arc<RustlsConfig>>,
}

/// Configuration accepted by [`crate::handshake::connect_async_with_config`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub web_socket_config: WebSocketConfig,
    /// Path to a PEM file with extra CA certificates to trust, in addition
    /// to the platform/webpki-roots trust store. Only consulted for `wss://`.
    pub ca_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Upper bound on a single frame's payload, both inbound (rejected with
    /// `Error::MaxFrameSize`) and outbound (the fragmentation threshold).
    pub max_frame_size: Option<usize>,
    /// Upper bound on a reassembled (possibly fragmented) message.
    pub max_message_size: Option<usize>,
    /// `permessage-deflate` negotiation. `None` means this side neither
    /// offers (client) nor accepts (server) compression.
    pub extensions: Option<Extensions>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        WebSocketConfig {
            max_message_size: Some(64 << 20),
            max_frame_size: Some(16 << 20),
            extensions: None,
        }
    }
}
