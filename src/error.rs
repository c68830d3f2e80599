use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("RPC_CLIENT_ID is not set")]
    MissingClientId,

    #[error("RPC_CLIENT_ID must be an integer application id, got {0:?}")]
    InvalidClientId(String),

    #[error("WEB_SOCKET_PORT must be a port number, got {0:?}")]
    InvalidPort(String),

    #[error("{var} is not a valid absolute URL: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Failures reported by a presence service. All of them are recovered by
/// reconnecting; none reach the websocket client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PresenceError {
    #[error("presence service is not connected")]
    NotConnected,

    #[error("failed to connect to presence service: {0}")]
    Connect(String),

    #[error("presence handshake timed out")]
    HandshakeTimeout,

    #[error("presence request failed: {0}")]
    Request(String),
}
