/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint could not be turned into a valid URL.
    #[error("invalid endpoint url {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    /// The socket is not open for sending.
    #[error("transport is not open")]
    NotOpen,

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The WebSocket layer reported a protocol or connection failure.
    #[cfg(feature = "websocket")]
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
