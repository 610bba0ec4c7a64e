use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::error::{Result, TransportError};

/// Lifecycle state reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Connecting => "connecting",
            TransportState::Open => "open",
            TransportState::Closing => "closing",
            TransportState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Event raised by a transport on its own callback thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The socket started dialing.
    Connecting,
    /// The socket is open and may send.
    Open,
    /// A failure occurred. Does not by itself mean the socket closed.
    Error(String),
    /// The socket is closed.
    Closed,
    /// One inbound text frame.
    Message(String),
}

/// Callback that receives every event of one `open` attempt.
///
/// Implementations must return quickly; heavy work belongs on another thread.
pub type EventHandler = Arc<dyn Fn(TransportEvent) + Send + Sync>;

/// A full-duplex text socket.
///
/// `open` is asynchronous: it returns once dialing has started, and progress
/// is reported through the handler. `close` blocks until the socket stopped.
pub trait Transport: Send + Sync {
    /// Start connecting to `url`, routing all events of this attempt to `handler`.
    fn open(&self, url: &Url, handler: EventHandler) -> Result<()>;

    /// Send one text frame as-is.
    fn send(&self, text: &str) -> Result<()>;

    /// Close the socket and wait for the transport's own thread to stop.
    fn close(&self) -> Result<()>;

    /// Current socket state.
    fn state(&self) -> TransportState;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn open(&self, url: &Url, handler: EventHandler) -> Result<()> {
        (**self).open(url, handler)
    }

    fn send(&self, text: &str) -> Result<()> {
        (**self).send(text)
    }

    fn close(&self) -> Result<()> {
        (**self).close()
    }

    fn state(&self) -> TransportState {
        (**self).state()
    }
}

/// Build the DDP WebSocket endpoint for `host`.
///
/// `host` is the application address without scheme or `/websocket` suffix,
/// e.g. `localhost:3000`.
pub fn endpoint_url(host: &str, use_tls: bool) -> Result<Url> {
    let scheme = if use_tls { "wss" } else { "ws" };
    let raw = format!("{scheme}://{}/websocket", host.trim_end_matches('/'));
    Url::parse(&raw).map_err(|source| TransportError::InvalidUrl { url: raw, source })
}
