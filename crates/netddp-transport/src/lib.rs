//! Socket transport boundary for the DDP client.
//!
//! Defines the contract the connection layer drives:
//! - open a socket to a URL and report lifecycle events asynchronously
//! - send text frames
//! - close and report the current state
//!
//! The [`WsTransport`] adapter (feature `websocket`) implements it over a
//! blocking `tungstenite` WebSocket.

pub mod error;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::{Result, TransportError};
pub use traits::{endpoint_url, EventHandler, Transport, TransportEvent, TransportState};

#[cfg(feature = "websocket")]
pub use websocket::{WsConfig, WsTransport};
