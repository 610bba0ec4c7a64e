//! Client for DDP, the method-call and live-subscription protocol spoken
//! over a WebSocket.
//!
//! # Crate Structure
//!
//! - [`transport`]: socket abstraction and the WebSocket adapter
//! - [`frame`]: outgoing frame encoding and inbound frame classification
//! - [`client`]: connection lifecycle, request dispatch, ordered ingress
//!
//! ```no_run
//! use netddp::{DdpClient, IncomingEvent};
//!
//! let client = DdpClient::websocket(|event: IncomingEvent| println!("{event:?}"))?;
//! client.connect_without_tls("localhost:3000")?;
//! client.subscribe("tasks", Vec::new())?;
//! # Ok::<(), netddp::ClientError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use netddp_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use netddp_frame::*;
}

/// Re-export client types.
pub mod client {
    pub use netddp_client::*;
}

pub use netddp_client::{
    ClientConfig, ClientError, ConnectionEvent, ConnectionState, DdpClient, FieldValue,
    IncomingEvent, Record, RequestId, Subscriber,
};
