//! DDP client.
//!
//! Wires the pieces of a live DDP session together:
//! - [`ConnectionStateTracker`]: connection lifecycle and handshake
//! - [`RequestDispatcher`]: request ids and outgoing `method` / `sub` frames
//! - [`IngressQueue`]: ordered, single-worker delivery of inbound frames
//! - [`DdpClient`]: the facade that owns one of each

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod state;
pub mod subscriber;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use client::{ClientConfig, DdpClient};
pub use dispatcher::{FrameSink, RequestDispatcher};
pub use error::{ClientError, QueueError, Result};
pub use queue::{IngressQueue, ProcessResult, QueueConfig, QueueStats};
pub use state::{
    ConnectionError, ConnectionEvent, ConnectionObserver, ConnectionState, ObserverId,
};
pub use subscriber::{NullSubscriber, Subscriber};
pub use tracker::ConnectionStateTracker;

pub use netddp_frame::{FieldValue, IncomingEvent, Record, RequestId};
