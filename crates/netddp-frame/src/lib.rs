//! DDP wire frames.
//!
//! Outgoing frames are typed and serialized as single JSON objects:
//! - `connect` handshake
//! - `method` calls
//! - `sub` subscriptions
//!
//! Inbound frames are classified into a closed set of [`IncomingEvent`]
//! variants by [`classify`].

pub mod classify;
pub mod error;
pub mod event;
pub mod message;
pub mod outgoing;

pub use classify::{classify, classify_value, normalize_field_name};
pub use error::{FrameError, Result};
pub use event::{FieldValue, IncomingEvent, Record};
pub use message::{DDP_SUPPORTED_VERSIONS, DDP_VERSION};
pub use outgoing::{OutgoingFrame, RequestId};
