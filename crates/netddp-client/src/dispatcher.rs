use std::sync::{Arc, Mutex, PoisonError};

use netddp_frame::{OutgoingFrame, RequestId};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

/// Destination for encoded outgoing frames.
pub trait FrameSink: Send + Sync {
    fn send_text(&self, text: &str) -> Result<()>;
}

impl<S: FrameSink + ?Sized> FrameSink for Arc<S> {
    fn send_text(&self, text: &str) -> Result<()> {
        (**self).send_text(text)
    }
}

/// Assigns request ids and sends `method` / `sub` frames.
///
/// Ids start at 1 and grow by one per request. Allocation and send happen
/// under one lock, so ids reach the sink in increasing order. An id is
/// consumed even when the send fails.
pub struct RequestDispatcher<S> {
    sink: S,
    next_id: Mutex<RequestId>,
}

impl<S: FrameSink> RequestDispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            next_id: Mutex::new(1),
        }
    }

    /// Invoke a server method. Returns the id carried in the sent frame.
    pub fn call(&self, method: &str, params: Vec<Value>) -> Result<RequestId> {
        self.dispatch(|id| OutgoingFrame::method(method, params, id))
    }

    /// Subscribe to a publication. Returns the id carried in the sent frame.
    pub fn subscribe(&self, name: &str, params: Vec<Value>) -> Result<RequestId> {
        self.dispatch(|id| OutgoingFrame::subscribe(name, params, id))
    }

    /// The id the next request will use.
    pub fn current_request_id(&self) -> RequestId {
        *self.next_id.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn dispatch(&self, build: impl FnOnce(RequestId) -> OutgoingFrame) -> Result<RequestId> {
        let mut next = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
        let id = *next;
        *next += 1;

        let frame = build(id);
        let text = frame.to_json()?;
        self.sink.send_text(&text)?;
        debug!(id, "request sent");
        Ok(id)
    }
}
