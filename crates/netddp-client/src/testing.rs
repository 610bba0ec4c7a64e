//! In-memory transport for unit tests.

use std::sync::{Arc, Mutex};
use std::thread;

use netddp_transport::{EventHandler, Transport, TransportError, TransportEvent, TransportState};
use url::Url;

/// How [`FakeTransport::open`] behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Report `Open` from a background thread.
    Open,
    /// Report `Error("connection refused")` then `Closed`.
    Refuse,
    /// Never report anything.
    Hang,
    /// Fail synchronously.
    FailToStart,
}

#[derive(Default)]
struct Inner {
    handler: Option<EventHandler>,
    state: Option<TransportState>,
    sent: Vec<String>,
    urls: Vec<String>,
    closes: usize,
}

pub struct FakeTransport {
    mode: OpenMode,
    inner: Mutex<Inner>,
}

impl FakeTransport {
    pub fn new(mode: OpenMode) -> Self {
        Self {
            mode,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub fn last_url(&self) -> Option<String> {
        self.inner.lock().unwrap().urls.last().cloned()
    }

    pub fn close_count(&self) -> usize {
        self.inner.lock().unwrap().closes
    }

    /// Deliver `event` through the handler of the most recent `open`.
    pub fn emit(&self, event: TransportEvent) {
        let handler = self.inner.lock().unwrap().handler.clone();
        if let Some(handler) = handler {
            handler(event);
        }
    }
}

impl Transport for FakeTransport {
    fn open(&self, url: &Url, handler: EventHandler) -> netddp_transport::Result<()> {
        if self.mode == OpenMode::FailToStart {
            return Err(TransportError::Io(std::io::Error::other("open failed")));
        }
        {
            let mut inner = self.inner.lock().unwrap();
            inner.urls.push(url.to_string());
            inner.handler = Some(Arc::clone(&handler));
            inner.state = Some(TransportState::Connecting);
        }
        match self.mode {
            OpenMode::Open => {
                self.inner.lock().unwrap().state = Some(TransportState::Open);
                thread::spawn(move || handler(TransportEvent::Open));
            }
            OpenMode::Refuse => {
                self.inner.lock().unwrap().state = Some(TransportState::Closed);
                thread::spawn(move || {
                    handler(TransportEvent::Error("connection refused".to_string()));
                    handler(TransportEvent::Closed);
                });
            }
            OpenMode::Hang | OpenMode::FailToStart => {}
        }
        Ok(())
    }

    fn send(&self, text: &str) -> netddp_transport::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != Some(TransportState::Open) {
            return Err(TransportError::NotOpen);
        }
        inner.sent.push(text.to_string());
        Ok(())
    }

    fn close(&self) -> netddp_transport::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.closes += 1;
        inner.state = Some(TransportState::Closed);
        Ok(())
    }

    fn state(&self) -> TransportState {
        self.inner
            .lock()
            .unwrap()
            .state
            .unwrap_or(TransportState::Closed)
    }
}
