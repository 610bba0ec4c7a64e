use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

use crate::error::{Result, TransportError};
use crate::traits::{EventHandler, Transport, TransportEvent, TransportState};

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Configuration for [`WsTransport`].
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// How long one blocking read may hold the socket before yielding to senders.
    pub read_poll_interval: Duration,
    /// Name of the reader thread.
    pub thread_name: String,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            read_poll_interval: Duration::from_millis(50),
            thread_name: "netddp-ws-reader".to_string(),
        }
    }
}

struct Shared {
    socket: Mutex<Option<Socket>>,
    state: Mutex<TransportState>,
    stop: AtomicBool,
    epoch: AtomicU64,
}

impl Shared {
    /// True while `epoch` is the live connection and no close was requested.
    fn is_current(&self, epoch: u64) -> bool {
        !self.stop.load(Ordering::SeqCst) && self.epoch.load(Ordering::SeqCst) == epoch
    }
}

/// Blocking WebSocket transport built on `tungstenite`.
///
/// Each `open` spawns one reader thread that dials, raises `Open`, and then
/// forwards inbound text frames. The socket sits behind a mutex and reads use
/// a short timeout so `send` from other threads can interleave.
pub struct WsTransport {
    config: WsConfig,
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WsTransport {
    /// Create a transport with default configuration.
    pub fn new() -> Self {
        Self::with_config(WsConfig::default())
    }

    /// Create a transport with explicit configuration.
    pub fn with_config(config: WsConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                socket: Mutex::new(None),
                state: Mutex::new(TransportState::Closed),
                stop: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
            }),
            reader: Mutex::new(None),
        }
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WsTransport {
    fn open(&self, url: &Url, handler: EventHandler) -> Result<()> {
        {
            let mut state = lock(&self.shared.state);
            if *state != TransportState::Closed {
                return Err(TransportError::Shutdown);
            }
            *state = TransportState::Connecting;
        }
        self.shared.stop.store(false, Ordering::SeqCst);
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;

        handler(TransportEvent::Connecting);

        let shared = Arc::clone(&self.shared);
        let url = url.clone();
        let poll = self.config.read_poll_interval;
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || run_connection(shared, epoch, url, handler, poll));

        match spawned {
            Ok(handle) => {
                *lock(&self.reader) = Some(handle);
                Ok(())
            }
            Err(err) => {
                *lock(&self.shared.state) = TransportState::Closed;
                Err(TransportError::Io(err))
            }
        }
    }

    fn send(&self, text: &str) -> Result<()> {
        let mut guard = lock(&self.shared.socket);
        let socket = guard.as_mut().ok_or(TransportError::NotOpen)?;
        socket.send(Message::Text(text.to_owned()))?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.shared.stop.store(true, Ordering::SeqCst);

        let dialing = {
            let mut state = lock(&self.shared.state);
            let dialing = *state == TransportState::Connecting;
            if *state == TransportState::Open {
                *state = TransportState::Closing;
            }
            dialing
        };

        if let Some(socket) = lock(&self.shared.socket).as_mut() {
            if let Err(err) = socket.close(None) {
                debug!(error = %err, "close frame not sent");
            }
            let _ = socket.flush();
        }

        let handle = lock(&self.reader).take();
        if let Some(handle) = handle {
            // A dial in progress cannot be interrupted; its thread exits on its own
            // once the stop flag is observed.
            if !dialing
                && handle.thread().id() != thread::current().id()
                && handle.join().is_err()
            {
                warn!("websocket reader thread panicked");
            }
        }

        *lock(&self.shared.state) = TransportState::Closed;
        Ok(())
    }

    fn state(&self) -> TransportState {
        *lock(&self.shared.state)
    }
}

fn run_connection(
    shared: Arc<Shared>,
    epoch: u64,
    url: Url,
    handler: EventHandler,
    poll: Duration,
) {
    let socket = match tungstenite::connect(url.as_str()) {
        Ok((socket, _response)) => socket,
        Err(err) => {
            warn!(%url, error = %err, "websocket dial failed");
            if shared.is_current(epoch) {
                *lock(&shared.state) = TransportState::Closed;
            }
            handler(TransportEvent::Error(err.to_string()));
            handler(TransportEvent::Closed);
            return;
        }
    };

    // Closed (or reopened) while dialing: discard this socket.
    if !shared.is_current(epoch) {
        let mut socket = socket;
        let _ = socket.close(None);
        handler(TransportEvent::Closed);
        return;
    }

    if let Err(err) = set_read_timeout(socket.get_ref(), Some(poll)) {
        handler(TransportEvent::Error(format!("failed to set read timeout: {err}")));
    }

    *lock(&shared.socket) = Some(socket);
    *lock(&shared.state) = TransportState::Open;
    info!(%url, "websocket open");
    handler(TransportEvent::Open);

    while shared.is_current(epoch) {
        let read = {
            let mut guard = lock(&shared.socket);
            match guard.as_mut() {
                Some(socket) => socket.read(),
                None => break,
            }
        };

        match read {
            Ok(Message::Text(text)) => handler(TransportEvent::Message(text)),
            Ok(Message::Close(frame)) => debug!(?frame, "close frame received"),
            Ok(_) => {}
            Err(tungstenite::Error::Io(err))
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                break;
            }
            Err(err) => {
                handler(TransportEvent::Error(err.to_string()));
                break;
            }
        }
    }

    if shared.epoch.load(Ordering::SeqCst) == epoch {
        lock(&shared.socket).take();
        *lock(&shared.state) = TransportState::Closed;
    }
    debug!(%url, "websocket reader stopped");
    handler(TransportEvent::Closed);
}

fn set_read_timeout(
    stream: &MaybeTlsStream<TcpStream>,
    timeout: Option<Duration>,
) -> std::io::Result<()> {
    match stream {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(timeout),
        MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(timeout),
        _ => Ok(()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
