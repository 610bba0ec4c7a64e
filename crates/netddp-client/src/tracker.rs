use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use netddp_frame::OutgoingFrame;
use netddp_transport::{endpoint_url, EventHandler, Transport, TransportEvent};
use tracing::{debug, info, warn};

use crate::dispatcher::FrameSink;
use crate::error::{ClientError, Result};
use crate::state::{
    ConnectionError, ConnectionEvent, ConnectionObserver, ConnectionState, ObserverId,
};

/// Default bound on how long `connect` waits for the socket to open.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

struct Cell {
    state: ConnectionState,
    /// Bumped on every connect and close; transport events tagged with an
    /// older generation are ignored.
    generation: u64,
    last_error: Option<String>,
}

struct Shared {
    transport: Box<dyn Transport>,
    cell: Mutex<Cell>,
    changed: Condvar,
    /// Held while a received message is checked and delivered; `close` takes
    /// it once after detaching so no delivery outlives the `Closed` event.
    delivery: Mutex<()>,
    observers: Mutex<Vec<(ObserverId, Arc<dyn ConnectionObserver>)>>,
    next_observer: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Cell> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: ConnectionEvent) {
        let observers: Vec<Arc<dyn ConnectionObserver>> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer.on_event(&event);
        }
    }

    fn wait_for_deliveries(&self) {
        drop(self.delivery.lock().unwrap_or_else(PoisonError::into_inner));
    }

    fn handle_transport_event(&self, generation: u64, handshake: &str, event: TransportEvent) {
        match event {
            // The tracker raises its own `Connecting` before opening the transport.
            TransportEvent::Connecting => {}
            TransportEvent::Open => {
                let outcome = {
                    let mut cell = self.lock();
                    if cell.generation != generation || cell.state != ConnectionState::Connecting {
                        return;
                    }
                    // The handshake goes out before anyone can see the
                    // connection as open, so it is always the first frame.
                    match self.transport.send(handshake) {
                        Ok(()) => {
                            cell.state = ConnectionState::Open;
                            Ok(())
                        }
                        Err(err) => {
                            let message = format!("handshake not sent: {err}");
                            cell.state = ConnectionState::Closed;
                            cell.last_error = Some(message.clone());
                            Err(message)
                        }
                    }
                };
                self.changed.notify_all();
                match outcome {
                    Ok(()) => {
                        debug!("handshake sent, connection open");
                        self.notify(ConnectionEvent::Open);
                    }
                    Err(message) => {
                        warn!(error = %message, "handshake failed");
                        self.notify(ConnectionEvent::Error(ConnectionError { message }));
                        self.notify(ConnectionEvent::Closed);
                    }
                }
            }
            TransportEvent::Error(message) => {
                {
                    let mut cell = self.lock();
                    if cell.generation != generation {
                        return;
                    }
                    cell.last_error = Some(message.clone());
                }
                warn!(error = %message, "transport error");
                self.notify(ConnectionEvent::Error(ConnectionError { message }));
            }
            TransportEvent::Closed => {
                let closed = {
                    let mut cell = self.lock();
                    let current =
                        cell.generation == generation && cell.state != ConnectionState::Closed;
                    if current {
                        cell.state = ConnectionState::Closed;
                    }
                    current
                };
                if closed {
                    self.changed.notify_all();
                    info!("connection closed by transport");
                    self.notify(ConnectionEvent::Closed);
                }
            }
            TransportEvent::Message(text) => {
                let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
                if self.lock().generation != generation {
                    return;
                }
                self.notify(ConnectionEvent::MessageReceived(text));
            }
        }
    }
}

/// Owns the connection state machine on top of a [`Transport`].
///
/// Transitions: Closed → Connecting → Open → Closed, or Connecting → Closed
/// when the socket never opens. `connect` and `close` are serialized against
/// each other; transport events from a superseded attempt are dropped.
///
/// The DDP handshake is sent from the transport's `Open` event, before the
/// state becomes `Open` and before observers hear about it. Observers of
/// `MessageReceived` must not call [`close`](Self::close): `close` waits for
/// in-flight deliveries to finish.
pub struct ConnectionStateTracker {
    connect_timeout: Duration,
    lifecycle: Mutex<()>,
    shared: Arc<Shared>,
}

impl ConnectionStateTracker {
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self::with_timeout(transport, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_timeout<T: Transport + 'static>(transport: T, connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            lifecycle: Mutex::new(()),
            shared: Arc::new(Shared {
                transport: Box::new(transport),
                cell: Mutex::new(Cell {
                    state: ConnectionState::Closed,
                    generation: 0,
                    last_error: None,
                }),
                changed: Condvar::new(),
                delivery: Mutex::new(()),
                observers: Mutex::new(Vec::new()),
                next_observer: AtomicU64::new(1),
            }),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Register an observer for future notifications.
    pub fn add_observer(&self, observer: impl ConnectionObserver + 'static) -> ObserverId {
        let id = ObserverId(self.shared.next_observer.fetch_add(1, Ordering::Relaxed));
        self.shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(observer)));
        id
    }

    /// Unregister an observer. Returns false if it was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = self
            .shared
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(registered, _)| *registered != id);
        observers.len() != before
    }

    /// Connect to `host` (e.g. `localhost:3000`) and perform the DDP handshake.
    ///
    /// Blocks until the socket opens, closes, or the connect timeout passes.
    pub fn connect(&self, host: &str, use_tls: bool) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);

        let url = endpoint_url(host, use_tls)?;
        let handshake = OutgoingFrame::connect().to_json()?;

        let generation = {
            let mut cell = self.shared.lock();
            if cell.state != ConnectionState::Closed {
                return Err(ClientError::ConnectionState {
                    operation: "connect",
                    state: cell.state,
                });
            }
            cell.state = ConnectionState::Connecting;
            cell.generation += 1;
            cell.last_error = None;
            cell.generation
        };
        info!(%url, "connecting");
        self.shared.notify(ConnectionEvent::Connecting);

        let handler = self.event_handler(generation, handshake);
        if let Err(err) = self.shared.transport.open(&url, handler) {
            self.abandon_attempt(generation);
            return Err(ClientError::ConnectionFailure(err.to_string()));
        }

        match self.wait_for_outcome(generation) {
            ConnectionState::Open => Ok(()),
            ConnectionState::Closed => {
                let reason = self
                    .shared
                    .lock()
                    .last_error
                    .take()
                    .unwrap_or_else(|| "transport closed before opening".to_string());
                // A failed handshake leaves the socket itself open.
                self.abandon_attempt(generation);
                Err(ClientError::ConnectionFailure(reason))
            }
            ConnectionState::Connecting => {
                self.abandon_attempt(generation);
                Err(ClientError::ConnectTimeout(self.connect_timeout))
            }
        }
    }

    /// Connect over `wss://`.
    pub fn connect_with_tls(&self, host: &str) -> Result<()> {
        self.connect(host, true)
    }

    /// Connect over plain `ws://`.
    pub fn connect_without_tls(&self, host: &str) -> Result<()> {
        self.connect(host, false)
    }

    /// Close the connection. Fails if it is already closed.
    pub fn close(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);

        {
            let mut cell = self.shared.lock();
            if cell.state == ConnectionState::Closed {
                return Err(ClientError::ConnectionState {
                    operation: "close",
                    state: cell.state,
                });
            }
            // Detach: events from the closing transport are now stale.
            cell.generation += 1;
        }
        self.shared.wait_for_deliveries();

        let result = self.shared.transport.close();
        self.shared.lock().state = ConnectionState::Closed;
        self.shared.changed.notify_all();
        info!("connection closed");
        self.shared.notify(ConnectionEvent::Closed);

        result.map_err(ClientError::from)
    }

    /// Send a raw text frame. Fails with [`ClientError::NotConnected`] unless open.
    pub fn send(&self, text: &str) -> Result<()> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(ClientError::NotConnected(state));
        }
        self.shared.transport.send(text)?;
        Ok(())
    }

    fn event_handler(&self, generation: u64, handshake: String) -> EventHandler {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Arc::new(move |event| {
            if let Some(shared) = shared.upgrade() {
                shared.handle_transport_event(generation, &handshake, event);
            }
        })
    }

    fn wait_for_outcome(&self, generation: u64) -> ConnectionState {
        let deadline = Instant::now() + self.connect_timeout;
        let mut cell = self.shared.lock();
        loop {
            if cell.generation != generation {
                return ConnectionState::Closed;
            }
            if cell.state != ConnectionState::Connecting {
                return cell.state;
            }
            let now = Instant::now();
            if now >= deadline {
                return ConnectionState::Connecting;
            }
            cell = self
                .shared
                .changed
                .wait_timeout(cell, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Give up on a connect attempt: detach, close the transport, and report
    /// `Closed` if this call is the one that leaves the open/connecting state.
    fn abandon_attempt(&self, generation: u64) {
        let transitioned = {
            let mut cell = self.shared.lock();
            let current = cell.generation == generation && cell.state != ConnectionState::Closed;
            cell.generation += 1;
            cell.state = ConnectionState::Closed;
            current
        };
        self.shared.wait_for_deliveries();
        if let Err(err) = self.shared.transport.close() {
            debug!(error = %err, "transport close after failed connect");
        }
        self.shared.changed.notify_all();
        if transitioned {
            self.shared.notify(ConnectionEvent::Closed);
        }
    }
}

impl FrameSink for ConnectionStateTracker {
    fn send_text(&self, text: &str) -> Result<()> {
        self.send(text)
    }
}
