use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
#[cfg(any(test, feature = "test-util"))]
use std::time::Duration;

use netddp_frame::{classify, RequestId};
use netddp_transport::Transport;
use serde_json::Value;
use tracing::{debug, trace};

use crate::dispatcher::RequestDispatcher;
use crate::error::Result;
use crate::queue::{IngressQueue, QueueConfig, QueueStats};
use crate::state::{ConnectionEvent, ConnectionState, ObserverId};
use crate::subscriber::Subscriber;
use crate::tracker::{ConnectionStateTracker, DEFAULT_CONNECT_TIMEOUT};

/// Client tuning.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long `connect` waits for the socket to open.
    pub connect_timeout: std::time::Duration,
    /// Inbound frame buffering.
    pub queue: QueueConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            queue: QueueConfig::default(),
        }
    }
}

/// A DDP client session.
///
/// Owns one connection tracker, one request dispatcher, and one ingress
/// queue. Inbound frames are classified on the queue's worker thread and
/// handed to the [`Subscriber`] in arrival order; frames that classify to
/// nothing are dropped.
///
/// The subscriber must not call [`DdpClient::close`] or [`DdpClient::dispose`]
/// from inside `data_received`.
pub struct DdpClient {
    tracker: Arc<ConnectionStateTracker>,
    dispatcher: RequestDispatcher<Arc<ConnectionStateTracker>>,
    queue: Arc<IngressQueue<String>>,
    ingress_observer: ObserverId,
    disposed: AtomicBool,
}

impl DdpClient {
    pub fn new<T, S>(transport: T, subscriber: S) -> Result<Self>
    where
        T: Transport + 'static,
        S: Subscriber,
    {
        Self::with_config(transport, subscriber, ClientConfig::default())
    }

    pub fn with_config<T, S>(transport: T, mut subscriber: S, config: ClientConfig) -> Result<Self>
    where
        T: Transport + 'static,
        S: Subscriber,
    {
        let queue = Arc::new(IngressQueue::new(config.queue, move |raw: String| {
            match classify(&raw)? {
                Some(event) => {
                    trace!(kind = event.kind(), "delivering event");
                    subscriber.data_received(event);
                }
                None => trace!("frame dropped"),
            }
            Ok(())
        })?);

        let tracker = Arc::new(ConnectionStateTracker::with_timeout(
            transport,
            config.connect_timeout,
        ));

        let ingress = Arc::clone(&queue);
        let ingress_observer = tracker.add_observer(move |event: &ConnectionEvent| {
            if let ConnectionEvent::MessageReceived(raw) = event {
                if let Err(err) = ingress.enqueue(raw.clone()) {
                    debug!(error = %err, "inbound frame not queued");
                }
            }
        });

        Ok(Self {
            dispatcher: RequestDispatcher::new(Arc::clone(&tracker)),
            tracker,
            queue,
            ingress_observer,
            disposed: AtomicBool::new(false),
        })
    }

    /// Client over the WebSocket transport with default settings.
    #[cfg(feature = "websocket")]
    pub fn websocket<S: Subscriber>(subscriber: S) -> Result<Self> {
        Self::new(netddp_transport::WsTransport::new(), subscriber)
    }

    /// Connect to `host` and perform the handshake.
    pub fn connect(&self, host: &str, use_tls: bool) -> Result<()> {
        self.tracker.connect(host, use_tls)
    }

    pub fn connect_with_tls(&self, host: &str) -> Result<()> {
        self.tracker.connect_with_tls(host)
    }

    pub fn connect_without_tls(&self, host: &str) -> Result<()> {
        self.tracker.connect_without_tls(host)
    }

    /// Invoke `method` with positional `params`. Returns the request id.
    pub fn call(&self, method: &str, params: Vec<Value>) -> Result<RequestId> {
        self.dispatcher.call(method, params)
    }

    /// Subscribe to publication `name`. Returns the subscription id.
    pub fn subscribe(&self, name: &str, params: Vec<Value>) -> Result<RequestId> {
        self.dispatcher.subscribe(name, params)
    }

    /// The id the next request will use.
    pub fn current_request_id(&self) -> RequestId {
        self.dispatcher.current_request_id()
    }

    pub fn state(&self) -> ConnectionState {
        self.tracker.state()
    }

    /// The underlying tracker, for registering connection observers.
    pub fn state_tracker(&self) -> &ConnectionStateTracker {
        &self.tracker
    }

    /// Close the connection. The client can connect again afterwards.
    pub fn close(&self) -> Result<()> {
        self.tracker.close()
    }

    /// Release the session: close the connection if needed and stop the
    /// ingress worker. Safe to call more than once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.tracker.state() != ConnectionState::Closed {
            if let Err(err) = self.tracker.close() {
                debug!(error = %err, "close during dispose");
            }
        }
        self.tracker.remove_observer(self.ingress_observer);
        self.queue.dispose();
        debug!("client disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Counters of the ingress worker.
    pub fn ingress_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Wait until every queued inbound frame has been processed.
    #[cfg(any(test, feature = "test-util"))]
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.queue.wait_until_idle(timeout)
    }
}

impl Drop for DdpClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use netddp_frame::IncomingEvent;
    use netddp_transport::TransportEvent;
    use serde_json::json;

    use super::*;
    use crate::error::ClientError;
    use crate::testing::{FakeTransport, OpenMode};

    const IDLE: Duration = Duration::from_secs(5);

    fn client() -> (DdpClient, Arc<FakeTransport>, Arc<Mutex<Vec<IncomingEvent>>>) {
        let transport = Arc::new(FakeTransport::new(OpenMode::Open));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let client = DdpClient::new(Arc::clone(&transport), move |event: IncomingEvent| {
            sink.lock().unwrap().push(event);
        })
        .unwrap();
        (client, transport, events)
    }

    fn kinds(events: &Mutex<Vec<IncomingEvent>>) -> Vec<&'static str> {
        events.lock().unwrap().iter().map(IncomingEvent::kind).collect()
    }

    #[test]
    fn inbound_frames_reach_subscriber_in_order() {
        let (client, transport, events) = client();
        client.connect_without_tls("localhost:3000").unwrap();

        for raw in [
            r#"{"msg":"connected","session":"abc"}"#,
            "not json",
            r#"{"msg":"added","collection":"tasks","id":"t1","fields":{"title":"x"}}"#,
            r#"{"msg":"ping"}"#,
            r#"{"msg":"ready","subs":["1"]}"#,
            r#"{"msg":"result","id":"1","result":5}"#,
            r#"{"msg":"error","reason":"bad request"}"#,
        ] {
            transport.emit(TransportEvent::Message(raw.to_string()));
        }
        assert!(client.wait_until_idle(IDLE));

        assert_eq!(
            kinds(&events),
            vec!["connected", "added", "ready", "method_result", "protocol_error"]
        );
        let stats = client.ingress_stats();
        assert_eq!(stats.processed, 7);
        assert_eq!(stats.failed, 1);

        let events = events.lock().unwrap();
        let record = events[1].record().unwrap();
        assert_eq!(record["Title"].as_text(), Some("x"));
        assert_eq!(record["Id"].as_text(), Some("t1"));
        assert_eq!(
            events[3],
            IncomingEvent::MethodResult {
                requesting_id: "1".to_string(),
                result: json!(5)
            }
        );
    }

    #[test]
    fn requests_follow_the_handshake() {
        let (client, transport, _events) = client();
        client.connect_without_tls("localhost:3000").unwrap();

        let call = client.call("add", vec![json!(1), json!(2)]).unwrap();
        let sub = client.subscribe("tasks", Vec::new()).unwrap();

        assert_eq!((call, sub), (1, 2));
        assert_eq!(
            transport.sent(),
            vec![
                r#"{"msg":"connect","version":"pre1","support":["pre1"]}"#.to_string(),
                r#"{"msg":"method","method":"add","params":[1,2],"id":"1"}"#.to_string(),
                r#"{"msg":"sub","name":"tasks","params":[],"id":"2"}"#.to_string(),
            ]
        );
    }

    #[test]
    fn call_before_connect_fails_and_consumes_id() {
        let (client, transport, _events) = client();

        let err = client.call("m", Vec::new()).unwrap_err();

        assert!(matches!(err, ClientError::NotConnected(ConnectionState::Closed)));
        assert_eq!(client.current_request_id(), 2);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn dispose_stops_delivery_and_is_idempotent() {
        let (client, transport, events) = client();
        client.connect_without_tls("localhost:3000").unwrap();

        client.dispose();
        client.dispose();

        assert!(client.is_disposed());
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(transport.close_count(), 1);

        transport.emit(TransportEvent::Message(
            r#"{"msg":"connected","session":"late"}"#.to_string(),
        ));
        assert!(events.lock().unwrap().is_empty());
    }

    #[test]
    fn panicking_subscriber_does_not_stop_delivery() {
        let transport = Arc::new(FakeTransport::new(OpenMode::Open));
        let sessions = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&sessions);
        let client = DdpClient::new(Arc::clone(&transport), move |event: IncomingEvent| {
            if let IncomingEvent::Connected { session } = event {
                if session == "boom" {
                    panic!("subscriber failure");
                }
                sink.lock().unwrap().push(session);
            }
        })
        .unwrap();
        client.connect_without_tls("localhost:3000").unwrap();

        for session in ["a", "boom", "b"] {
            transport.emit(TransportEvent::Message(format!(r#"{{"session":"{session}"}}"#)));
        }
        assert!(client.wait_until_idle(IDLE));

        assert_eq!(*sessions.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(client.ingress_stats().failed, 1);
    }

    #[test]
    fn client_reconnects_after_close() {
        let (client, transport, _events) = client();
        client.connect_without_tls("localhost:3000").unwrap();
        client.close().unwrap();
        assert!(matches!(
            client.close(),
            Err(ClientError::ConnectionState { .. })
        ));

        client.connect_with_tls("localhost:3000").unwrap();

        assert_eq!(client.state(), ConnectionState::Open);
        assert_eq!(
            transport.last_url().as_deref(),
            Some("wss://localhost:3000/websocket")
        );
    }

    #[test]
    fn custom_config_applies_connect_timeout() {
        let transport = Arc::new(FakeTransport::new(OpenMode::Hang));
        let config = ClientConfig {
            connect_timeout: Duration::from_millis(50),
            ..ClientConfig::default()
        };
        let client = DdpClient::with_config(Arc::clone(&transport), crate::NullSubscriber, config)
            .unwrap();

        let err = client.connect_without_tls("localhost:3000").unwrap_err();

        assert!(matches!(
            err,
            ClientError::ConnectTimeout(timeout) if timeout == Duration::from_millis(50)
        ));
        assert_eq!(client.state(), ConnectionState::Closed);
    }
}
