use crate::state::ConnectionState;

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The operation is not legal in the current connection state.
    #[error("cannot {operation} while connection is {state}")]
    ConnectionState {
        operation: &'static str,
        state: ConnectionState,
    },

    /// The transport never reached the open state.
    #[error("connection failed: {0}")]
    ConnectionFailure(String),

    /// The transport did not open within the connect timeout.
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    /// A frame was sent while the connection is not open.
    #[error("not connected (connection is {0})")]
    NotConnected(ConnectionState),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] netddp_transport::TransportError),

    /// Frame encoding error.
    #[error("frame error: {0}")]
    Frame(#[from] netddp_frame::FrameError),

    /// Ingress queue error.
    #[error("ingress queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Errors raised by the ingress queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue was disposed; the item was not accepted.
    #[error("ingress queue disposed")]
    Disposed,

    /// The worker thread could not be started.
    #[error("failed to spawn ingress worker: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
