//! Bounded, ordered, single-consumer ingress pipeline.
//!
//! The transport hands inbound frames to [`IngressQueue::enqueue`] from its
//! callback thread. One dedicated worker thread takes them out in arrival
//! order and runs the processor on each, one at a time. A failing or
//! panicking processor call is logged and counted; the worker moves on.
//!
//! [`IngressQueue::dispose`] stops the worker after its in-flight item. Items
//! still buffered at that point are abandoned, and later `enqueue` calls are
//! rejected with [`QueueError::Disposed`].

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
#[cfg(any(test, feature = "test-util"))]
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::error::QueueError;

/// Outcome of processing one item.
pub type ProcessResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Default buffer capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Configuration for an [`IngressQueue`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of buffered items before `enqueue` blocks.
    pub capacity: usize,
    /// Name of the worker thread.
    pub thread_name: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            thread_name: "netddp-ingress".to_string(),
        }
    }
}

/// Worker counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Items the processor finished with, successfully or not.
    pub processed: u64,
    /// Items whose processing returned an error or panicked.
    pub failed: u64,
}

struct QueueState<T> {
    items: VecDeque<T>,
    disposed: bool,
    in_flight: bool,
    stats: QueueStats,
}

struct Shared<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    idle: Condvar,
    capacity: usize,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ordered single-worker queue. Every instance owns its own worker and buffer.
pub struct IngressQueue<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> IngressQueue<T> {
    /// Create the queue and start its worker thread.
    pub fn new<F>(config: QueueConfig, processor: F) -> Result<Self, QueueError>
    where
        F: FnMut(T) -> ProcessResult + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                disposed: false,
                in_flight: false,
                stats: QueueStats::default(),
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            idle: Condvar::new(),
            capacity: config.capacity.max(1),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(config.thread_name)
            .spawn(move || run_worker(worker_shared, processor))
            .map_err(QueueError::Spawn)?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Append an item, blocking while the buffer is full.
    ///
    /// Fails with [`QueueError::Disposed`] once the queue is disposed, including
    /// for a producer that was blocked when disposal happened.
    pub fn enqueue(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.shared.lock();
        loop {
            if state.disposed {
                return Err(QueueError::Disposed);
            }
            if state.items.len() < self.shared.capacity {
                state.items.push_back(item);
                drop(state);
                self.shared.not_empty.notify_one();
                return Ok(());
            }
            state = self
                .shared
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Signal the worker to stop after its in-flight item. Idempotent and
    /// non-blocking.
    pub fn dispose(&self) {
        {
            let mut state = self.shared.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            debug!(abandoned = state.items.len(), "ingress queue disposed");
        }
        self.shared.not_empty.notify_all();
        self.shared.not_full.notify_all();
        self.shared.idle.notify_all();
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    /// Number of buffered items not yet taken by the worker.
    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        self.shared.lock().stats
    }

    /// Block until nothing is buffered or in flight, the queue is disposed,
    /// or `timeout` passes. Returns true if the queue went idle.
    ///
    /// For tests only; production code must not rely on draining.
    #[cfg(any(test, feature = "test-util"))]
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if state.items.is_empty() && !state.in_flight {
                return true;
            }
            if state.disposed {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .idle
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl<T: Send + 'static> Drop for IngressQueue<T> {
    fn drop(&mut self) {
        self.dispose();
        let handle = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                error!("ingress worker thread panicked");
            }
        }
    }
}

fn run_worker<T, F>(shared: Arc<Shared<T>>, mut processor: F)
where
    F: FnMut(T) -> ProcessResult,
{
    loop {
        let item = {
            let mut state = shared.lock();
            loop {
                if state.disposed {
                    debug!(abandoned = state.items.len(), "ingress worker stopping");
                    return;
                }
                if let Some(item) = state.items.pop_front() {
                    state.in_flight = true;
                    break item;
                }
                state = shared
                    .not_empty
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };
        shared.not_full.notify_one();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| processor(item)));

        {
            let mut state = shared.lock();
            state.in_flight = false;
            state.stats.processed += 1;
            if !matches!(outcome, Ok(Ok(()))) {
                state.stats.failed += 1;
            }
        }
        shared.idle.notify_all();

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "ingress item failed, continuing"),
            Err(payload) => error!(
                panic = panic_message(payload.as_ref()),
                "ingress processor panicked, continuing"
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
