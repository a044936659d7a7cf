//! Deferred responses waiting for a fresh snapshot.
//!
//! A caller that needs current display state registers a waiter, which
//! sends one `UPDATE` to the display process and arms a fallback timer.
//! The waiter is completed by whichever comes first:
//!
//! - the next `CURRENT_STATUS` ([`Waiters::resolve_all`]), with that snapshot;
//! - its timer, with whatever snapshot is held at that moment (possibly stale
//!   or absent).
//!
//! Each waiter carries an atomic resolved flag; the path that flips it runs
//! the callback and the other path is a no-op, so a callback runs exactly once.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::channel::Channel;
use crate::snapshot::Snapshot;

/// Completion callback. Receives the snapshot current at resolution time.
pub type OnReady = Box<dyn FnOnce(Option<Arc<Snapshot>>) + Send + 'static>;

/// Creation-ordered waiter identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaiterId(u64);

struct Waiter {
    id: WaiterId,
    resolved: AtomicBool,
    on_ready: Mutex<Option<OnReady>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Waiter {
    /// Resolve the waiter. Returns `false` if it was already resolved.
    fn resolve(&self, snapshot: Option<Arc<Snapshot>>) -> bool {
        if self.resolved.swap(true, Ordering::AcqRel) {
            return false;
        }
        let on_ready = self.on_ready.lock().take();
        if let Some(on_ready) = on_ready {
            on_ready(snapshot);
        }
        true
    }
}

struct Inner {
    pending: Mutex<Vec<Arc<Waiter>>>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    next_id: AtomicU64,
    channel: Channel,
    default_timeout: Duration,
}

/// Registry of pending waiters plus the process-wide snapshot.
#[derive(Clone)]
pub struct Waiters {
    inner: Arc<Inner>,
}

impl Waiters {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

    pub fn new(channel: Channel) -> Self {
        Self::with_timeout(channel, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(channel: Channel, default_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(Vec::new()),
                snapshot: RwLock::new(None),
                next_id: AtomicU64::new(0),
                channel,
                default_timeout,
            }),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Register a waiter and request a refresh. Returns immediately.
    ///
    /// Exactly one `UPDATE` is sent per call, even if other waiters are
    /// already pending. Must be called from within a Tokio runtime.
    pub fn await_fresh_state<F>(&self, on_ready: F, timeout: Duration) -> WaiterId
    where
        F: FnOnce(Option<Arc<Snapshot>>) + Send + 'static,
    {
        let id = WaiterId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let waiter = Arc::new(Waiter {
            id,
            resolved: AtomicBool::new(false),
            on_ready: Mutex::new(Some(Box::new(on_ready))),
            timer: Mutex::new(None),
        });

        self.inner.pending.lock().push(waiter.clone());
        self.inner.channel.request_update();

        let inner = self.inner.clone();
        let timed = waiter.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let current = inner.snapshot.read().clone();
            if timed.resolve(current) {
                tracing::debug!(waiter = timed.id.0, "no fresh status before timeout");
                inner.pending.lock().retain(|w| w.id != timed.id);
            }
        });
        *waiter.timer.lock() = Some(timer);

        id
    }

    /// Wait for a fresh snapshot, or the best available one after `timeout`.
    pub async fn fresh(&self, timeout: Duration) -> Option<Arc<Snapshot>> {
        let (tx, rx) = oneshot::channel();
        self.await_fresh_state(
            move |snapshot| {
                let _ = tx.send(snapshot);
            },
            timeout,
        );
        match rx.await {
            Ok(snapshot) => snapshot,
            Err(_) => self.current(),
        }
    }

    /// Store a newly arrived snapshot and complete every pending waiter.
    pub fn resolve_all(&self, snapshot: Snapshot) {
        let snapshot = Arc::new(snapshot);
        *self.inner.snapshot.write() = Some(snapshot.clone());

        let drained = std::mem::take(&mut *self.inner.pending.lock());
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "resolving waiters with fresh status");
        }
        for waiter in drained {
            if let Some(timer) = waiter.timer.lock().take() {
                timer.abort();
            }
            waiter.resolve(Some(snapshot.clone()));
        }
    }

    /// The most recently received snapshot.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.inner.snapshot.read().clone()
    }

    pub fn pending(&self) -> usize {
        self.inner.pending.lock().len()
    }
}
