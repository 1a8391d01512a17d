//! Refresh signal bus: a fire-and-forget "something changed, re-pull" channel.
//!
//! Emissions carry no payload and may coalesce: a slow listener across a
//! burst of `notify()` calls is guaranteed to observe at least one event,
//! never a count of changes. Consumers re-pull full state, they do not apply
//! deltas.

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt as _};

const DEFAULT_CAPACITY: usize = 64;

/// Process-lifetime refresh bus. Built once by the composition root and
/// cloned into producers and consumers; there is no global instance.
#[derive(Debug, Clone)]
pub struct RefreshBus {
    tx: broadcast::Sender<()>,
}

impl RefreshBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// A smaller capacity coalesces bursts sooner; listeners still observe
    /// at least one event per burst.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Record one emission. Never blocks, never fails; an emission with no
    /// live listeners is silently dropped.
    pub fn notify(&self) {
        let _ = self.tx.send(());
    }

    /// Register a listener. Only emissions after this call are visible;
    /// nothing is delivered retroactively.
    pub fn subscribe(&self) -> RefreshListener {
        RefreshListener {
            rx: self.tx.subscribe(),
        }
    }

    /// The same subscription surfaced as a unit stream, for consumers that
    /// want to plug the bus into stream combinators.
    pub fn stream(&self) -> impl Stream<Item = ()> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|msg| msg.ok())
    }
}

impl Default for RefreshBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half of the bus.
#[derive(Debug)]
pub struct RefreshListener {
    rx: broadcast::Receiver<()>,
}

impl RefreshListener {
    /// Wait until at least one emission has occurred since the last observed
    /// one. A lagged receiver counts as exactly one observed event.
    /// Returns `false` once the bus has been dropped.
    pub async fn changed(&mut self) -> bool {
        match self.rx.recv().await {
            Ok(()) => true,
            Err(broadcast::error::RecvError::Lagged(_)) => true,
            Err(broadcast::error::RecvError::Closed) => false,
        }
    }

    /// Non-blocking probe: `true` if an emission is pending (a lag counts as
    /// one), `false` if the bus is idle or gone.
    pub fn try_changed(&mut self) -> bool {
        match self.rx.try_recv() {
            Ok(()) => true,
            Err(broadcast::error::TryRecvError::Lagged(_)) => true,
            Err(broadcast::error::TryRecvError::Empty)
            | Err(broadcast::error::TryRecvError::Closed) => false,
        }
    }
}
