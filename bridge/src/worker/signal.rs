use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;

/// Cancellation shared between a handle and its worker.
///
/// Requests remember the generation current when they were submitted;
/// [`StopSignal::cancel`] bumps it, which cancels everything submitted
/// before, even requests still sitting in the queue.
#[derive(Debug, Default)]
pub(crate) struct StopSignal {
    generation: AtomicU64,
    notify: Notify,
}

impl StopSignal {
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Resolves once the generation has moved past `generation`.
    pub(crate) async fn cancelled(&self, generation: u64) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.generation() != generation {
                return;
            }
            notified.await;
        }
    }
}
