use std::sync::atomic::{AtomicUsize, Ordering};

use event_listener::{listener, Event};

/// Counting completion barrier: every unit bumps it once when it reports, and
/// the supervisor waits until the count reaches the number of units.
#[derive(Debug, Default)]
pub(crate) struct DoneBarrier {
    count: AtomicUsize,
    event: Event,
}

impl DoneBarrier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn arrive(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.event.notify(usize::MAX);
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait(&self, target: usize) {
        loop {
            if self.count() >= target {
                return;
            }

            listener!(self.event => lis);
            if self.count() >= target {
                return;
            }

            lis.await;
        }
    }
}
