use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};

use event_listener::{listener, Event};

#[derive(Debug)]
struct QuitState<T> {
    announced: AtomicBool,
    value: Mutex<Option<T>>,
    event: Event,
}

impl<T> QuitState<T> {
    fn take(&self) -> Option<T> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Announcing half of the quit notification. `announce` consumes it, so the
/// value is published at most once.
#[derive(Debug)]
pub(crate) struct Announcer<T>(Arc<QuitState<T>>);

impl<T> Announcer<T> {
    pub(crate) fn announce(self, val: T) {
        self.0
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(val);
        self.0.announced.store(true, Ordering::SeqCst);
        self.0.event.notify(usize::MAX);
    }
}

/// Completion source that resolves once the supervisor has terminated.
#[derive(Debug)]
pub struct Quit<T>(Arc<QuitState<T>>);

impl<T> Quit<T> {
    /// Whether termination has been announced. Stays `true` after `join`.
    pub fn is_announced(&self) -> bool {
        self.0.announced.load(Ordering::SeqCst)
    }

    pub async fn join(self) -> T {
        loop {
            if let Some(val) = self.0.take() {
                return val;
            }

            listener!(self.0.event => lis);
            if let Some(val) = self.0.take() {
                return val;
            }

            lis.await;
        }
    }
}

pub(crate) fn channel<T>() -> (Announcer<T>, Quit<T>) {
    let state = Arc::new(QuitState {
        announced: AtomicBool::new(false),
        value: Mutex::new(None),
        event: Event::new(),
    });

    (Announcer(state.clone()), Quit(state))
}
