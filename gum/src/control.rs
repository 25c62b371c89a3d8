use std::sync::{
    atomic::{AtomicBool, AtomicU8, Ordering},
    Arc, Mutex, PoisonError,
};

use async_channel::Sender;
use event_listener::{listener, Event};
use tracing::{debug, info, warn};

use crate::{barrier::DoneBarrier, error::UnitError};

const RUNNING: u8 = 0;
const REQUESTED: u8 = 1;
const CLOSED: u8 = 2;

/// Why a unit is being asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The supervisor is shutting every unit down.
    Requested,
    /// This unit reported its own failure.
    Closed,
}

/// Level-triggered stop state. Once it leaves `RUNNING` it never goes back, so
/// it can be observed any number of times.
#[derive(Debug, Default)]
pub(crate) struct StopSignal {
    state: AtomicU8,
    event: Event,
}

impl StopSignal {
    /// Delivers the single stop request. Returns `false` when a request was
    /// already delivered or the signal is closed.
    pub(crate) fn request(&self) -> bool {
        let delivered = self
            .state
            .compare_exchange(RUNNING, REQUESTED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if delivered {
            self.event.notify(usize::MAX);
        }
        delivered
    }

    /// Idempotent. Returns `false` if it was already closed.
    pub(crate) fn close(&self) -> bool {
        let prev = self.state.swap(CLOSED, Ordering::SeqCst);
        if prev != CLOSED {
            self.event.notify(usize::MAX);
        }
        prev != CLOSED
    }

    pub(crate) fn reason(&self) -> Option<StopReason> {
        match self.state.load(Ordering::SeqCst) {
            REQUESTED => Some(StopReason::Requested),
            CLOSED => Some(StopReason::Closed),
            _ => None,
        }
    }

    pub(crate) async fn wait(&self) -> StopReason {
        loop {
            if let Some(reason) = self.reason() {
                return reason;
            }

            listener!(self.event => lis);
            if let Some(reason) = self.reason() {
                return reason;
            }

            lis.await;
        }
    }
}

/// Supervisor-side state of one registered unit.
#[derive(Debug)]
pub(crate) struct ControlBlock {
    name: String,
    stop: Arc<StopSignal>,
    // Written only by the unit itself, read by the supervisor after a report.
    failed: AtomicBool,
    failure: Mutex<Option<UnitError>>,
    claimed: AtomicBool,
    done: AtomicBool,
    failure_sink: Sender<UnitError>,
    barrier: Arc<DoneBarrier>,
}

impl ControlBlock {
    pub(crate) fn new(
        name: String,
        failure_sink: Sender<UnitError>,
        barrier: Arc<DoneBarrier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            stop: Arc::new(StopSignal::default()),
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
            claimed: AtomicBool::new(false),
            done: AtomicBool::new(false),
            failure_sink,
            barrier,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn request_stop(&self) -> bool {
        self.stop.request()
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    pub(crate) fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::SeqCst)
    }

    pub(crate) fn failure(&self) -> Option<UnitError> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn claim(&self) -> bool {
        !self.claimed.swap(true, Ordering::SeqCst)
    }

    fn arrive(&self) {
        self.done.store(true, Ordering::SeqCst);
        self.barrier.arrive();
    }

    pub(crate) fn report_done(&self) -> bool {
        if !self.claim() {
            return false;
        }

        self.arrive();
        info!("<{}> down", self.name);
        true
    }

    /// The failed flag is set before the report is sent, so the supervisor
    /// always sees it once the report arrives.
    pub(crate) fn report_failure(&self, error: UnitError) -> bool {
        if !self.claim() {
            warn!(
                "<{}> already reported, dropping failure: {}",
                self.name, error
            );
            return false;
        }

        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(error.clone());
        self.failed.store(true, Ordering::SeqCst);
        self.stop.close();

        if self.failure_sink.try_send(error).is_err() {
            debug!("<{}> failure sink closed, supervisor is gone", self.name);
        }

        self.arrive();
        true
    }
}

/// The control surface handed to a unit's [`WorkUnit::run`](crate::WorkUnit::run).
///
/// `done` and `fail` consume the control, so a unit reports at most once.
#[derive(Debug)]
pub struct Control {
    block: Arc<ControlBlock>,
}

impl Control {
    pub(crate) fn new(block: Arc<ControlBlock>) -> Self {
        Self { block }
    }

    /// Display name assigned at registration, e.g. `w1[Poller#0]`.
    pub fn name(&self) -> &str {
        self.block.name()
    }

    /// Resolves once this unit should stop. Can be awaited repeatedly.
    pub async fn stopped(&self) -> StopReason {
        self.block.stop.wait().await
    }

    pub fn is_stopping(&self) -> bool {
        self.block.stop.reason().is_some()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.block.stop.reason()
    }

    /// Cloneable observer of this unit's stop state, for the unit's own sub-tasks.
    pub fn stop_token(&self) -> StopToken {
        StopToken(self.block.stop.clone())
    }

    /// Report that the unit has released its resources and is finished.
    pub fn done(self) {
        self.block.report_done();
    }

    /// Report a fatal failure. Every other unit is asked to stop.
    pub fn fail(self, error: impl Into<UnitError>) {
        self.block.report_failure(error.into());
    }
}

impl Drop for Control {
    fn drop(&mut self) {
        if !self.block.is_claimed() && !std::thread::panicking() {
            warn!(
                "<{}> dropped its control without reporting, shutdown will wait for it",
                self.block.name()
            );
        }
    }
}

/// Read-only view of a unit's stop state.
#[derive(Debug, Clone)]
pub struct StopToken(Arc<StopSignal>);

impl StopToken {
    pub async fn stopped(&self) -> StopReason {
        self.0.wait().await
    }

    pub fn is_stopping(&self) -> bool {
        self.0.reason().is_some()
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.0.reason()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn block() -> (Arc<ControlBlock>, async_channel::Receiver<UnitError>, Arc<DoneBarrier>) {
        let (send, recv) = async_channel::unbounded();
        let barrier = Arc::new(DoneBarrier::new());
        let block = ControlBlock::new("w1[Test#0]".into(), send, barrier.clone());
        (block, recv, barrier)
    }

    #[test]
    fn request_is_delivered_once() {
        let stop = StopSignal::default();
        assert_eq!(stop.reason(), None);
        assert!(stop.request());
        assert!(!stop.request());
        assert_eq!(stop.reason(), Some(StopReason::Requested));
    }

    #[test]
    fn close_wins_over_request() {
        let stop = StopSignal::default();
        assert!(stop.close());
        assert!(!stop.close());
        assert!(!stop.request());
        assert_eq!(stop.reason(), Some(StopReason::Closed));
    }

    #[tokio::test]
    async fn stop_is_observable_repeatedly() {
        let (block, _recv, _) = block();
        let ctl = Control::new(block.clone());
        let token = ctl.stop_token();

        assert!(!token.is_stopping());
        let waiter_token = token.clone();
        let waiter = tokio::spawn(async move { waiter_token.stopped().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!ctl.is_stopping());

        assert!(block.request_stop());
        assert_eq!(waiter.await.unwrap(), StopReason::Requested);
        assert!(token.is_stopping());
        assert_eq!(token.reason(), Some(StopReason::Requested));
        assert_eq!(ctl.stopped().await, StopReason::Requested);
        assert_eq!(ctl.stopped().await, StopReason::Requested);
        ctl.done();
    }

    #[tokio::test]
    async fn done_arrives_once() {
        let (block, recv, barrier) = block();
        let ctl = Control::new(block.clone());
        ctl.done();

        assert!(block.is_done());
        assert!(!block.is_failed());
        assert!(!block.report_done());
        assert!(!block.report_failure(UnitError::msg("late")));
        assert_eq!(barrier.count(), 1);
        assert!(recv.try_recv().is_err());
    }

    #[tokio::test]
    async fn failure_sets_flag_closes_stop_and_reports() {
        let (block, recv, barrier) = block();
        let ctl = Control::new(block.clone());
        let token = ctl.stop_token();
        ctl.fail("boom");

        assert!(block.is_failed());
        assert!(block.is_done());
        assert_eq!(token.reason(), Some(StopReason::Closed));
        assert_eq!(barrier.count(), 1);
        assert_eq!(recv.recv().await.unwrap().to_string(), "boom");
        assert_eq!(block.failure().unwrap().to_string(), "boom");

        // The supervisor must not deliver a second notification.
        assert!(!block.request_stop());
    }

    #[tokio::test]
    async fn failure_after_supervisor_is_gone() {
        let (block, recv, barrier) = block();
        drop(recv);
        Control::new(block.clone()).fail("nobody listens");
        assert!(block.is_failed());
        assert_eq!(barrier.count(), 1);
    }
}
