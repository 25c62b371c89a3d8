use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    pin::pin,
    sync::Arc,
    time::Duration,
};

use async_channel::{unbounded, Receiver, RecvError, Sender};
use derivative::Derivative;
use futures::{future::BoxFuture, FutureExt};
use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    barrier::DoneBarrier,
    control::{Control, ControlBlock},
    error::UnitError,
    names::NameGenerator,
    os_signal::{self, Intake, Signal},
    quit::{self, Announcer, Quit},
    unit::WorkUnit,
};

type Launcher = Box<dyn FnOnce(Control) -> BoxFuture<'static, ()> + Send>;

#[derive(Derivative)]
#[derivative(Debug)]
struct Entry {
    block: Arc<ControlBlock>,
    #[derivative(Debug = "ignore")]
    launch: Launcher,
}

#[derive(Debug, Clone, Default)]
pub struct SupervisorConfig {
    /// Upper bound on waiting for units once shutdown has started. With the
    /// default `None` the supervisor waits for every unit indefinitely.
    pub shutdown_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// An armed signal was delivered.
    Signal(Signal),
    /// [`ShutdownHandle::stop_all`] was called.
    Requested,
    /// At least one unit reported a failure.
    Failure,
}

#[derive(Debug, Clone)]
pub struct FailedUnit {
    pub name: String,
    pub error: UnitError,
}

/// What the supervisor observed on its way to termination.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub cause: ShutdownCause,
    /// Display names of every registered unit, in registration order.
    pub units: Vec<String>,
    /// Units whose failed flag was set when the supervisor terminated.
    pub failed: Vec<FailedUnit>,
    /// Units that had not reported when `shutdown_timeout` expired.
    pub stuck: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.stuck.is_empty()
    }
}

/// Cloneable handle for triggering shutdown from outside the supervisor.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    intake: Sender<Intake>,
}

impl ShutdownHandle {
    /// Stop every unit regardless of the armed signals. Returns `false` if the
    /// supervisor is already gone.
    pub fn stop_all(&self) -> bool {
        self.intake.try_send(Intake::StopAll).is_ok()
    }

    /// Feed `sig` to the supervisor as if the OS had delivered it. Signals that
    /// were not armed with [`Supervisor::shutdown_on`] are ignored by the loop.
    pub fn raise(&self, sig: Signal) -> bool {
        self.intake.try_send(Intake::Signal(sig)).is_ok()
    }
}

/// Runs registered units on their own tasks and shuts them all down together,
/// either when an armed signal arrives or when any unit fails.
#[derive(Debug)]
pub struct Supervisor {
    units: Vec<Entry>,
    shutdown_sigs: Vec<Signal>,
    // Armed signals whose OS listener still has to be installed by `run`.
    unlistened: Vec<Signal>,
    forwarders: Vec<JoinHandle<()>>,
    intake: (Sender<Intake>, Receiver<Intake>),
    failures: (Sender<UnitError>, Receiver<UnitError>),
    barrier: Arc<DoneBarrier>,
    names: Arc<NameGenerator>,
    announcer: Announcer<ShutdownReport>,
    quit: Option<Quit<ShutdownReport>>,
    config: SupervisorConfig,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self::with_config(SupervisorConfig::default())
    }

    pub fn with_config(config: SupervisorConfig) -> Self {
        Self::with_names(config, Arc::new(NameGenerator::new()))
    }

    /// Create a supervisor that draws display names from a shared generator.
    pub fn with_names(config: SupervisorConfig, names: Arc<NameGenerator>) -> Self {
        let (announcer, quit) = quit::channel();
        Self {
            units: Vec::new(),
            shutdown_sigs: Vec::new(),
            unlistened: Vec::new(),
            forwarders: Vec::new(),
            intake: unbounded(),
            failures: unbounded(),
            barrier: Arc::new(DoneBarrier::new()),
            names,
            announcer,
            quit: Some(quit),
            config,
        }
    }

    /// Register `unit` under `label`. Returns its display name, `label[Kind#n]`.
    pub fn register<U>(&mut self, unit: U, label: &str) -> String
    where
        U: WorkUnit + Send + 'static,
    {
        self.register_fn(label, U::KIND, move |ctl| unit.run(ctl))
    }

    /// Register a closure as a unit of the given `kind`.
    pub fn register_fn<F, Fut>(&mut self, label: &str, kind: &str, f: F) -> String
    where
        F: FnOnce(Control) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = self.names.display_name(label, kind);
        info!("Adding unit {}", name);

        let block = ControlBlock::new(name.clone(), self.failures.0.clone(), self.barrier.clone());
        self.units.push(Entry {
            block,
            launch: Box::new(move |ctl| f(ctl).boxed()),
        });
        name
    }

    /// Treat `sigs` as shutdown triggers.
    ///
    /// Inside a tokio runtime the OS listeners are installed right away, so a
    /// signal delivered before [`run`](Self::run) is buffered and still shuts
    /// the units down. Outside a runtime they are installed when `run` starts.
    pub fn shutdown_on(&mut self, sigs: impl IntoIterator<Item = Signal>) {
        for sig in sigs {
            if self.shutdown_sigs.contains(&sig) {
                continue;
            }

            info!("Registering shutdown signal: {}", sig);
            self.shutdown_sigs.push(sig);

            if Handle::try_current().is_err() {
                debug!("No runtime yet, {} is armed when the supervisor runs", sig);
                self.unlistened.push(sig);
                continue;
            }

            match os_signal::forward(sig, self.intake.0.clone()) {
                Ok(task) => self.forwarders.push(task),
                Err(err) => warn!("Cannot listen for {}: {}", sig, err),
            }
        }
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            intake: self.intake.0.clone(),
        }
    }

    /// Take the quit notification. There is only one; later calls return `None`.
    pub fn quit(&mut self) -> Option<Quit<ShutdownReport>> {
        self.quit.take()
    }

    /// Display names of the registered units, in registration order.
    pub fn units(&self) -> impl Iterator<Item = &str> {
        self.units.iter().map(|x| x.block.name())
    }

    /// Start every unit and drive them until all have shut down.
    ///
    /// Resolves after the quit notification has been announced. Without a
    /// `shutdown_timeout`, a unit that never reports keeps this from resolving.
    #[tracing::instrument(name = "supervisor", skip(self))]
    pub async fn run(self) -> ShutdownReport {
        info!("Starting supervisor ...");
        let Self {
            units,
            shutdown_sigs,
            unlistened,
            mut forwarders,
            intake: (intake_tx, intake_rx),
            failures: (_failure_tx, failure_rx),
            barrier,
            announcer,
            config,
            ..
        } = self;

        for sig in &unlistened {
            match os_signal::forward(*sig, intake_tx.clone()) {
                Ok(task) => forwarders.push(task),
                Err(err) => warn!("Cannot listen for {}: {}", sig, err),
            }
        }

        let mut blocks = Vec::with_capacity(units.len());
        for Entry { block, launch } in units {
            info!("Starting <{}>", block.name());
            let work = launch(Control::new(block.clone()));
            tokio::spawn(supervise_unit(block.clone(), work));
            blocks.push(block);
        }

        // The senders above live until the end of this function, so neither
        // channel can report closed while we wait on them.
        let cause = loop {
            match next_wake(&intake_rx, &failure_rx).await {
                Wake::Intake(Ok(Intake::Signal(sig))) => {
                    if !shutdown_sigs.contains(&sig) {
                        debug!("Ignoring {}, not a shutdown signal", sig);
                        continue;
                    }

                    info!("Shutdown event received: {}", sig);
                    break ShutdownCause::Signal(sig);
                }
                Wake::Intake(Ok(Intake::StopAll)) => {
                    info!("Stop requested");
                    break ShutdownCause::Requested;
                }
                Wake::Failure(Ok(err)) => {
                    info!("Failure reported: {}", err);
                    break ShutdownCause::Failure;
                }
                Wake::Intake(Err(_)) | Wake::Failure(Err(_)) => {
                    break ShutdownCause::Requested;
                }
            }
        };

        if cause == ShutdownCause::Failure {
            for block in blocks.iter().filter(|x| x.is_failed()) {
                if let Some(err) = block.failure() {
                    error!("Failure in <{}>: {}", block.name(), err);
                }
            }
        }

        for block in &blocks {
            // A failed unit has already closed its own stop signal.
            if cause == ShutdownCause::Failure && block.is_failed() {
                continue;
            }

            info!("Shutting down <{}>", block.name());
            if !block.request_stop() {
                debug!("<{}> is already stopping", block.name());
            }
        }

        let all = blocks.len();
        match config.shutdown_timeout {
            None => barrier.wait(all).await,
            Some(grace) => {
                if tokio::time::timeout(grace, barrier.wait(all)).await.is_err() {
                    warn!(
                        "Shutdown timeout {:?} exceeded, {} of {} units reported",
                        grace,
                        barrier.count(),
                        all
                    );
                }
            }
        }

        for task in forwarders {
            task.abort();
        }

        let report = ShutdownReport {
            cause,
            units: blocks.iter().map(|x| x.name().to_owned()).collect(),
            failed: blocks
                .iter()
                .filter_map(|x| {
                    x.failure().map(|error| FailedUnit {
                        name: x.name().to_owned(),
                        error,
                    })
                })
                .collect(),
            stuck: blocks
                .iter()
                .filter(|x| !x.is_done())
                .map(|x| x.name().to_owned())
                .collect(),
        };

        if report.stuck.is_empty() {
            info!("All units have shut down, shutting down supervisor ...");
        } else {
            error!("Giving up on stuck units: {:?}", report.stuck);
        }

        announcer.announce(report.clone());
        report
    }
}

#[derive(Debug)]
enum Wake {
    Intake(Result<Intake, RecvError>),
    Failure(Result<UnitError, RecvError>),
}

/// Waits for the next trigger. When both sources are ready, `select!` picks
/// one at random, so neither is preferred.
async fn next_wake(intake: &Receiver<Intake>, failures: &Receiver<UnitError>) -> Wake {
    let mut next_intake = pin!(intake.recv().fuse());
    let mut next_failure = pin!(failures.recv().fuse());
    futures::select! {
        msg = next_intake => Wake::Intake(msg),
        report = next_failure => Wake::Failure(report),
    }
}

/// Runs a unit's future, turning a panic into a failure report.
async fn supervise_unit(block: Arc<ControlBlock>, work: BoxFuture<'static, ()>) {
    let Err(payload) = AssertUnwindSafe(work).catch_unwind().await else {
        return;
    };

    let msg = panic_message(payload.as_ref());
    if block.report_failure(UnitError::Panicked(msg.clone())) {
        error!("<{}> panicked: {}", block.name(), msg);
    } else {
        warn!("<{}> panicked after reporting: {}", block.name(), msg);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
