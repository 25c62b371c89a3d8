//! Run work units on their own tasks and shut them all down together.
//!
//! ```no_run
//! use gum::{Control, Signal, Supervisor, UnitKind, WorkUnit};
//!
//! #[derive(UnitKind)]
//! struct Ticker;
//!
//! impl WorkUnit for Ticker {
//!     async fn run(self, ctl: Control) {
//!         loop {
//!             tokio::select! {
//!                 _ = ctl.stopped() => break,
//!                 _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => {}
//!             }
//!         }
//!         ctl.done();
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut sup = Supervisor::new();
//!     sup.register(Ticker, "clock");
//!     sup.shutdown_on([Signal::Interrupt, Signal::Terminate]);
//!     let quit = sup.quit().unwrap();
//!     tokio::spawn(sup.run());
//!     quit.join().await;
//! }
//! ```

extern crate self as gum;

mod barrier;
pub mod control;
pub mod error;
pub mod names;
pub mod os_signal;
pub mod quit;
pub mod supervisor;
pub mod unit;

pub use control::{Control, StopReason, StopToken};
pub use error::UnitError;
pub use gum_derive::UnitKind;
pub use names::NameGenerator;
pub use os_signal::Signal;
pub use quit::Quit;
pub use supervisor::{
    FailedUnit, ShutdownCause, ShutdownHandle, ShutdownReport, Supervisor, SupervisorConfig,
};
pub use unit::{UnitKind, WorkUnit};
