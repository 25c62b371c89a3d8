use std::future::Future;

use crate::control::Control;

/// Explicit type tag used when naming a registered unit.
///
/// Usually derived: `#[derive(UnitKind)]` uses the type's identifier, and
/// `#[unit(kind = "...")]` overrides it.
pub trait UnitKind {
    const KIND: &'static str;
}

/// A unit of work run by the [`Supervisor`](crate::Supervisor) on its own task.
///
/// `run` should keep working until [`Control::stopped`] resolves, then release
/// its resources and call [`Control::done`]. On an unrecoverable error it calls
/// [`Control::fail`] instead, which stops every other unit.
pub trait WorkUnit: UnitKind {
    fn run(self, ctl: Control) -> impl Future<Output = ()> + Send;
}
