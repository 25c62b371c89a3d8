//! OS signals the supervisor can treat as shutdown triggers.
//!
//! Delivery is handled by [`tokio::signal`]. On Unix every [`Signal`] variant
//! can be armed; elsewhere only [`Signal::Interrupt`] (Ctrl-C) is available.

use std::fmt::Display;

use async_channel::Sender;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// `SIGINT`, Ctrl-C in a terminal.
    Interrupt,
    /// `SIGTERM`, the default kill signal used by systemd and Kubernetes.
    Terminate,
    /// `SIGQUIT`.
    Quit,
    /// `SIGHUP`.
    Hangup,
    /// `SIGUSR1`.
    User1,
    /// `SIGUSR2`.
    User2,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Quit => "SIGQUIT",
            Signal::Hangup => "SIGHUP",
            Signal::User1 => "SIGUSR1",
            Signal::User2 => "SIGUSR2",
        }
    }

    #[cfg(unix)]
    fn kind(self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;

        match self {
            Signal::Interrupt => SignalKind::interrupt(),
            Signal::Terminate => SignalKind::terminate(),
            Signal::Quit => SignalKind::quit(),
            Signal::Hangup => SignalKind::hangup(),
            Signal::User1 => SignalKind::user_defined1(),
            Signal::User2 => SignalKind::user_defined2(),
        }
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events the supervisor's run loop accepts besides failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intake {
    /// A signal was delivered, by the OS or raised through a handle.
    Signal(Signal),
    /// Unconditional shutdown request.
    StopAll,
}

/// Installs a listener for `sig` and spawns a task forwarding every delivery
/// into `intake`. The task ends once the intake is closed.
#[cfg(unix)]
pub(crate) fn forward(sig: Signal, intake: Sender<Intake>) -> std::io::Result<JoinHandle<()>> {
    let mut stream = tokio::signal::unix::signal(sig.kind())?;

    Ok(tokio::spawn(async move {
        while stream.recv().await.is_some() {
            debug!("Received {}", sig);
            if intake.send(Intake::Signal(sig)).await.is_err() {
                return;
            }
        }
    }))
}

#[cfg(not(unix))]
pub(crate) fn forward(sig: Signal, intake: Sender<Intake>) -> std::io::Result<JoinHandle<()>> {
    if sig != Signal::Interrupt {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("{sig} cannot be observed on this platform"),
        ));
    }

    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            debug!("Received {}", sig);
            if intake.send(Intake::Signal(sig)).await.is_err() {
                return;
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn names() {
        assert_eq!(Signal::Terminate.to_string(), "SIGTERM");
        assert_eq!(Signal::User2.as_str(), "SIGUSR2");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn forwards_os_delivery() {
        let (send, recv) = async_channel::unbounded();
        let task = forward(Signal::User1, send).unwrap();

        let status = std::process::Command::new("sh")
            .arg("-c")
            .arg(format!("kill -USR1 {}", std::process::id()))
            .status()
            .unwrap();
        assert!(status.success());

        let got = tokio::time::timeout(Duration::from_secs(5), recv.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got, Intake::Signal(Signal::User1));
        task.abort();
    }
}
