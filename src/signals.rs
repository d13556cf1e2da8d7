//! Signal handling: shutdown signals for the caller, stack dumps on SIGUSR1.
//!
//! SIGTERM and SIGQUIT are relayed on a channel with room for one pending
//! signal; further signals are dropped until the caller reads. SIGUSR1 writes
//! a stack dump and is never surfaced to the caller.

use crate::stacks::{CaptureDestination, StackDumper};
use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Subscribe to SIGTERM and SIGQUIT.
///
/// Must be called from within a tokio runtime. Call once per process; the
/// relay task lives until the receiver is dropped.
pub fn exit_signals() -> std::io::Result<mpsc::Receiver<Signal>> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = terminate.recv() => Signal::SIGTERM,
                Some(()) = quit.recv() => Signal::SIGQUIT,
                else => break,
            };
            match tx.try_send(received) {
                Ok(()) => tracing::debug!(signal = %received, "relayed exit signal"),
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(signal = %received, "exit signal dropped, one already pending")
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
    });

    Ok(rx)
}

/// Dump stacks to `destination` on every SIGUSR1, forever.
///
/// Dump failures are logged and the loop keeps listening.
pub async fn run_dump_loop(
    dumper: StackDumper,
    destination: CaptureDestination,
) -> std::io::Result<()> {
    let trigger = signal(SignalKind::user_defined1())?;
    dump_loop(trigger, dumper, destination, CancellationToken::new()).await;
    Ok(())
}

async fn dump_loop(
    mut trigger: tokio::signal::unix::Signal,
    dumper: StackDumper,
    destination: CaptureDestination,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = trigger.recv() => {
                if received.is_none() {
                    break;
                }
                match dumper.dump(&destination) {
                    Ok(location) => tracing::info!(%location, "dumped thread stacks"),
                    Err(e) => tracing::error!(error = %e, "failed to dump thread stacks"),
                }
            }
        }
    }
    tracing::debug!("stack dump listener stopped");
}

/// The SIGUSR1 listener running as an owned background task.
#[derive(Debug)]
pub struct DumpListener {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl DumpListener {
    /// Register for SIGUSR1 and start listening.
    ///
    /// The handler is installed before this returns, so a SIGUSR1 raised
    /// afterwards is never lost to the default disposition.
    pub fn spawn(dumper: StackDumper, destination: CaptureDestination) -> std::io::Result<Self> {
        let trigger = signal(SignalKind::user_defined1())?;
        let cancel = CancellationToken::new();
        tracing::info!(?destination, "listening for SIGUSR1 stack dump requests");
        let handle = tokio::spawn(dump_loop(trigger, dumper, destination, cancel.clone()));
        Ok(Self { cancel, handle })
    }

    /// Token that stops the listener when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop listening and wait for the task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "stack dump listener ended abnormally");
        }
    }
}
