//! Termination signal delivery

use tokio::sync::watch;

/// Shutdown request shared between the signal handler and the supervisor
///
/// Once triggered it stays triggered, so a signal that arrives before the
/// pipeline is even launched is still observed.
#[derive(Debug)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

/// Cloneable trigger for a [`ShutdownSignal`]
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Create a signal that only fires through [`ShutdownHandle::trigger`]
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Create a signal and register it for SIGINT and SIGTERM
    ///
    /// Registration is process-wide and can happen only once.
    pub fn install() -> Result<Self, ctrlc::Error> {
        let signal = Self::new();
        let handle = signal.handle();
        ctrlc::set_handler(move || {
            log::info!("Received termination signal, shutting down gracefully...");
            handle.trigger();
        })?;
        Ok(signal)
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been requested
    pub async fn recv(&mut self) {
        // The sender lives in `self`, so the channel cannot close here
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}
