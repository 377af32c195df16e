//! Level-triggered cancellation signal

use tokio::sync::watch;

/// Owning side of a cancellation signal
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal; every current and future subscriber observes it
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a cancellation signal.
///
/// Dropping the owning [`Shutdown`] counts as cancellation, so tasks never
/// outlive the thing that spawned them.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// True once fired or once the owner is gone
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once the signal fires (immediately if it already has)
    pub async fn recv(&mut self) {
        let _ = self.rx.wait_for(|&fired| fired).await;
    }
}
