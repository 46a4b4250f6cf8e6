//! Operator abort

use tokio::sync::watch;

/// Operator side of an abort channel
#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

/// Run side of an abort channel
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/signal pair
#[must_use]
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx })
}

impl AbortHandle {
    /// Abort every run holding a signal from this handle
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    /// Another signal for this handle
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl AbortSignal {
    /// A signal that never fires
    #[must_use]
    pub fn never() -> Self {
        let (_, signal) = abort_pair();
        signal
    }

    /// Check if abort was requested
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once abort is requested; pends forever if the handle is gone
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|aborted| *aborted).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn abort_wakes_waiters() {
        let (handle, signal) = abort_pair();
        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.aborted().await }
        });
        assert!(!signal.is_aborted());
        handle.abort();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.is_aborted());
    }

    #[tokio::test]
    async fn never_signal_stays_pending() {
        let signal = AbortSignal::never();
        assert!(tokio::time::timeout(Duration::from_millis(20), signal.aborted())
            .await
            .is_err());
    }
}
