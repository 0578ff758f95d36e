//! Generation-based cooperative cancellation.
//!
//! Every new request advances the counter. Work started under an older
//! generation holds a [`CancelGuard`] that turns stale the moment the counter
//! moves, and checks it at each suspension point.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::Cancelled;

/// Monotonic request counter shared by one orchestrator.
#[derive(Debug, Clone)]
pub struct GenerationCounter {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for GenerationCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl GenerationCounter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Invalidate every outstanding guard and return one for the new generation.
    pub fn advance(&self) -> CancelGuard {
        self.tx.send_modify(|generation| *generation += 1);
        self.guard()
    }

    /// Guard bound to the current generation.
    pub fn guard(&self) -> CancelGuard {
        let rx = self.tx.subscribe();
        let captured = *rx.borrow();
        CancelGuard { captured, rx }
    }
}

/// Captured generation plus a receiver to observe newer ones.
#[derive(Debug, Clone)]
pub struct CancelGuard {
    captured: u64,
    rx: watch::Receiver<u64>,
}

impl CancelGuard {
    pub fn generation(&self) -> u64 {
        self.captured
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() != self.captured
    }

    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the guard is stale. A dropped counter counts as stale.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() != self.captured {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `duration` unless the guard goes stale first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Cancelled> {
        self.run(tokio::time::sleep(duration)).await
    }

    /// Drive `fut` to completion unless the guard goes stale first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Cancelled),
            output = fut => Ok(output),
        }
    }
}
