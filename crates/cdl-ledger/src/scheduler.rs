use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::ledger::Ledger;

/// Periodically seals the pending queue.
///
/// Each tick runs one pass on the blocking pool. A pass still running when
/// the next tick fires is skipped rather than queued.
pub struct SealScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SealScheduler {
    /// Start sealing every `period`. Must be called within a tokio runtime.
    pub fn spawn(ledger: Arc<Ledger>, period: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;
            info!(period_ms = period.as_millis() as u64, "seal scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => run_pass(&ledger).await,
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("seal scheduler stopped");
        });
        Self { shutdown, handle }
    }

    /// Signal the loop to exit and wait for it.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            warn!(error = %err, "seal scheduler task ended abnormally");
        }
    }
}

async fn run_pass(ledger: &Arc<Ledger>) {
    match ledger.seal_in_background().await {
        Ok(Some(block)) => debug!(index = block.index, "scheduled seal completed"),
        Ok(None) => {}
        Err(LedgerError::SealingInProgress) => debug!("sealing pass already running; skipping tick"),
        Err(err @ LedgerError::MiningExhausted { .. }) => {
            warn!(error = %err, "scheduled seal gave up; documents stay pending")
        }
        Err(err) => warn!(error = %err, "scheduled seal failed"),
    }
}
