//! Background task that flushes the sync queue
//!
//! Flushes on a fixed interval and whenever connectivity goes from offline
//! to online. Flushes are best-effort and never block foreground calls.

use crate::queue::SyncQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle to a running background flusher
#[derive(Debug)]
pub struct FlusherHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl FlusherHandle {
    /// Stops the flusher and waits for it to finish its current flush
    pub async fn stop(self) {
        // The task may already have exited
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            log::warn!("Sync queue flusher ended abnormally: {}", e);
        }
    }

    /// Returns true if the task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns the flusher on the current Tokio runtime
///
/// Dropping the returned handle also stops the task.
pub fn spawn_flusher(queue: Arc<SyncQueue>, interval: Duration) -> FlusherHandle {
    let (stop, mut stop_rx) = oneshot::channel();
    let mut online_rx = queue.connectivity().subscribe();

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        log::debug!("Sync queue flusher started (every {:?})", interval);

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    queue.flush(None).await;
                }
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *online_rx.borrow_and_update();
                    if online {
                        log::info!("Back online, flushing {} queued mutations", queue.len());
                        queue.flush(None).await;
                    }
                }
            }
        }

        log::debug!("Sync queue flusher stopped");
    });

    FlusherHandle { stop, task }
}
