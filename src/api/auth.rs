use super::DmaClient;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

/// Background task that keeps a client's bearer token fresh
///
/// The owner controls its lifetime: `stop()` shuts it down and waits for it,
/// dropping the handle signals shutdown without waiting.
pub struct TokenRefresher {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl TokenRefresher {
    /// Spawn the refresh loop; the first refresh happens one `every` from now
    pub fn start(client: DmaClient, every: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        if let Err(e) = client.authenticate().await {
                            tracing::warn!("Failed to refresh DMA token: {}", e);
                        }
                    }
                }
            }

            tracing::debug!("Token refresher stopped");
        });

        Self {
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |t| !t.is_finished())
    }

    /// Signal shutdown and wait for the loop to exit
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!("Token refresher task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for TokenRefresher {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
