use std::{sync::Arc, time::Duration};

use interceptor_core::Registry;
use tokio::{sync::oneshot, task::JoinHandle, time::MissedTickBehavior};

/// Background task reaping monitored processes which exited without going
/// through the exit operation.
pub struct ExitWatcher {
    tx_shutdown: oneshot::Sender<()>,
    join_handle: JoinHandle<()>,
}

impl ExitWatcher {
    pub fn start(registry: Arc<Registry>, period: Duration) -> Self {
        let (tx_shutdown, mut rx_shutdown) = oneshot::channel();

        let join_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut rx_shutdown => break,
                    _ = interval.tick() => {
                        for pid in registry.reap_exited() {
                            log::trace!("process {pid} vanished");
                        }
                    }
                }
            }
        });

        Self {
            tx_shutdown,
            join_handle,
        }
    }

    pub async fn stop(self) {
        drop(self.tx_shutdown);
        let _ = self.join_handle.await;
    }
}
