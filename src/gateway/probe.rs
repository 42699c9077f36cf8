use super::Connectivity;
use crate::remote::RemoteApi;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, info};

/// Background task mirroring the remote health check into a `Connectivity` signal.
pub struct ConnectivityProbe {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl ConnectivityProbe {
    /// Signals the probe to stop and waits for it to finish.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            let _ = join_handle.await;
        }
    }
}

impl Drop for ConnectivityProbe {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Checks `remote.health()` right away and then every `every`.
///
/// A check that fails or exceeds `call_timeout` marks the signal offline.
pub fn spawn_connectivity_probe(
    remote: Arc<dyn RemoteApi>,
    connectivity: Connectivity,
    every: Duration,
    call_timeout: Duration,
) -> ConnectivityProbe {
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let every = every.max(Duration::from_millis(10));

    let join_handle = tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    break;
                }
                _ = ticker.tick() => {
                    let healthy = matches!(timeout(call_timeout, remote.health()).await, Ok(Ok(())));
                    if connectivity.set_online(healthy) {
                        info!(online = healthy, "connectivity changed");
                    } else {
                        debug!(online = healthy, "connectivity probe");
                    }
                }
            }
        }
    });

    ConnectivityProbe {
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}
