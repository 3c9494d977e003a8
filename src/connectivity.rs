use std::net::SocketAddr;
use std::time::Duration;

use log::{info, warn};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_PROBE_ADDR: &str = "1.1.1.1:53";
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 10;
const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Whether outbound notifications can currently be delivered.
///
/// Cloning shares the same state. Subscribers see every offline/online edge.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = watch::channel(initially_online);
        Self { tx }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Record the latest observation. Returns true on a state change.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            if online {
                info!("network connectivity restored");
            } else {
                warn!("network connectivity lost; alerts will be queued");
            }
        }
        changed
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

pub async fn probe_once(addr: SocketAddr) -> bool {
    matches!(
        tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

/// Periodically probe `addr` and publish the result until cancelled.
pub async fn probe_loop(
    monitor: ConnectivityMonitor,
    addr: SocketAddr,
    every: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let online = tokio::select! {
                    online = probe_once(addr) => online,
                    _ = cancel_token.cancelled() => break,
                };
                monitor.set_online(online);
            }
            _ = cancel_token.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn only_edges_count_as_changes() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();
        assert!(!monitor.set_online(true));
        assert!(!rx.has_changed().unwrap());

        assert!(monitor.set_online(false));
        assert!(!monitor.is_online());
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());

        assert!(monitor.set_online(true));
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn probe_loop_tracks_reachability() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(probe_loop(
            monitor.clone(),
            addr,
            Duration::from_millis(20),
            cancel.clone(),
        ));

        rx.wait_for(|online| !*online).await.unwrap();
        assert!(!monitor.is_online());

        let _listener = TcpListener::bind(addr).await.unwrap();
        rx.wait_for(|online| *online).await.unwrap();

        cancel.cancel();
        handle.await.unwrap();
    }
}
