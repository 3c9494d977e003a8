use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use disconnect_monitor::alerts::{
    AlertDispatcher, AlertEvent, Destination, DestinationKind, NotificationPayload,
    NotificationTransport,
};
use disconnect_monitor::connectivity::ConnectivityMonitor;
use disconnect_monitor::error::DeliveryError;
use disconnect_monitor::monitor::replay_watcher;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Remembers what was delivered and when.
#[derive(Default)]
struct Recorder {
    delivered: Mutex<Vec<(Instant, NotificationPayload)>>,
}

impl Recorder {
    fn delivered(&self) -> Vec<(Instant, NotificationPayload)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationTransport for Recorder {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), DeliveryError> {
        self.delivered
            .lock()
            .unwrap()
            .push((Instant::now(), payload.clone()));
        Ok(())
    }
}

fn alert(duration_seconds: u64) -> AlertEvent {
    AlertEvent {
        reason: "disconnect keyword \"reconnecting\" found".into(),
        duration_seconds,
        timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap()
            + chrono::Duration::seconds(duration_seconds as i64),
    }
}

fn destinations() -> Vec<Destination> {
    vec![
        Destination::Trigger {
            url: "https://notify.example/push".into(),
            id: "living-room".into(),
        },
        Destination::Webhook {
            url: "https://hooks.example/dc".into(),
        },
    ]
}

#[tokio::test(start_paused = true)]
async fn offline_alerts_replay_in_order_after_restore() {
    let recorder = Arc::new(Recorder::default());
    let dispatcher = Arc::new(AlertDispatcher::new(recorder.clone()));
    let connectivity = ConnectivityMonitor::new(true);
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(replay_watcher(
        Arc::clone(&dispatcher),
        connectivity.subscribe(),
        cancel.clone(),
    ));

    connectivity.set_online(false);
    tokio::task::yield_now().await;
    for secs in [15, 75, 135] {
        let outcome = dispatcher
            .dispatch(&alert(secs), &destinations(), connectivity.is_online())
            .await;
        assert_eq!(outcome.queued, 2);
    }
    assert_eq!(dispatcher.queue().len().await, 6);
    assert!(recorder.delivered().is_empty());

    connectivity.set_online(true);
    for _ in 0..20 {
        if recorder.delivered().len() == 6 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    let delivered = recorder.delivered();
    assert_eq!(delivered.len(), 6);
    assert!(dispatcher.queue().is_empty().await);

    let kinds: Vec<DestinationKind> = delivered.iter().map(|(_, p)| p.kind).collect();
    assert_eq!(
        kinds,
        vec![
            DestinationKind::Trigger,
            DestinationKind::Webhook,
            DestinationKind::Trigger,
            DestinationKind::Webhook,
            DestinationKind::Trigger,
            DestinationKind::Webhook,
        ]
    );
    let durations: Vec<u64> = delivered
        .iter()
        .filter_map(|(_, p)| p.body.as_deref())
        .map(|body| serde_json::from_str::<serde_json::Value>(body).unwrap()["duration"].as_u64().unwrap())
        .collect();
    assert_eq!(durations, vec![15, 75, 135]);

    for pair in delivered.windows(2) {
        assert!(pair[1].0 - pair[0].0 >= Duration::from_millis(500));
    }

    cancel.cancel();
    watcher.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn flapping_connectivity_never_duplicates_deliveries() {
    let recorder = Arc::new(Recorder::default());
    let dispatcher = Arc::new(AlertDispatcher::new(recorder.clone()));
    let connectivity = ConnectivityMonitor::new(false);
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(replay_watcher(
        Arc::clone(&dispatcher),
        connectivity.subscribe(),
        cancel.clone(),
    ));

    for secs in [15, 75] {
        dispatcher.dispatch(&alert(secs), &destinations(), false).await;
    }

    for _ in 0..3 {
        connectivity.set_online(true);
        tokio::task::yield_now().await;
        connectivity.set_online(false);
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(recorder.delivered().len(), 4);
    assert!(dispatcher.queue().is_empty().await);

    cancel.cancel();
    watcher.await.unwrap();
}

#[tokio::test]
async fn online_dispatch_bypasses_the_queue() {
    let recorder = Arc::new(Recorder::default());
    let dispatcher = AlertDispatcher::new(recorder.clone());

    let outcome = dispatcher.dispatch(&alert(15), &destinations(), true).await;
    assert_eq!(outcome.sent, 2);
    assert!(dispatcher.queue().is_empty().await);

    for _ in 0..100 {
        if recorder.delivered().len() == 2 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(recorder.delivered().len(), 2);
}
