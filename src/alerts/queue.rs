use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::transport::NotificationPayload;

/// A notification deferred because the host was offline when it was due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAlert {
    pub id: Uuid,
    pub payload: NotificationPayload,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedAlert {
    pub fn new(payload: NotificationPayload, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            enqueued_at,
        }
    }
}

/// FIFO of deferred notifications. Lock hold times are a push or a swap,
/// so the tick loop never waits on a replay in progress.
#[derive(Debug, Default)]
pub struct RetryQueue {
    items: Mutex<VecDeque<QueuedAlert>>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, alert: QueuedAlert) {
        self.items.lock().await.push_back(alert);
    }

    /// Remove and return everything queued so far, oldest first.
    pub async fn take_all(&self) -> Vec<QueuedAlert> {
        let mut items = self.items.lock().await;
        std::mem::take(&mut *items).into()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<QueuedAlert> {
        self.items.lock().await.iter().cloned().collect()
    }
}
