mod types;

pub use types::{MetricsSnapshot, SystemMetrics, TickMetrics};

use std::collections::VecDeque;
use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

const MAX_RECENT_TICKS: usize = 20;

/// Shared, cheaply clonable tick statistics for one monitor process.
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    recent_ticks: VecDeque<TickMetrics>,
    tick_count: u64,
    skipped_tick_count: u64,
    capture_failure_count: u64,
    alert_count: u64,
    system: System,
    pid: Pid,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // CPU usage is a delta between refreshes; take the baseline now.
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_ticks: VecDeque::with_capacity(MAX_RECENT_TICKS),
                tick_count: 0,
                skipped_tick_count: 0,
                capture_failure_count: 0,
                alert_count: 0,
                system,
                pid,
            })),
        }
    }

    /// Current process CPU percentage and resident memory in MiB.
    pub async fn sample_system_metrics(&self) -> (f32, f64) {
        let mut state = self.inner.lock().await;
        let system = state.sample();
        (system.cpu_percent, system.memory_mb)
    }

    pub async fn record_tick(&self, metrics: TickMetrics) {
        let mut state = self.inner.lock().await;
        state.tick_count += 1;
        if metrics.alerted {
            state.alert_count += 1;
        }
        state.recent_ticks.push_back(metrics);
        while state.recent_ticks.len() > MAX_RECENT_TICKS {
            state.recent_ticks.pop_front();
        }
    }

    pub async fn record_skipped_tick(&self) {
        self.inner.lock().await.skipped_tick_count += 1;
    }

    pub async fn record_capture_failure(&self) {
        self.inner.lock().await.capture_failure_count += 1;
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        let system = state.sample();
        MetricsSnapshot {
            system,
            recent_ticks: state.recent_ticks.iter().cloned().collect(),
            tick_count: state.tick_count,
            skipped_tick_count: state.skipped_tick_count,
            capture_failure_count: state.capture_failure_count,
            alert_count: state.alert_count,
        }
    }

    pub async fn reset(&self) {
        let mut state = self.inner.lock().await;
        let pid = state.pid;
        state.recent_ticks.clear();
        state.tick_count = 0;
        state.skipped_tick_count = 0;
        state.capture_failure_count = 0;
        state.alert_count = 0;
        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
    }
}

impl MetricsState {
    fn sample(&mut self) -> SystemMetrics {
        let pid = self.pid;
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        match self.system.process(pid) {
            Some(process) => SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            },
            None => SystemMetrics::default(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
