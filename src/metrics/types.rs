use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzer::AnalysisStatus;
use crate::detector::DetectorPhase;

/// Timings and outcome of one completed tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickMetrics {
    pub timestamp: DateTime<Utc>,
    pub capture_ms: u64,
    pub analyze_ms: u64,
    pub total_ms: u64,
    pub status: AnalysisStatus,
    pub is_disconnected: bool,
    pub confidence: f32,
    pub phase: DetectorPhase,
    pub alerted: bool,
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub recent_ticks: Vec<TickMetrics>,
    pub tick_count: u64,
    pub skipped_tick_count: u64,
    pub capture_failure_count: u64,
    pub alert_count: u64,
}
