// ============================================================
// Layer 3 — Telemetry Record
// ============================================================
// One row per completed training epoch. Written by the training
// orchestrator after the epoch's checkpoint is published, read
// by reporting tools. Rows are append-only.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Wall-clock time the epoch finished, ms since the Unix epoch.
    pub timestamp_unix_ms:  u64,
    /// 0-based epoch index.
    pub epoch:              usize,
    /// Optimisation steps taken since training began (cumulative).
    pub step:               u64,
    pub learning_rate:      f64,
    pub loss:               f64,
    pub epoch_wall_time_ms: u64,
    /// True while the epoch has no durable checkpoint.
    pub pending:            bool,
}
