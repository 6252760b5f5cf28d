// ============================================================
// Layer 6 — Telemetry Log
// ============================================================
// Append-only CSV of per-epoch training telemetry, one file per
// cache entry at logs/telemetry.csv:
//
//   timestamp_unix_ms,epoch,step,learning_rate,loss,epoch_wall_time_ms,pending
//   1718000000123,0,12,1,2.9957,84,false
//   1718000000201,1,24,0.9,2.1034,78,false
//
// Each row is written with a single write_all of the complete
// line, so a concurrent reader can at worst see a truncated final
// row; read() skips any row without its trailing newline.
// Floats use Rust's shortest round-trip formatting.
//
// An epoch may have more than one row: training appends a
// pending=true row before publishing the checkpoint and a
// pending=false row after it. by_epoch() keeps the last row of
// each epoch, which is the view everything above this layer uses.

use anyhow::{Context, Result};
use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use crate::domain::telemetry::TelemetryRecord;

const HEADER: &str = "timestamp_unix_ms,epoch,step,learning_rate,loss,epoch_wall_time_ms,pending";

pub struct TelemetryLog {
    csv_path: PathBuf,
}

impl TelemetryLog {
    /// Does not touch the filesystem; the file appears on first append.
    pub fn new(csv_path: impl Into<PathBuf>) -> Self {
        Self { csv_path: csv_path.into() }
    }

    pub fn append(&self, record: &TelemetryRecord) -> Result<()> {
        let is_new = !self.csv_path.exists();
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open telemetry log '{}'", self.csv_path.display()))?;

        let mut line = String::new();
        if is_new {
            line.push_str(HEADER);
            line.push('\n');
        }
        line.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            record.timestamp_unix_ms,
            record.epoch,
            record.step,
            record.learning_rate,
            record.loss,
            record.epoch_wall_time_ms,
            record.pending,
        ));
        f.write_all(line.as_bytes())
            .with_context(|| format!("Cannot append to '{}'", self.csv_path.display()))?;

        tracing::debug!(
            "Logged epoch {} telemetry: loss={:.4}, lr={:.4}",
            record.epoch,
            record.loss,
            record.learning_rate,
        );
        Ok(())
    }

    /// Every complete record, in file order. A missing file is an empty log.
    pub fn read(&self) -> Result<Vec<TelemetryRecord>> {
        if !self.csv_path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.csv_path)
            .with_context(|| format!("Cannot read telemetry log '{}'", self.csv_path.display()))?;

        let mut complete: Vec<&str> = contents.split('\n').collect();
        // The element after the last '\n' is either "" or a partial row.
        complete.pop();

        complete
            .into_iter()
            .filter(|line| !line.is_empty() && *line != HEADER)
            .map(|line| {
                parse_row(line).with_context(|| {
                    format!("Malformed telemetry row in '{}': {line}", self.csv_path.display())
                })
            })
            .collect()
    }

    /// The last row of every epoch, ordered by epoch.
    pub fn by_epoch(&self) -> Result<Vec<TelemetryRecord>> {
        let mut latest = BTreeMap::new();
        for record in self.read()? {
            latest.insert(record.epoch, record);
        }
        Ok(latest.into_values().collect())
    }
}

fn parse_row(line: &str) -> Result<TelemetryRecord> {
    let fields: Vec<&str> = line.split(',').collect();
    let [timestamp, epoch, step, lr, loss, wall, pending] = fields.as_slice() else {
        anyhow::bail!("expected 7 fields, found {}", fields.len());
    };
    Ok(TelemetryRecord {
        timestamp_unix_ms:  timestamp.parse()?,
        epoch:              epoch.parse()?,
        step:               step.parse()?,
        learning_rate:      lr.parse()?,
        loss:               loss.parse()?,
        epoch_wall_time_ms: wall.parse()?,
        pending:            pending.parse()?,
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: usize) -> TelemetryRecord {
        TelemetryRecord {
            timestamp_unix_ms:  1_718_000_000_000 + epoch as u64,
            epoch,
            step:               12 * (epoch as u64 + 1),
            learning_rate:      0.9f64.powi(epoch as i32),
            loss:               2.5 / (epoch as f64 + 1.0),
            epoch_wall_time_ms: 80,
            pending:            false,
        }
    }

    #[test]
    fn test_missing_log_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = TelemetryLog::new(dir.path().join("telemetry.csv"));
        assert!(log.read().unwrap().is_empty());
        assert!(!log.csv_path.exists());
    }

    #[test]
    fn test_append_then_read_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let log = TelemetryLog::new(dir.path().join("telemetry.csv"));
        log.append(&record(0)).unwrap();
        log.append(&record(1)).unwrap();

        let rows = log.read().unwrap();
        assert_eq!(rows, vec![record(0), record(1)]);

        let text = fs::read_to_string(&log.csv_path).unwrap();
        assert_eq!(text.lines().next(), Some(HEADER));
        assert_eq!(text.matches(HEADER).count(), 1);
    }

    #[test]
    fn test_partial_trailing_row_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let log = TelemetryLog::new(dir.path().join("telemetry.csv"));
        log.append(&record(0)).unwrap();

        let mut f = OpenOptions::new().append(true).open(&log.csv_path).unwrap();
        f.write_all(b"1718000000001,1,2").unwrap();

        assert_eq!(log.read().unwrap(), vec![record(0)]);
    }

    #[test]
    fn test_by_epoch_keeps_last_row_per_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let log = TelemetryLog::new(dir.path().join("telemetry.csv"));
        let pending = TelemetryRecord { pending: true, ..record(0) };
        log.append(&pending).unwrap();
        log.append(&record(0)).unwrap();
        log.append(&TelemetryRecord { pending: true, ..record(1) }).unwrap();

        assert_eq!(log.read().unwrap().len(), 3);
        let rows = log.by_epoch().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].pending);
        assert!(rows[1].pending);
    }

    #[test]
    fn test_malformed_row_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.csv");
        fs::write(&path, format!("{HEADER}\n1,2,3\n")).unwrap();
        assert!(TelemetryLog::new(path).read().is_err());
    }
}
