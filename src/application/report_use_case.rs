// ============================================================
// Layer 2 — ReportUseCase
// ============================================================
// Read-only view of cache entries for dashboards and the
// `report` command. Never creates, trains or repairs anything.
//
// Telemetry rows whose epoch has no checkpoint on disk (e.g. a
// checkpoint removed by hand) are reported as pending.
//
// all() reports every entry it can read. An entry that fails its
// layout check is listed as corrupt next to the healthy ones; any
// other failure aborts the report.

use anyhow::Result;
use std::path::PathBuf;

use crate::domain::{config::ModelConfig, error::CacheError, telemetry::TelemetryRecord};
use crate::infra::{
    cache::{ArtifactCache, CacheHandle},
    identity::Identity,
};

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionSummary {
    pub request_hash: String,
    /// Checkpoint the outputs were generated from.
    pub epoch:        usize,
    pub num_outputs:  usize,
}

#[derive(Debug, Clone)]
pub struct EntryReport {
    pub identity:    Identity,
    pub config:      ModelConfig,
    pub checkpoints: Vec<usize>,
    pub is_trained:  bool,
    pub telemetry:   Vec<TelemetryRecord>,
    pub partitions:  Vec<PartitionSummary>,
}

impl EntryReport {
    pub fn latest_checkpoint(&self) -> Option<usize> {
        self.checkpoints.last().copied()
    }

    pub fn num_outputs(&self) -> usize {
        self.partitions.iter().map(|p| p.num_outputs).sum()
    }
}

/// An entry that exists on disk but fails its layout check.
#[derive(Debug, Clone, PartialEq)]
pub struct CorruptEntry {
    pub identity: Identity,
    pub reason:   String,
}

#[derive(Debug, Clone, Default)]
pub struct CacheReport {
    pub entries: Vec<EntryReport>,
    pub corrupt: Vec<CorruptEntry>,
}

impl CacheReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.corrupt.is_empty()
    }
}

pub struct ReportUseCase {
    cache: ArtifactCache,
}

impl ReportUseCase {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache: ArtifactCache::new(cache_root),
        }
    }

    pub fn entry(&self, id: &Identity) -> Result<EntryReport> {
        let handle = self.cache.open_existing(id)?;
        build_report(&handle)
    }

    /// Reports for every entry under the cache root.
    pub fn all(&self) -> Result<CacheReport> {
        let mut report = CacheReport::default();
        for id in self.cache.list_entries()? {
            match self.entry(&id) {
                Ok(entry) => report.entries.push(entry),
                Err(e) => match e.downcast_ref::<CacheError>() {
                    Some(CacheError::Corrupt { reason, .. }) => {
                        tracing::warn!("Skipping corrupt cache entry {}: {}", id, reason);
                        report.corrupt.push(CorruptEntry { identity: id, reason: reason.clone() });
                    }
                    _ => return Err(e),
                },
            }
        }
        Ok(report)
    }
}

fn build_report(handle: &CacheHandle) -> Result<EntryReport> {
    let checkpoints = handle.checkpoints().list()?;

    let telemetry = handle
        .training_telemetry()?
        .into_iter()
        .map(|mut record| {
            record.pending = record.pending || !checkpoints.contains(&record.epoch);
            record
        })
        .collect();

    let partitions = handle
        .output_partitions()?
        .into_iter()
        .map(|(hash, epoch)| {
            let num_outputs = handle.output_partition(&hash, epoch).count()?;
            Ok(PartitionSummary {
                request_hash: hash,
                epoch,
                num_outputs,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(EntryReport {
        identity: handle.identity().clone(),
        config: handle.config().clone(),
        is_trained: handle.is_trained()?,
        checkpoints,
        telemetry,
        partitions,
    })
}
