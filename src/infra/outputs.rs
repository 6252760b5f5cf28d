// ============================================================
// Layer 6 — Output Partition
// ============================================================
// Generated samples for one request hash and checkpoint:
//
//   outputs/<request-hash>/<epoch>/
//     0      ← Sample JSON, ordinal 0
//     1
//     ...
//
// Samples are written like checkpoints (hidden temp file, then
// rename), so a reader never sees half a sample. Ordinals are
// handed out as max + 1 and never reused.

use anyhow::{Context, Result};
use std::{
    fs,
    path::PathBuf,
};

use crate::domain::sample::Sample;
use crate::infra::checkpoint::sync_dir;

pub struct OutputPartition {
    dir: PathBuf,
}

impl OutputPartition {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the partition directory if needed.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create output partition '{}'", self.dir.display()))
    }

    /// Stored ordinals, ascending.
    pub fn ordinals(&self) -> Result<Vec<usize>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ordinals = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read output partition '{}'", self.dir.display()))?
        {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(n) = name.parse() {
                    ordinals.push(n);
                }
            }
        }
        ordinals.sort_unstable();
        Ok(ordinals)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.ordinals()?.len())
    }

    pub fn next_ordinal(&self) -> Result<usize> {
        Ok(self.ordinals()?.last().map_or(0, |n| n + 1))
    }

    pub fn read(&self, ordinal: usize) -> Result<Sample> {
        let path = self.dir.join(ordinal.to_string());
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read sample '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Cannot parse sample '{}'", path.display()))
    }

    /// The first `limit` samples in ordinal order (all of them if None).
    pub fn read_all(&self, limit: Option<usize>) -> Result<Vec<Sample>> {
        let ordinals = self.ordinals()?;
        let take = limit.unwrap_or(ordinals.len());
        ordinals.into_iter().take(take).map(|n| self.read(n)).collect()
    }

    /// Store `sample` under its ordinal. Existing ordinals are never replaced.
    pub fn write(&self, sample: &Sample) -> Result<()> {
        let final_path = self.dir.join(sample.ordinal.to_string());
        if final_path.exists() {
            anyhow::bail!("Sample '{}' already exists", final_path.display());
        }
        let tmp_path = self.dir.join(format!(".{}.tmp", sample.ordinal));
        let json = serde_json::to_string_pretty(sample)?;

        fs::write(&tmp_path, json)
            .with_context(|| format!("Cannot write sample '{}'", tmp_path.display()))?;
        fs::rename(&tmp_path, &final_path)
            .with_context(|| format!("Cannot publish sample '{}'", final_path.display()))?;
        sync_dir(&self.dir)
    }
}
