// ============================================================
// Layer 6 — Checkpoint Ledger
// ============================================================
// Tracks which epochs have a durable checkpoint.
//
// Layout:
//   checkpoints/
//     0              ← model state after epoch 0
//     1
//     ...
//     .3.tmp         ← epoch 3 being written (invisible to list())
//
// Publishing writes `.<epoch>.tmp`, fsyncs it, renames it to
// `<epoch>` and fsyncs the directory so the new name survives a
// power loss. rename(2) is atomic within a directory, so a
// reader sees either no checkpoint or a complete one. A crash
// mid-write leaves only a dot-file, which list() ignores and the
// next publish of that epoch overwrites.
//
// The ledger holds no state of its own: every query rescans the
// directory, so a second process (e.g. a reporting tool) gets a
// live view.

use anyhow::{Context, Result};
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};

pub struct CheckpointLedger {
    dir: PathBuf,
}

impl CheckpointLedger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the published checkpoint for `epoch` (it may not exist).
    pub fn path(&self, epoch: usize) -> PathBuf {
        self.dir.join(epoch.to_string())
    }

    /// Completed epochs in ascending order. Gaps are reported as-is.
    pub fn list(&self) -> Result<Vec<usize>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut epochs = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read checkpoint directory '{}'", self.dir.display()))?
        {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(epoch) = name.to_str().and_then(parse_epoch) {
                epochs.push(epoch);
            }
        }
        epochs.sort_unstable();
        Ok(epochs)
    }

    pub fn latest(&self) -> Result<Option<usize>> {
        Ok(self.list()?.last().copied())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }

    /// Atomically publish the checkpoint for `epoch`.
    ///
    /// `write` receives the temporary path and must create the file.
    /// If it fails, nothing is published and the temporary file is
    /// removed.
    pub fn publish<F>(&self, epoch: usize, write: F) -> Result<PathBuf>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let tmp_path = self.dir.join(format!(".{epoch}.tmp"));
        let final_path = self.path(epoch);

        if tmp_path.exists() {
            fs::remove_file(&tmp_path).with_context(|| {
                format!("Cannot remove stale checkpoint '{}'", tmp_path.display())
            })?;
        }

        let written = write(&tmp_path).and_then(|_| {
            File::open(&tmp_path)
                .and_then(|f| f.sync_all())
                .with_context(|| format!("Cannot sync checkpoint '{}'", tmp_path.display()))
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.context(format!("Checkpoint for epoch {epoch} was not published")));
        }

        fs::rename(&tmp_path, &final_path).with_context(|| {
            format!("Cannot publish checkpoint '{}'", final_path.display())
        })?;
        sync_dir(&self.dir)?;

        tracing::debug!("Published checkpoint: epoch {}", epoch);
        Ok(final_path)
    }
}

/// Flush a directory's entries (new or renamed names) to disk.
#[cfg(unix)]
pub(crate) fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|d| d.sync_all())
        .with_context(|| format!("Cannot sync directory '{}'", dir.display()))
}

/// Directories cannot be opened for syncing here; renames are left to the OS.
#[cfg(not(unix))]
pub(crate) fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Decimal names only: "12" → 12; ".12.tmp", "012x", "" → None.
fn parse_epoch(name: &str) -> Option<usize> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}
