// ============================================================
// Layer 6 — Artifact Cache
// ============================================================
// A directory tree of cache entries, one per model identity:
//
//   <root>/
//     <identity>/
//       META                  ← config that created the entry (JSON)
//       checkpoints/<epoch>   ← see infra::checkpoint
//       outputs/<hash>/<epoch>/<n>  ← see infra::outputs
//       logs/telemetry.csv    ← see infra::telemetry_log
//
// Opening an entry:
//   - the config is validated and hashed before any I/O, so an
//     invalid config never creates a directory
//   - a new entry is assembled in a hidden staging directory next
//     to its final location and renamed into place, so an entry
//     directory is always complete
//   - an existing entry is verified, never rewritten: META keeps
//     the bytes it was created with
//   - a layout that does not match is reported as Corrupt and left
//     untouched for an operator to inspect
//
// Nothing here deletes an entry.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::{config::ModelConfig, error::CacheError, telemetry::TelemetryRecord};
use crate::infra::{
    checkpoint::CheckpointLedger,
    identity::{identity, Identity},
    outputs::OutputPartition,
    telemetry_log::TelemetryLog,
};

pub const META_FILENAME: &str = "META";
pub const CHECKPOINTS_DIR: &str = "checkpoints";
pub const OUTPUTS_DIR: &str = "outputs";
pub const LOGS_DIR: &str = "logs";
pub const TELEMETRY_FILENAME: &str = "telemetry.csv";

/// Contents of the META file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub identity: String,
    pub config:   ModelConfig,
}

// ─── ArtifactCache ────────────────────────────────────────────────────────────
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn entry_path(&self, id: &Identity) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// Open (creating on first use) the entry for `config`.
    pub fn open(&self, config: &ModelConfig) -> Result<CacheHandle> {
        let id = identity(config)?;
        let path = self.entry_path(&id);

        if !path.exists() {
            self.materialize(&id, config, &path)?;
        }
        verify_layout(&path, &id)?;

        tracing::debug!("Opened cache entry '{}'", path.display());
        Ok(CacheHandle {
            identity: id,
            path,
            config: config.clone(),
        })
    }

    /// Open an entry that must already exist, without writing anything.
    /// The handle carries the config recorded in META.
    pub fn open_existing(&self, id: &Identity) -> Result<CacheHandle> {
        let path = self.entry_path(id);
        if !path.is_dir() {
            anyhow::bail!("No cache entry '{}' under '{}'", id, self.root.display());
        }
        let meta = verify_layout(&path, id)?;
        Ok(CacheHandle {
            identity: id.clone(),
            path,
            config: meta.config,
        })
    }

    /// Identities of every entry under the root, sorted.
    pub fn list_entries(&self) -> Result<Vec<Identity>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("Cannot read cache root '{}'", self.root.display()))?
        {
            let entry = entry?;
            if let Some(id) = entry.file_name().to_str().and_then(Identity::parse) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn materialize(&self, id: &Identity, config: &ModelConfig, path: &Path) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Cannot create cache root '{}'", self.root.display()))?;

        let staging = self.root.join(format!(".{}.{}.tmp", id, std::process::id()));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }

        let built = build_layout(&staging, id, config);
        let published = built.and_then(|_| {
            fs::rename(&staging, path)
                .with_context(|| format!("Cannot publish cache entry '{}'", path.display()))
        });

        match published {
            Ok(()) => {
                tracing::info!("Created cache entry '{}'", path.display());
                Ok(())
            }
            // Another process created the entry first; theirs is used.
            Err(_) if path.is_dir() => {
                let _ = fs::remove_dir_all(&staging);
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                Err(e)
            }
        }
    }
}

fn build_layout(dir: &Path, id: &Identity, config: &ModelConfig) -> Result<()> {
    for sub in [CHECKPOINTS_DIR, OUTPUTS_DIR, LOGS_DIR] {
        fs::create_dir_all(dir.join(sub))
            .with_context(|| format!("Cannot create '{}'", dir.join(sub).display()))?;
    }

    let meta = CacheMeta {
        identity: id.to_string(),
        config:   config.clone(),
    };
    let mut json = serde_json::to_string_pretty(&meta)?;
    json.push('\n');

    let meta_path = dir.join(META_FILENAME);
    let mut f = File::create(&meta_path)
        .with_context(|| format!("Cannot create '{}'", meta_path.display()))?;
    f.write_all(json.as_bytes())?;
    f.sync_all()?;
    Ok(())
}

fn verify_layout(path: &Path, id: &Identity) -> Result<CacheMeta> {
    let meta_path = path.join(META_FILENAME);
    if !meta_path.is_file() {
        return Err(CacheError::corrupt(path, "META file is missing").into());
    }
    for sub in [CHECKPOINTS_DIR, OUTPUTS_DIR, LOGS_DIR] {
        if !path.join(sub).is_dir() {
            return Err(CacheError::corrupt(path, format!("'{sub}' directory is missing")).into());
        }
    }

    let json = fs::read_to_string(&meta_path)
        .with_context(|| format!("Cannot read '{}'", meta_path.display()))?;
    let meta: CacheMeta = serde_json::from_str(&json)
        .map_err(|e| CacheError::corrupt(path, format!("META is unreadable: {e}")))?;

    let recorded = identity(&meta.config)
        .map_err(|e| CacheError::corrupt(path, format!("META holds an invalid config: {e}")))?;
    if meta.identity != id.as_str() || recorded != *id {
        return Err(CacheError::corrupt(path, "META does not match the entry identity").into());
    }
    Ok(meta)
}

// ─── CacheHandle ──────────────────────────────────────────────────────────────
/// An opened cache entry. `config` is the config it was opened with,
/// which may differ from META in non-semantic fields such as the
/// epoch target.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    identity: Identity,
    path:     PathBuf,
    config:   ModelConfig,
}

impl CacheHandle {
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn meta_path(&self) -> PathBuf {
        self.path.join(META_FILENAME)
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.path.join(CHECKPOINTS_DIR)
    }

    pub fn outputs_dir(&self) -> PathBuf {
        self.path.join(OUTPUTS_DIR)
    }

    pub fn output_partition_dir(&self, request_hash: &str, epoch: usize) -> PathBuf {
        self.outputs_dir().join(request_hash).join(epoch.to_string())
    }

    pub fn telemetry_path(&self) -> PathBuf {
        self.path.join(LOGS_DIR).join(TELEMETRY_FILENAME)
    }

    pub fn checkpoints(&self) -> CheckpointLedger {
        CheckpointLedger::new(self.checkpoints_dir())
    }

    pub fn telemetry(&self) -> TelemetryLog {
        TelemetryLog::new(self.telemetry_path())
    }

    /// Outputs of `request_hash` generated from checkpoint `epoch`.
    pub fn output_partition(&self, request_hash: &str, epoch: usize) -> OutputPartition {
        OutputPartition::new(self.output_partition_dir(request_hash, epoch))
    }

    /// Every non-empty output partition as (request hash, checkpoint
    /// epoch), sorted.
    pub fn output_partitions(&self) -> Result<Vec<(String, usize)>> {
        let mut keys = Vec::new();
        for hash_dir in subdirectories(&self.outputs_dir())? {
            let hash = hash_dir.file_name().to_string_lossy().into_owned();
            for epoch_dir in subdirectories(&hash_dir.path())? {
                let Some(epoch) = epoch_dir.file_name().to_str().and_then(|n| n.parse().ok()) else {
                    continue;
                };
                if self.output_partition(&hash, epoch).count()? > 0 {
                    keys.push((hash.clone(), epoch));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// True once a checkpoint exists for every epoch the config asks for.
    pub fn is_trained(&self) -> Result<bool> {
        Ok(self.checkpoints().count()? >= self.config.training.num_epochs)
    }

    /// One record per epoch (the newest row wins).
    pub fn training_telemetry(&self) -> Result<Vec<TelemetryRecord>> {
        self.telemetry().by_epoch()
    }
}

fn subdirectories(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Cannot read '{}'", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry);
        }
    }
    Ok(dirs)
}
