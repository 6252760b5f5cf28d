// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the cache directory:
//
//   identity.rs      — config → stable hex digest (pure)
//   cache.rs         — ArtifactCache / CacheHandle: entry layout,
//                      META, path accessors
//   checkpoint.rs    — CheckpointLedger: list / latest / atomic
//                      publish of per-epoch checkpoints
//   telemetry_log.rs — append-only per-epoch telemetry CSV
//   outputs.rs       — OutputPartition: generated samples stored
//                      by request hash and ordinal

pub mod cache;
pub mod checkpoint;
pub mod identity;
pub mod outputs;
pub mod telemetry_log;
