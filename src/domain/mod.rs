// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain structs, enums and traits that name the concepts of the
// system. The only file this layer reads is a config file.
//
//   config.rs       — ModelConfig and its validation
//   content_file.rs — one source file of the corpus
//   error.rs        — the typed error taxonomy
//   sample.rs       — SampleRequest, TerminationCriterion, Sample
//   telemetry.rs    — TelemetryRecord
//   context.rs      — RuntimeContext passed to models
//   traits.rs       — Trainable, CorpusReader, CompletionPredicate

pub mod config;
pub mod content_file;
pub mod context;
pub mod error;
pub mod sample;
pub mod telemetry;
pub mod traits;
