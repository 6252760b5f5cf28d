// ============================================================
// Layer 5 — ML Layer
// ============================================================
// Everything that trains or runs a model. The orchestration
// (trainer.rs, sampler.rs) is written once against the
// Trainable trait; model.rs is the one bundled model family.
//
//   model.rs       — NgramModel: smoothed back-off n-gram over
//                    corpus symbols, JSON checkpoints
//
//   trainer.rs     — resumable epoch loop: restore latest
//                    checkpoint, advance, publish, log telemetry
//
//   sampler.rs     — cached, batched generation from the latest
//                    checkpoint into an output partition
//
//   termination.rs — request criteria → CompletionPredicate
//
//   weighted.rs    — temperature softmax + weighted draw

/// Back-off n-gram model (the bundled Trainable)
pub mod model;

/// Incremental, idempotent training loop
pub mod trainer;

/// Sampling engine with output caching
pub mod sampler;

/// Completion predicates built from termination criteria
pub mod termination;

/// Weighted choice over model scores
pub mod weighted;
