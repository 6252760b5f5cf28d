// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The orchestration code is written once, against these traits:
//
//   Trainable           — a model family: init / advance / persist /
//                         restore / predict. NgramModel (ml::model)
//                         is the bundled implementation.
//   CorpusReader        — read-only view of a tokenised corpus.
//   CompletionPredicate — "is this sequence finished?"
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use std::path::Path;

use crate::domain::context::RuntimeContext;

// ─── CorpusReader ─────────────────────────────────────────────────────────────
/// The tokenised corpus as seen by a model.
pub trait CorpusReader {
    /// Number of distinct symbols. Token ids are `0..vocab_size`.
    fn vocab_size(&self) -> usize;

    /// All content files, encoded and concatenated.
    fn encoded(&self) -> &[u32];
}

// ─── Increment ────────────────────────────────────────────────────────────────
/// What one epoch of training produced.
#[derive(Debug)]
pub struct Increment<S> {
    pub state:         S,
    /// Mean loss over the epoch.
    pub loss:          f64,
    /// Optimisation steps taken during the epoch.
    pub steps:         u64,
    pub learning_rate: f64,
}

// ─── Trainable ────────────────────────────────────────────────────────────────
/// A model family the orchestrator can train and sample from.
///
/// Implementations must make `persist` a pure function of the state so
/// that identical training yields identical checkpoint bytes.
pub trait Trainable {
    type State;

    /// Fresh, untrained state.
    fn initialize_state(&self, ctx: &mut RuntimeContext) -> Result<Self::State>;

    /// Train for exactly one epoch over `corpus`.
    fn advance_one_increment(
        &self,
        state:  Self::State,
        corpus: &dyn CorpusReader,
        ctx:    &mut RuntimeContext,
    ) -> Result<Increment<Self::State>>;

    /// Write `state` to the file at `path`. The file does not exist yet.
    fn persist(&self, state: &Self::State, path: &Path) -> Result<()>;

    fn restore(&self, path: &Path) -> Result<Self::State>;

    /// Next-symbol scores for every sequence in `batch`, one vector of
    /// `vocab_size` scores per sequence. Scores are unnormalised logits.
    fn predict(&self, state: &Self::State, batch: &[&[u32]]) -> Result<Vec<Vec<f64>>>;
}

// ─── CompletionPredicate ──────────────────────────────────────────────────────
pub trait CompletionPredicate {
    /// True once `sequence` (start text included) needs no more symbols.
    fn is_complete(&self, sequence: &[u32]) -> bool;
}

impl<F> CompletionPredicate for F
where
    F: Fn(&[u32]) -> bool,
{
    fn is_complete(&self, sequence: &[u32]) -> bool {
        self(sequence)
    }
}
