// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Brings one cache entry up to a target epoch count:
//
//   Step 1: Open (or create) the entry     (Layer 6 - infra)
//   Step 2: Load and encode the corpus     (Layer 4 - data)
//   Step 3: Build the model family         (Layer 5 - ml)
//   Step 4: Run the resumable epoch loop   (Layer 5 - ml)
//
// Calling it again with the same config is a no-op once the
// target is reached; calling it with a larger epoch count
// continues from the latest checkpoint.

use anyhow::Result;
use std::path::PathBuf;

use crate::data::corpus::Corpus;
use crate::domain::{config::ModelConfig, context::RuntimeContext, traits::CorpusReader};
use crate::infra::cache::ArtifactCache;
use crate::ml::{
    model::NgramModel,
    trainer::{self, TrainOutcome},
};

pub struct TrainUseCase {
    cache_root: PathBuf,
    config:     ModelConfig,
}

impl TrainUseCase {
    pub fn new(cache_root: impl Into<PathBuf>, config: ModelConfig) -> Self {
        Self {
            cache_root: cache_root.into(),
            config,
        }
    }

    /// Train to `epochs` (default: `training.num_epochs` of the config).
    /// The epoch count does not affect which entry is trained.
    pub fn execute(&self, ctx: &mut RuntimeContext, epochs: Option<usize>) -> Result<TrainOutcome> {
        let config = match epochs {
            Some(n) => self.config.with_num_epochs(n),
            None => self.config.clone(),
        };

        // ── Step 1: Cache entry ───────────────────────────────────────────────
        // Opening validates the config; nothing below runs if it is invalid.
        let cache = ArtifactCache::new(&self.cache_root);
        let handle = cache.open(&config)?;
        tracing::info!("Cache entry: {}", handle.path().display());

        // ── Step 2: Corpus ────────────────────────────────────────────────────
        let corpus = Corpus::load(&config.corpus)?;

        // ── Step 3: Model ─────────────────────────────────────────────────────
        let model = NgramModel::from_config(&config, corpus.vocab_size())?;

        // ── Step 4: Epoch loop ────────────────────────────────────────────────
        trainer::train(&handle, &model, &corpus, ctx, config.training.num_epochs)
    }
}
