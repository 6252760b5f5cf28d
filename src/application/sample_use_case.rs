// ============================================================
// Layer 2 — SampleUseCase
// ============================================================
// Produces (or fetches) outputs for one request against one
// config:
//
//   Step 1: Open the entry for the config
//   Step 2: Load the corpus (its vocabulary encodes the request)
//   Step 3: Sample; an untrained entry is trained first

use anyhow::Result;
use std::path::PathBuf;

use crate::data::corpus::Corpus;
use crate::domain::{
    config::ModelConfig,
    context::RuntimeContext,
    sample::{Sample, SampleRequest},
    traits::CorpusReader,
};
use crate::infra::cache::ArtifactCache;
use crate::ml::{model::NgramModel, sampler};

pub struct SampleUseCase {
    cache_root: PathBuf,
    config:     ModelConfig,
}

impl SampleUseCase {
    pub fn new(cache_root: impl Into<PathBuf>, config: ModelConfig) -> Self {
        Self {
            cache_root: cache_root.into(),
            config,
        }
    }

    pub fn execute(
        &self,
        ctx:       &mut RuntimeContext,
        request:   &SampleRequest,
        min_count: usize,
        max_count: Option<usize>,
    ) -> Result<Vec<Sample>> {
        // A bad request fails here, before the entry is created or trained.
        request.validate()?;

        let handle = ArtifactCache::new(&self.cache_root).open(&self.config)?;
        let corpus = Corpus::load(&self.config.corpus)?;
        let model = NgramModel::from_config(&self.config, corpus.vocab_size())?;

        let samples = sampler::sample(&handle, &model, &corpus, ctx, request, min_count, max_count)?;
        tracing::info!("{} samples for entry {}", samples.len(), handle.identity());
        Ok(samples)
    }
}
