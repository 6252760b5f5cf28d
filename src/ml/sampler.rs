// ============================================================
// Layer 5 — Sampling Engine
// ============================================================
// Generates outputs from the latest checkpoint of an entry and
// caches them under the request hash and that checkpoint's epoch:
//
//   1. Validate the request, hash it
//   2. Latest checkpoint k exists and outputs/<hash>/<k>/ holds
//      >= min_count → return the first min_count
//   3. No checkpoint yet → train to config.training.num_epochs
//   4. Restore the latest checkpoint k
//   5. Generate whole batches until outputs/<hash>/<k>/ reaches
//      min_count, storing every batch before the next starts
//
// Training further moves the latest checkpoint, so the next call
// generates a fresh partition instead of serving stale outputs.
//
// Inside a batch all unfinished sequences are advanced together:
//
//   predict(batch) → choose(scores, T) per sequence → append →
//   check the completion predicate
//
// With a seed, each batch draws from an RNG derived from the seed
// and the batch's first ordinal, so a partition filled in one
// call or in several holds the same outputs.

use anyhow::{Context, Result};
use rand::{rngs::StdRng, SeedableRng};
use std::time::Instant;

use crate::data::corpus::Corpus;
use crate::domain::{
    context::RuntimeContext,
    sample::{Sample, SampleRequest},
    traits::{CompletionPredicate, Trainable},
};
use crate::infra::{cache::CacheHandle, identity::digest_of};
use crate::ml::{termination::Termination, trainer, weighted};

const BATCH_SEED_STRIDE: u64 = 0xD1B5_4A32_D192_ED03;

/// Hash naming the output partition of `request`.
pub fn request_hash(request: &SampleRequest) -> Result<String> {
    request.validate()?;
    digest_of(request)
}

pub fn sample<M: Trainable>(
    handle:    &CacheHandle,
    model:     &M,
    corpus:    &Corpus,
    ctx:       &mut RuntimeContext,
    request:   &SampleRequest,
    min_count: usize,
    max_count: Option<usize>,
) -> Result<Vec<Sample>> {
    let hash = request_hash(request)?;
    let ledger = handle.checkpoints();

    // ── Cache hit ─────────────────────────────────────────────────────────────
    if let Some(latest) = ledger.latest()? {
        let partition = handle.output_partition(&hash, latest);
        let cached = partition.count()?;
        if cached >= min_count {
            tracing::info!(
                "Request {} served from cache at epoch {} ({} stored)",
                hash,
                latest,
                cached
            );
            let mut hit = partition.read_all(Some(min_count))?;
            truncate(&mut hit, max_count);
            return Ok(hit);
        }
    }

    // Resolve everything that can fail on the request before touching the model.
    let atomizer = corpus.atomizer();
    let start = atomizer
        .encode(&request.start_text)
        .context("start text cannot be encoded")?;
    let termination = Termination::specialize(&request.termination, atomizer)?;

    // ── Model ─────────────────────────────────────────────────────────────────
    if ledger.latest()?.is_none() {
        tracing::info!("No checkpoint for {}, training before sampling", handle.identity());
        trainer::train(handle, model, corpus, ctx, handle.config().training.num_epochs)?;
    }
    let Some(latest) = ledger.latest()? else {
        anyhow::bail!("Entry {} has no checkpoint to sample from", handle.identity());
    };
    let state = model
        .restore(&ledger.path(latest))
        .with_context(|| format!("Cannot restore checkpoint {latest} for sampling"))?;
    tracing::info!("Sampling {} from checkpoint {}", hash, latest);
    let partition = handle.output_partition(&hash, latest);

    // ── Generation ────────────────────────────────────────────────────────────
    partition.ensure()?;
    let mut results = partition.read_all(None)?;
    let mut rng = StdRng::from_entropy();

    while results.len() < min_count {
        if ctx.is_cancelled() {
            tracing::warn!("Sampling cancelled with {} of {} outputs", results.len(), min_count);
            break;
        }

        let first_ordinal = partition.next_ordinal()?;
        if let Some(seed) = request.seed {
            rng = StdRng::seed_from_u64(
                seed.wrapping_add((first_ordinal as u64).wrapping_mul(BATCH_SEED_STRIDE)),
            );
        }

        let started_ms = trainer::now_unix_ms();
        let started = Instant::now();
        let sequences = generate_batch(model, &state, &start, &termination, request, &mut rng)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        for (offset, sequence) in sequences.into_iter().enumerate() {
            let sample = Sample {
                ordinal:                   first_ordinal + offset,
                epoch:                     latest,
                text:                      atomizer.decode(&sequence),
                num_tokens:                sequence.len(),
                sample_time_ms:            elapsed_ms,
                sample_start_epoch_ms_utc: started_ms,
            };
            partition.write(&sample)?;
            results.push(sample);
        }
        tracing::debug!("Stored batch at ordinal {} ({} ms)", first_ordinal, elapsed_ms);
    }

    truncate(&mut results, max_count);
    Ok(results)
}

/// Grow `batch_size` copies of `start` until each one is complete.
fn generate_batch<M: Trainable>(
    model:       &M,
    state:       &M::State,
    start:       &[u32],
    termination: &Termination,
    request:     &SampleRequest,
    rng:         &mut StdRng,
) -> Result<Vec<Vec<u32>>> {
    let mut sequences = vec![start.to_vec(); request.batch_size];
    let mut active: Vec<usize> = (0..sequences.len())
        .filter(|&i| !termination.is_complete(&sequences[i]))
        .collect();

    while !active.is_empty() {
        let views: Vec<&[u32]> = active.iter().map(|&i| sequences[i].as_slice()).collect();
        let scores = model.predict(state, &views).context("Model prediction failed")?;
        if scores.len() != active.len() {
            anyhow::bail!(
                "Model returned {} score vectors for {} sequences",
                scores.len(),
                active.len()
            );
        }

        for (&i, row) in active.iter().zip(&scores) {
            let next = weighted::choose(row, request.temperature, rng)?;
            sequences[i].push(next as u32);
        }
        active.retain(|&i| !termination.is_complete(&sequences[i]));
    }
    Ok(sequences)
}

fn truncate(samples: &mut Vec<Sample>, max_count: Option<usize>) {
    if let Some(max) = max_count {
        samples.truncate(max);
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::corpus::tests::write_abc_corpus;
    use crate::domain::{
        config::tests::abc_config,
        error::CacheError,
        sample::{tests::max_len_request, TerminationCriterion},
        traits::CorpusReader,
    };
    use crate::infra::cache::ArtifactCache;
    use crate::ml::model::NgramModel;
    use std::path::Path;

    fn setup(dir: &Path) -> (CacheHandle, Corpus, NgramModel) {
        let cfg = abc_config(&write_abc_corpus(dir));
        let handle = ArtifactCache::new(dir.join("cache")).open(&cfg).unwrap();
        let corpus = Corpus::load(&cfg.corpus).unwrap();
        let model = NgramModel::from_config(&cfg, corpus.vocab_size()).unwrap();
        (handle, corpus, model)
    }

    #[test]
    fn test_fresh_count_is_batch_multiple() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, corpus, model) = setup(dir.path());
        let req = max_len_request("int", 20, 4);

        let out = sample(&handle, &model, &corpus, &mut RuntimeContext::new(42), &req, 5, None).unwrap();
        assert_eq!(out.len(), 8);
        assert_eq!(out.iter().map(|s| s.ordinal).collect::<Vec<_>>(), (0..8).collect::<Vec<_>>());
        for s in &out {
            assert!(s.text.starts_with("int"));
            assert!(s.num_tokens <= 20);
            assert_eq!(s.text.chars().count(), s.num_tokens);
        }
    }

    #[test]
    fn test_sampling_trains_untrained_entry() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, corpus, model) = setup(dir.path());
        assert_eq!(handle.checkpoints().latest().unwrap(), None);

        let req = max_len_request("int", 12, 2);
        sample(&handle, &model, &corpus, &mut RuntimeContext::new(42), &req, 1, None).unwrap();
        assert!(handle.is_trained().unwrap());
        assert_eq!(handle.checkpoints().count().unwrap(), 2);
    }

    #[test]
    fn test_cache_hit_returns_stored_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, corpus, model) = setup(dir.path());
        let req = max_len_request("int", 16, 4);
        let first = sample(&handle, &model, &corpus, &mut RuntimeContext::new(42), &req, 4, None).unwrap();

        let partition = handle.output_partition(&request_hash(&req).unwrap(), 1);
        assert_eq!(partition.count().unwrap(), 4);

        let again = sample(&handle, &model, &corpus, &mut RuntimeContext::new(42), &req, 3, None).unwrap();
        assert_eq!(again, first[..3].to_vec());
        assert_eq!(partition.count().unwrap(), 4);
    }

    #[test]
    fn test_partial_cache_is_topped_up_by_whole_batches() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, corpus, model) = setup(dir.path());
        let req = max_len_request("int", 16, 4);
        sample(&handle, &model, &corpus, &mut RuntimeContext::new(42), &req, 4, None).unwrap();

        let out = sample(&handle, &model, &corpus, &mut RuntimeContext::new(42), &req, 6, None).unwrap();
        assert_eq!(out.len(), 8);
        assert_eq!(out.last().unwrap().ordinal, 7);
    }

    #[test]
    fn test_max_count_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, corpus, model) = setup(dir.path());
        let req = max_len_request("int", 16, 4);
        let out = sample(&handle, &model, &corpus, &mut RuntimeContext::new(42), &req, 5, Some(5)).unwrap();
        assert_eq!(out.len(), 5);
        // the whole second batch is still stored
        assert_eq!(handle.output_partition(&request_hash(&req).unwrap(), 1).count().unwrap(), 8);
    }

    #[test]
    fn test_seeded_requests_reproduce() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let (ha, ca, ma) = setup(a.path());
        let (hb, cb, mb) = setup(b.path());
        let req = max_len_request("int", 24, 2);

        let texts = |out: Vec<Sample>| out.into_iter().map(|s| s.text).collect::<Vec<_>>();
        let from_a = texts(sample(&ha, &ma, &ca, &mut RuntimeContext::new(42), &req, 4, None).unwrap());
        // same request filled in two calls
        sample(&hb, &mb, &cb, &mut RuntimeContext::new(42), &req, 2, None).unwrap();
        let from_b = texts(sample(&hb, &mb, &cb, &mut RuntimeContext::new(42), &req, 4, None).unwrap());
        assert_eq!(from_a, from_b);
    }

    #[test]
    fn test_depth_criterion_stops_at_closing_brace() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, corpus, model) = setup(dir.path());
        let mut req = max_len_request("int a() {", 200, 2);
        req.termination.push(TerminationCriterion::SymmetricalTokenDepth {
            open:  "{".into(),
            close: "}".into(),
        });

        let out = sample(&handle, &model, &corpus, &mut RuntimeContext::new(42), &req, 2, None).unwrap();
        for s in out {
            assert!(s.num_tokens == 200 || s.text.ends_with('}'), "{:?}", s.text);
        }
    }

    #[test]
    fn test_unknown_start_symbol_is_request_error() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, corpus, model) = setup(dir.path());
        let req = max_len_request("#include", 16, 1);
        let err = sample(&handle, &model, &corpus, &mut RuntimeContext::new(42), &req, 1, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CacheError>(),
            Some(CacheError::InvalidRequest(_))
        ));
        assert_eq!(handle.checkpoints().latest().unwrap(), None);
    }

    #[test]
    fn test_further_training_invalidates_cached_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, corpus, model) = setup(dir.path());
        let req = max_len_request("int", 16, 4);
        let hash = request_hash(&req).unwrap();

        let before = sample(&handle, &model, &corpus, &mut RuntimeContext::new(42), &req, 4, None).unwrap();
        assert!(before.iter().all(|s| s.epoch == 1));

        trainer::train(&handle, &model, &corpus, &mut RuntimeContext::new(42), 4).unwrap();
        let after = sample(&handle, &model, &corpus, &mut RuntimeContext::new(42), &req, 4, None).unwrap();
        assert_eq!(after.len(), 4);
        assert!(after.iter().all(|s| s.epoch == 3));

        // both generations are kept, each under its own checkpoint
        assert_eq!(handle.output_partition(&hash, 1).read_all(None).unwrap(), before);
        assert_eq!(handle.output_partition(&hash, 3).read_all(None).unwrap(), after);
        assert_eq!(
            handle.output_partitions().unwrap(),
            vec![(hash.clone(), 1), (hash, 3)]
        );
    }
}
