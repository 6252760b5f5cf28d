// ============================================================
// Layer 5 — N-gram Model
// ============================================================
// The bundled Trainable: a back-off n-gram over corpus symbols.
//
// State: for every context of length 0..order-1 seen in training,
// a weighted count of each symbol that followed it.
//
// Prediction for a sequence uses the longest suffix (at most
// order-1 symbols) that has counts, with additive smoothing:
//
//   p(x | ctx) = (count(ctx, x) + α) / (total(ctx) + α·V)
//
// and returns ln p as the score of every symbol. Softmax at
// temperature 1 therefore recovers p exactly.
//
// One epoch = one pass over the batched corpus windows. For each
// batch the loss (mean −ln p of every target) is measured with
// the counts as they were *before* the batch, then the batch's
// n-grams are added with weight = the epoch's learning rate.
// Decaying the rate makes later epochs refine rather than
// dominate the estimate.
//
// Checkpoints are pretty JSON with contexts in sorted order, so
// the same state always serialises to the same bytes.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

use crate::data::batcher::SequenceBatcher;
use crate::domain::{
    config::{ArchitectureConfig, ModelConfig, TrainingConfig},
    context::RuntimeContext,
    error::CacheError,
    traits::{CorpusReader, Increment, Trainable},
};

const STATE_FORMAT_VERSION: u32 = 1;

// ─── NgramModel ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct NgramModel {
    order:      usize,
    smoothing:  f64,
    vocab_size: usize,
    training:   TrainingConfig,
}

impl NgramModel {
    /// Build the model described by `config` for a vocabulary of `vocab_size`.
    pub fn from_config(config: &ModelConfig, vocab_size: usize) -> Result<Self> {
        if vocab_size == 0 {
            anyhow::bail!("Cannot build a model over an empty vocabulary");
        }
        match &config.architecture {
            ArchitectureConfig::Ngram { order, smoothing } => Ok(Self {
                order: *order,
                smoothing: *smoothing,
                vocab_size,
                training: config.training.clone(),
            }),
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn context_len(&self) -> usize {
        self.order.saturating_sub(1)
    }

    fn probability(&self, state: &NgramState, context: &[u32], next: u32) -> f64 {
        let alpha = self.smoothing;
        let v = self.vocab_size as f64;
        match state.deepest_counts(context) {
            Some(counts) => (counts.get(next) + alpha) / (counts.total + alpha * v),
            None => 1.0 / v,
        }
    }

    fn check_vocab(&self, state: &NgramState) -> Result<()> {
        if state.vocab_size != self.vocab_size || state.order != self.order {
            anyhow::bail!(
                "Model state has vocab {} / order {}, model expects vocab {} / order {}",
                state.vocab_size,
                state.order,
                self.vocab_size,
                self.order
            );
        }
        Ok(())
    }
}

// ─── NgramState ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextCounts {
    pub total: f64,
    pub next:  BTreeMap<u32, f64>,
}

impl ContextCounts {
    fn get(&self, symbol: u32) -> f64 {
        self.next.get(&symbol).copied().unwrap_or(0.0)
    }

    fn add(&mut self, symbol: u32, weight: f64) {
        *self.next.entry(symbol).or_insert(0.0) += weight;
        self.total += weight;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NgramState {
    pub vocab_size:     usize,
    pub order:          usize,
    pub epochs_trained: usize,
    pub contexts:       BTreeMap<Vec<u32>, ContextCounts>,
}

impl NgramState {
    /// Counts for the longest suffix of `context` seen in training.
    fn deepest_counts(&self, context: &[u32]) -> Option<&ContextCounts> {
        (0..=context.len())
            .map(|start| &context[start..])
            .find_map(|suffix| self.contexts.get(suffix).filter(|c| c.total > 0.0))
    }
}

/// On-disk form. JSON object keys must be strings, so the context map
/// is written as a sorted list.
#[derive(Serialize, Deserialize)]
struct StateFile {
    format_version: u32,
    vocab_size:     usize,
    order:          usize,
    epochs_trained: usize,
    contexts:       Vec<(Vec<u32>, ContextCounts)>,
}

// ─── Trainable ────────────────────────────────────────────────────────────────
impl Trainable for NgramModel {
    type State = NgramState;

    fn initialize_state(&self, _ctx: &mut RuntimeContext) -> Result<NgramState> {
        Ok(NgramState {
            vocab_size:     self.vocab_size,
            order:          self.order,
            epochs_trained: 0,
            contexts:       BTreeMap::new(),
        })
    }

    fn advance_one_increment(
        &self,
        mut state: NgramState,
        corpus:    &dyn CorpusReader,
        ctx:       &mut RuntimeContext,
    ) -> Result<Increment<NgramState>> {
        self.check_vocab(&state)?;
        if corpus.vocab_size() != self.vocab_size {
            anyhow::bail!(
                "Corpus vocab size {} does not match model vocab size {}",
                corpus.vocab_size(),
                self.vocab_size
            );
        }

        let learning_rate = self.training.learning_rate_at(ctx.epoch());
        let batcher = SequenceBatcher::new(self.training.sequence_length(), self.training.batch_size);
        let batches = batcher.batches(corpus.encoded(), self.training.shuffle_corpus, ctx.rng());

        let context_len = self.context_len();
        let mut loss_sum = 0.0f64;
        let mut loss_batches = 0usize;
        let mut steps = 0u64;

        for (batch_index, batch) in batches.iter().enumerate() {
            // ── Loss under the counts as they were before this batch ──────────
            let mut nll = 0.0f64;
            let mut targets = 0usize;
            for window in batch {
                for i in 1..window.len() {
                    let context = &window[i.saturating_sub(context_len)..i];
                    nll -= self.probability(&state, context, window[i]).ln();
                    targets += 1;
                }
            }

            // ── Add this batch's n-grams ──────────────────────────────────────
            for window in batch {
                for i in 1..window.len() {
                    let context = &window[i.saturating_sub(context_len)..i];
                    for start in 0..=context.len() {
                        state
                            .contexts
                            .entry(context[start..].to_vec())
                            .or_default()
                            .add(window[i], learning_rate);
                    }
                }
            }

            if targets > 0 {
                loss_sum += nll / targets as f64;
                loss_batches += 1;
            }
            steps += 1;

            if ctx.is_cancelled() {
                return Err(CacheError::Cancelled { epoch: ctx.epoch() }.into());
            }
            if (batch_index + 1) % self.training.log_every_n_steps == 0 {
                tracing::debug!(
                    "epoch {} step {}/{} loss={:.4}",
                    ctx.epoch(),
                    batch_index + 1,
                    batches.len(),
                    nll / targets.max(1) as f64
                );
            }
        }

        state.epochs_trained += 1;
        let loss = if loss_batches > 0 { loss_sum / loss_batches as f64 } else { f64::NAN };

        Ok(Increment {
            state,
            loss,
            steps,
            learning_rate,
        })
    }

    fn persist(&self, state: &NgramState, path: &Path) -> Result<()> {
        let file = StateFile {
            format_version: STATE_FORMAT_VERSION,
            vocab_size:     state.vocab_size,
            order:          state.order,
            epochs_trained: state.epochs_trained,
            contexts:       state.contexts.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        let json = serde_json::to_vec_pretty(&file)?;
        fs::write(path, json).with_context(|| format!("Cannot write '{}'", path.display()))
    }

    fn restore(&self, path: &Path) -> Result<NgramState> {
        let json = fs::read(path)
            .with_context(|| format!("Cannot read checkpoint '{}'", path.display()))?;
        let file: StateFile = serde_json::from_slice(&json)
            .with_context(|| format!("Cannot parse checkpoint '{}'", path.display()))?;
        if file.format_version != STATE_FORMAT_VERSION {
            anyhow::bail!(
                "Unsupported checkpoint format {} in '{}' (expected {})",
                file.format_version,
                path.display(),
                STATE_FORMAT_VERSION
            );
        }

        let state = NgramState {
            vocab_size:     file.vocab_size,
            order:          file.order,
            epochs_trained: file.epochs_trained,
            contexts:       file.contexts.into_iter().collect(),
        };
        self.check_vocab(&state)?;
        Ok(state)
    }

    fn predict(&self, state: &NgramState, batch: &[&[u32]]) -> Result<Vec<Vec<f64>>> {
        self.check_vocab(state)?;
        let v = self.vocab_size as u32;

        batch
            .iter()
            .map(|sequence| {
                if let Some(bad) = sequence.iter().find(|&&t| t >= v) {
                    anyhow::bail!("Token {bad} is outside the vocabulary of {v} symbols");
                }
                let context = &sequence[sequence.len().saturating_sub(self.context_len())..];
                Ok((0..v)
                    .map(|next| self.probability(state, context, next).ln())
                    .collect())
            })
            .collect()
    }
}
