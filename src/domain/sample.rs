// ============================================================
// Layer 3 — Sampling Domain Types
// ============================================================
// SampleRequest describes one generation run. It is hashed (see
// infra::identity::digest_of) into the key of its own output
// partition, so every field here must change what gets generated.
//
// Sample is one accepted output, stored as JSON under
//   outputs/<request-hash>/<checkpoint-epoch>/<ordinal>
// and never modified after being written. Outputs of an older
// checkpoint stay on disk but are never served for a newer one.

use serde::{Deserialize, Serialize};

use crate::domain::error::CacheError;

// ─── TerminationCriterion ─────────────────────────────────────────────────────
/// A rule that decides when a sequence in progress is finished.
/// Criteria are combined with OR: the first one that fires wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TerminationCriterion {
    /// Complete once the sequence (start text included) holds this many symbols.
    MaxTokenLength { maximum: usize },

    /// Complete once every `open` symbol seen has been matched by a
    /// `close`, e.g. the closing brace of a function body.
    SymmetricalTokenDepth { open: String, close: String },
}

// ─── SampleRequest ────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRequest {
    /// Every sequence starts with these symbols.
    pub start_text:  String,
    pub temperature: f64,
    /// Sequences generated side by side per batch.
    pub batch_size:  usize,
    pub termination: Vec<TerminationCriterion>,
    /// Fixes the random draws. None samples from OS entropy.
    #[serde(default)]
    pub seed:        Option<u64>,
}

impl SampleRequest {
    pub fn validate(&self) -> Result<(), CacheError> {
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(CacheError::invalid_request(format!(
                "temperature must be a finite value > 0, got {}",
                self.temperature
            )));
        }
        if self.batch_size == 0 {
            return Err(CacheError::invalid_request("batch_size must be greater than 0"));
        }
        if self.start_text.is_empty() {
            return Err(CacheError::invalid_request("start_text must not be empty"));
        }

        let max_length = self.termination.iter().find_map(|c| match c {
            TerminationCriterion::MaxTokenLength { maximum } => Some(*maximum),
            _ => None,
        });
        match max_length {
            None => Err(CacheError::invalid_request(
                "termination must include a max_token_length criterion",
            )),
            Some(0) => Err(CacheError::invalid_request("max_token_length must be greater than 0")),
            Some(_) => Ok(()),
        }
    }
}

// ─── Sample ───────────────────────────────────────────────────────────────────
/// One generated output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Position inside its partition, starting at 0.
    pub ordinal:                   usize,
    /// Checkpoint the sample was generated from.
    pub epoch:                     usize,
    pub text:                      String,
    pub num_tokens:                usize,
    /// Time spent generating the batch this sample belongs to.
    pub sample_time_ms:            u64,
    pub sample_start_epoch_ms_utc: u64,
}
