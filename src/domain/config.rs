// ============================================================
// Layer 3 — Model Configuration
// ============================================================
// The full description of one trainable artifact:
//
//   corpus        — which content files, and how they are cleaned
//   architecture  — which model family and its hyperparameters
//   training      — how the model is fitted to the corpus
//
// A ModelConfig is plain data. It derives PartialEq so two
// configs compare structurally, and Serialize so the identity
// hasher (infra::identity) can canonicalise it.
//
// Two fields do not change what a checkpoint *means* and are
// excluded from the identity hash:
//   training.num_epochs        — how far to train, not what is trained
//   training.log_every_n_steps — logging cadence only
// They are listed in NON_SEMANTIC_FIELDS so the hasher and the
// docs can't drift apart.
//
// Config files can be JSON or TOML; the extension decides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::domain::error::CacheError;

/// JSON pointers (into the serialised config) of the fields that are
/// ignored when computing an identity.
pub const NON_SEMANTIC_FIELDS: &[&str] = &["/training/num_epochs", "/training/log_every_n_steps"];

// ─── ModelConfig ──────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub corpus:       CorpusConfig,
    pub architecture: ArchitectureConfig,
    #[serde(default)]
    pub training:     TrainingConfig,
}

// ─── CorpusConfig ─────────────────────────────────────────────────────────────
/// Reference to the training corpus: a single file, or a directory
/// whose files are read recursively in sorted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusConfig {
    pub path: String,

    /// Inserted between consecutive content files when they are
    /// concatenated into one token stream.
    #[serde(default = "default_separator")]
    pub contentfile_separator: String,

    /// Applied to every content file, in order.
    #[serde(default)]
    pub preprocessors: Vec<PreprocessorKind>,
}

fn default_separator() -> String {
    "\n\n".to_string()
}

/// The text transformations available to a corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreprocessorKind {
    NormalizeLineEndings,
    StripComments,
    StripTrailingWhitespace,
    CollapseBlankLines,
}

// ─── ArchitectureConfig ───────────────────────────────────────────────────────
/// One variant per model family. The orchestrator never looks inside;
/// only the family's Trainable implementation does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArchitectureConfig {
    /// Back-off n-gram over corpus symbols.
    Ngram {
        /// Number of symbols per n-gram, context included (2 = bigram).
        order:     usize,
        /// Additive smoothing mass given to every symbol.
        smoothing: f64,
    },
}

impl ArchitectureConfig {
    pub fn family(&self) -> &'static str {
        match self {
            Self::Ngram { .. } => "ngram",
        }
    }
}

// ─── TrainingConfig ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Total epochs requested. Non-semantic.
    pub num_epochs:          usize,
    /// Symbols per training window. Signed so a negative value in a
    /// config file surfaces as a validation error, not a parse error.
    pub sequence_length:     i64,
    pub batch_size:          usize,
    pub learning_rate:       f64,
    /// Fraction the learning rate shrinks by after every epoch.
    pub learning_rate_decay: f64,
    pub shuffle_corpus:      bool,
    pub seed:                u64,
    /// Non-semantic.
    pub log_every_n_steps:   usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            num_epochs:          10,
            sequence_length:     64,
            batch_size:          64,
            learning_rate:       1.0,
            learning_rate_decay: 0.05,
            shuffle_corpus:      true,
            seed:                0,
            log_every_n_steps:   100,
        }
    }
}

impl TrainingConfig {
    /// Learning rate in effect during `epoch` (0-based).
    pub fn learning_rate_at(&self, epoch: usize) -> f64 {
        self.learning_rate * (1.0 - self.learning_rate_decay).powi(epoch as i32)
    }

    /// Only meaningful after `ModelConfig::validate` has passed.
    pub fn sequence_length(&self) -> usize {
        self.sequence_length.max(1) as usize
    }
}

impl ModelConfig {
    /// Load a config from a `.json` or `.toml` file and validate it.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config '{}'", path.display()))?;

        let config: ModelConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)
                .with_context(|| format!("Cannot parse JSON config '{}'", path.display()))?,
            Some("toml") | None => toml::from_str(&contents)
                .with_context(|| format!("Cannot parse TOML config '{}'", path.display()))?,
            Some(other) => anyhow::bail!("Unsupported config extension '{other}'"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check every structural constraint and report all violations at once.
    /// Fails with CacheError::InvalidConfig.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.corpus.path.trim().is_empty() {
            errors.push("corpus.path must not be empty".to_string());
        }

        match &self.architecture {
            ArchitectureConfig::Ngram { order, smoothing } => {
                if *order == 0 {
                    errors.push("architecture.order must be greater than 0".to_string());
                }
                if !smoothing.is_finite() || *smoothing <= 0.0 {
                    errors.push("architecture.smoothing must be a finite value > 0".to_string());
                }
            }
        }

        let t = &self.training;
        if t.num_epochs == 0 {
            errors.push("training.num_epochs must be greater than 0".to_string());
        }
        if t.sequence_length < 1 {
            errors.push("training.sequence_length must be greater than 0".to_string());
        }
        if t.batch_size == 0 {
            errors.push("training.batch_size must be greater than 0".to_string());
        }
        if !t.learning_rate.is_finite() || t.learning_rate <= 0.0 {
            errors.push("training.learning_rate must be a finite value > 0".to_string());
        }
        if !(0.0..1.0).contains(&t.learning_rate_decay) {
            errors.push("training.learning_rate_decay must be in [0, 1)".to_string());
        }
        if t.log_every_n_steps == 0 {
            errors.push("training.log_every_n_steps must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CacheError::InvalidConfig(errors).into())
        }
    }

    /// Copy of this config with a different epoch target.
    pub fn with_num_epochs(&self, num_epochs: usize) -> Self {
        let mut config = self.clone();
        config.training.num_epochs = num_epochs;
        config
    }
}
