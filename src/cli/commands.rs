// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the subcommands `hash`, `train`, `sample` and `report`
// and all their configurable flags.
//
// Model settings live in the config file (JSON or TOML); flags
// only pick the file, the cache root and per-run overrides.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::domain::sample::{SampleRequest, TerminationCriterion};

/// The top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the identity (cache key) of a config
    Hash(HashArgs),

    /// Train the entry for a config up to an epoch count
    Train(TrainArgs),

    /// Generate samples (or fetch cached ones) from a trained entry
    Sample(SampleArgs),

    /// Show what the cache holds, without changing it
    Report(ReportArgs),
}

/// Where to find the config and the cache
#[derive(Args, Debug)]
pub struct EntryArgs {
    /// Model config file (.json or .toml)
    #[arg(long)]
    pub config: PathBuf,

    /// Root directory of the artifact cache
    #[arg(long, default_value = "cache")]
    pub cache_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct HashArgs {
    /// Model config file (.json or .toml)
    #[arg(long)]
    pub config: PathBuf,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub entry: EntryArgs,

    /// Train to this many epochs instead of training.num_epochs.
    /// Does not change the entry being trained.
    #[arg(long)]
    pub epochs: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SampleArgs {
    #[command(flatten)]
    pub entry: EntryArgs,

    /// Every sample starts with this text
    #[arg(long)]
    pub start_text: String,

    /// Softmax temperature — lower is more conservative
    #[arg(long, default_value_t = 1.0)]
    pub temperature: f64,

    /// Samples generated together per batch
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Stop a sample once it holds this many symbols (start text included)
    #[arg(long, default_value_t = 512)]
    pub max_length: usize,

    /// Also stop once every `--depth-open` symbol is closed again
    #[arg(long, requires = "depth_close")]
    pub depth_open: Option<String>,

    #[arg(long, requires = "depth_open")]
    pub depth_close: Option<String>,

    /// Fix the random draws; omitted means a different result per run
    #[arg(long)]
    pub seed: Option<u64>,

    /// Return at least this many samples (rounded up to whole batches
    /// when new ones are generated)
    #[arg(long, default_value_t = 1)]
    pub min_count: usize,

    /// Return at most this many samples
    #[arg(long)]
    pub max_count: Option<usize>,
}

/// Convert sampling flags into the domain request.
/// The application layer never sees clap types.
impl From<&SampleArgs> for SampleRequest {
    fn from(a: &SampleArgs) -> Self {
        let mut termination = vec![TerminationCriterion::MaxTokenLength {
            maximum: a.max_length,
        }];
        if let (Some(open), Some(close)) = (&a.depth_open, &a.depth_close) {
            termination.push(TerminationCriterion::SymmetricalTokenDepth {
                open:  open.clone(),
                close: close.clone(),
            });
        }
        SampleRequest {
            start_text: a.start_text.clone(),
            temperature: a.temperature,
            batch_size: a.batch_size,
            termination,
            seed: a.seed,
        }
    }
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Root directory of the artifact cache
    #[arg(long, default_value = "cache")]
    pub cache_dir: PathBuf,

    /// Only this entry (a 64-character identity)
    #[arg(long, conflicts_with = "config")]
    pub identity: Option<String>,

    /// Only the entry for this config file
    #[arg(long)]
    pub config: Option<PathBuf>,
}
