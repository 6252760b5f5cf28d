// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All workflow logic is delegated to Layer 2 (application).
//
// Four commands are supported:
//   1. `hash`   — prints the cache identity of a config
//   2. `train`  — trains (or resumes) the entry for a config
//   3. `sample` — prints generated or cached samples
//   4. `report` — read-only summary of cache entries
//
// Ctrl-C raises the cancellation flag of the run; training and
// sampling stop at the next epoch or batch boundary.
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{Commands, HashArgs, ReportArgs, SampleArgs, TrainArgs};
use std::sync::atomic::Ordering;

use crate::domain::{config::ModelConfig, context::RuntimeContext, sample::SampleRequest};
use crate::infra::identity::{identity, Identity};

#[derive(Parser, Debug)]
#[command(
    name = "synthgen",
    version = "0.1.0",
    about = "Train generative code models into a content-addressed cache, then sample from them."
)]
pub struct Cli {
    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Hash(args)   => run_hash(args),
            Commands::Train(args)  => run_train(args),
            Commands::Sample(args) => run_sample(args),
            Commands::Report(args) => run_report(args),
        }
    }
}

/// Context seeded from the config, cancelled by Ctrl-C.
fn runtime_context(config: &ModelConfig) -> Result<RuntimeContext> {
    let ctx = RuntimeContext::new(config.training.seed);
    let flag = ctx.cancellation_flag();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        eprintln!("\nInterrupted, stopping after the current step...");
    })
    .context("Cannot install Ctrl-C handler")?;
    Ok(ctx)
}

fn run_hash(args: HashArgs) -> Result<()> {
    let config = ModelConfig::from_path(&args.config)?;
    println!("{}", identity(&config)?);
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = ModelConfig::from_path(&args.entry.config)?;
    let mut ctx = runtime_context(&config)?;

    let outcome = TrainUseCase::new(&args.entry.cache_dir, config).execute(&mut ctx, args.epochs)?;

    match outcome.latest_epoch {
        _ if outcome.interrupted => println!(
            "Training interrupted after {} new epochs. Run again to resume.",
            outcome.trained_epochs
        ),
        Some(latest) if outcome.trained_epochs == 0 => {
            println!("Already trained (latest checkpoint: epoch {}).", latest)
        }
        Some(latest) => println!(
            "Training complete. {} new epochs, latest checkpoint: epoch {} (loss {:.4}).",
            outcome.trained_epochs,
            latest,
            outcome.last_loss.unwrap_or(f64::NAN)
        ),
        None => println!("No checkpoint written."),
    }
    Ok(())
}

fn run_sample(args: SampleArgs) -> Result<()> {
    use crate::application::sample_use_case::SampleUseCase;

    let config = ModelConfig::from_path(&args.entry.config)?;
    let request = SampleRequest::from(&args);
    let mut ctx = runtime_context(&config)?;

    let samples = SampleUseCase::new(&args.entry.cache_dir, config).execute(
        &mut ctx,
        &request,
        args.min_count,
        args.max_count,
    )?;

    for sample in &samples {
        println!(
            "\n── sample {} (epoch {}, {} symbols, {} ms) ──",
            sample.ordinal, sample.epoch, sample.num_tokens, sample.sample_time_ms
        );
        println!("{}", sample.text);
    }
    Ok(())
}

fn run_report(args: ReportArgs) -> Result<()> {
    use crate::application::report_use_case::{CacheReport, ReportUseCase};

    let use_case = ReportUseCase::new(&args.cache_dir);
    let report: CacheReport = match (&args.identity, &args.config) {
        (Some(hex), _) => {
            let id = Identity::parse(hex)
                .with_context(|| format!("'{hex}' is not a 64-character lowercase hex identity"))?;
            CacheReport { entries: vec![use_case.entry(&id)?], corrupt: Vec::new() }
        }
        (None, Some(path)) => {
            let config = ModelConfig::from_path(path)?;
            CacheReport { entries: vec![use_case.entry(&identity(&config)?)?], corrupt: Vec::new() }
        }
        (None, None) => use_case.all()?,
    };

    if report.is_empty() {
        println!("No cache entries under '{}'.", args.cache_dir.display());
    }
    for entry in &report.entries {
        print_report(entry);
    }
    for entry in &report.corrupt {
        println!("\nEntry {} is corrupt: {}", entry.identity, entry.reason);
    }
    Ok(())
}

fn print_report(report: &crate::application::report_use_case::EntryReport) {
    println!("\nEntry {}", report.identity);
    println!(
        "  model:       {} | corpus: {}",
        report.config.architecture.family(),
        report.config.corpus.path
    );
    println!(
        "  checkpoints: {} (latest: {}) | trained: {}",
        report.checkpoints.len(),
        report
            .latest_checkpoint()
            .map_or_else(|| "-".to_string(), |e| e.to_string()),
        report.is_trained
    );
    for r in &report.telemetry {
        println!(
            "  epoch {:>3} | step={:>6} | loss={:.4} | lr={:.4} | {} ms{}",
            r.epoch,
            r.step,
            r.loss,
            r.learning_rate,
            r.epoch_wall_time_ms,
            if r.pending { " | pending" } else { "" }
        );
    }
    println!("  outputs:     {} samples", report.num_outputs());
    for p in &report.partitions {
        println!("    {} @ epoch {}: {} samples", p.request_hash, p.epoch, p.num_outputs);
    }
}
