// ============================================================
// Layer 5 — Training Orchestrator
// ============================================================
// Drives any Trainable to a target epoch count, one checkpoint
// per epoch, resuming from whatever the ledger already holds:
//
//   latest = None      → initialise, train epochs 0..total
//   latest = Some(k)   → restore k, train epochs k+1..total
//   k >= total - 1     → nothing to do
//
// Per epoch:
//   ctx.begin_epoch(e) → advance_one_increment → telemetry row
//   (pending) → publish checkpoint e (temp + fsync + rename) →
//   telemetry row (confirmed)
//
// A failure inside epoch e publishes nothing for e, so e-1 stays
// the latest checkpoint and the next call resumes from there.
// Every call first gives each published checkpoint a confirmed
// telemetry row, which repairs a crash between publish and the
// confirming row. An entry with nothing to repair or train is
// left byte-for-byte unchanged.
//
// The cancellation flag is checked between epochs; an interrupted
// run still leaves every published epoch complete.

use anyhow::{Context, Result};
use std::{
    collections::BTreeMap,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use crate::domain::{
    context::RuntimeContext,
    error::CacheError,
    telemetry::TelemetryRecord,
    traits::{CorpusReader, Trainable},
};
use crate::infra::cache::CacheHandle;

/// What a `train` call did.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainOutcome {
    /// Newest checkpoint after the call.
    pub latest_epoch:   Option<usize>,
    /// Epochs trained by this call.
    pub trained_epochs: usize,
    /// Stopped early because the cancellation flag was raised.
    pub interrupted:    bool,
    pub last_loss:      Option<f64>,
}

pub(crate) fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub fn train<M: Trainable>(
    handle:       &CacheHandle,
    model:        &M,
    corpus:       &dyn CorpusReader,
    ctx:          &mut RuntimeContext,
    total_epochs: usize,
) -> Result<TrainOutcome> {
    if total_epochs == 0 {
        return Err(CacheError::InvalidConfig(vec![
            "number of epochs to train must be greater than 0".to_string(),
        ])
        .into());
    }

    let ledger = handle.checkpoints();
    let telemetry = handle.telemetry();
    let checkpoints = ledger.list()?;
    let latest = checkpoints.last().copied();
    let mut step = confirm_published_epochs(handle, &checkpoints)?;

    if latest.is_some_and(|k| k + 1 >= total_epochs) {
        tracing::info!(
            "Entry {} already trained to epoch {} (target {}), nothing to do",
            handle.identity(),
            latest.unwrap_or_default(),
            total_epochs
        );
        return Ok(TrainOutcome {
            latest_epoch:   latest,
            trained_epochs: 0,
            interrupted:    false,
            last_loss:      None,
        });
    }

    // ── Resume point ──────────────────────────────────────────────────────────
    let (mut state, first_epoch) = match latest {
        Some(k) => {
            tracing::info!("Resuming {} from checkpoint {}", handle.identity(), k);
            let state = model
                .restore(&ledger.path(k))
                .with_context(|| format!("Cannot restore checkpoint {k} of {}", handle.identity()))?;
            (state, k + 1)
        }
        None => {
            tracing::info!("Training {} from scratch", handle.identity());
            (model.initialize_state(ctx)?, 0)
        }
    };

    let mut outcome = TrainOutcome {
        latest_epoch:   latest,
        trained_epochs: 0,
        interrupted:    false,
        last_loss:      None,
    };

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in first_epoch..total_epochs {
        if ctx.is_cancelled() {
            outcome.interrupted = true;
            break;
        }

        let started = Instant::now();
        ctx.begin_epoch(epoch);

        let increment = match model.advance_one_increment(state, corpus, ctx) {
            Ok(increment) => increment,
            Err(e) if CacheError::is_cancellation(&e) => {
                outcome.interrupted = true;
                break;
            }
            Err(e) => return Err(e.context(format!("Training failed during epoch {epoch}"))),
        };
        let wall_ms = started.elapsed().as_millis() as u64;
        step += increment.steps;

        let mut record = TelemetryRecord {
            timestamp_unix_ms:  now_unix_ms(),
            epoch,
            step,
            learning_rate:      increment.learning_rate,
            loss:               increment.loss,
            epoch_wall_time_ms: wall_ms,
            pending:            true,
        };
        telemetry.append(&record)?;
        ledger.publish(epoch, |path| model.persist(&increment.state, path))?;
        record.pending = false;
        telemetry.append(&record)?;

        println!(
            "Epoch {:>3}/{} | loss={:.4} | lr={:.4} | steps={} | {} ms",
            epoch + 1,
            total_epochs,
            increment.loss,
            increment.learning_rate,
            increment.steps,
            wall_ms,
        );

        outcome.latest_epoch = Some(epoch);
        outcome.trained_epochs += 1;
        outcome.last_loss = Some(increment.loss);
        state = increment.state;
    }

    if outcome.interrupted {
        tracing::warn!(
            "Training of {} interrupted, latest checkpoint {:?}",
            handle.identity(),
            outcome.latest_epoch
        );
    } else {
        tracing::info!("Training complete: {} epochs", total_epochs);
    }
    Ok(outcome)
}

/// Append a confirmed telemetry row for every checkpoint whose newest
/// row is pending or missing. Returns the cumulative step count at the
/// latest checkpoint.
///
/// A pending row already holds the epoch's numbers and is confirmed
/// as-is. A missing row is rebuilt from what the config knows: the
/// epoch's learning rate, no new steps and an unknown (NaN) loss.
fn confirm_published_epochs(handle: &CacheHandle, checkpoints: &[usize]) -> Result<u64> {
    let telemetry = handle.telemetry();
    let rows: BTreeMap<usize, TelemetryRecord> = telemetry
        .by_epoch()?
        .into_iter()
        .map(|r| (r.epoch, r))
        .collect();

    let mut step = 0u64;
    for &epoch in checkpoints {
        match rows.get(&epoch) {
            Some(row) if !row.pending => step = row.step,
            Some(row) => {
                tracing::warn!("Confirming telemetry of published epoch {}", epoch);
                telemetry.append(&TelemetryRecord { pending: false, ..row.clone() })?;
                step = row.step;
            }
            None => {
                tracing::warn!("Epoch {} has a checkpoint but no telemetry, rebuilding its row", epoch);
                telemetry.append(&TelemetryRecord {
                    timestamp_unix_ms:  now_unix_ms(),
                    epoch,
                    step,
                    learning_rate:      handle.config().training.learning_rate_at(epoch),
                    loss:               f64::NAN,
                    epoch_wall_time_ms: 0,
                    pending:            false,
                })?;
            }
        }
    }
    Ok(step)
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::corpus::{tests::write_abc_corpus, Corpus};
    use crate::domain::config::tests::abc_config;
    use crate::domain::traits::Increment;
    use crate::infra::cache::ArtifactCache;
    use crate::ml::model::NgramModel;
    use sha2::{Digest, Sha256};
    use std::{fs, path::Path};

    /// Counts epochs. Can fail at one epoch, or raise the cancellation
    /// flag at one (stopping with a cancellation error unless it also
    /// fails there).
    pub(crate) struct CountingModel {
        pub fail_at:   Option<usize>,
        pub cancel_at: Option<usize>,
    }

    impl CountingModel {
        pub(crate) fn healthy() -> Self {
            Self { fail_at: None, cancel_at: None }
        }
    }

    impl Trainable for CountingModel {
        type State = u64;

        fn initialize_state(&self, _ctx: &mut RuntimeContext) -> Result<u64> {
            Ok(0)
        }

        fn advance_one_increment(
            &self,
            state:   u64,
            _corpus: &dyn CorpusReader,
            ctx:     &mut RuntimeContext,
        ) -> Result<Increment<u64>> {
            if self.cancel_at == Some(ctx.epoch()) {
                ctx.cancel();
            }
            if self.fail_at == Some(ctx.epoch()) {
                anyhow::bail!("simulated failure");
            }
            if ctx.is_cancelled() {
                return Err(CacheError::Cancelled { epoch: ctx.epoch() }.into());
            }
            Ok(Increment { state: state + 1, loss: 1.0, steps: 3, learning_rate: 0.5 })
        }

        fn persist(&self, state: &u64, path: &Path) -> Result<()> {
            Ok(fs::write(path, state.to_string())?)
        }

        fn restore(&self, path: &Path) -> Result<u64> {
            Ok(fs::read_to_string(path)?.trim().parse()?)
        }

        fn predict(&self, _state: &u64, batch: &[&[u32]]) -> Result<Vec<Vec<f64>>> {
            Ok(batch.iter().map(|_| vec![0.0; 2]).collect())
        }
    }

    /// SHA-256 of every file under the entry (META, checkpoints, logs).
    fn snapshot(dir: &Path) -> Vec<(String, String)> {
        let mut files = Vec::new();
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            for entry in fs::read_dir(&current).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    let digest = hex::encode(Sha256::digest(fs::read(&path).unwrap()));
                    let name = path.strip_prefix(dir).unwrap().to_string_lossy().into_owned();
                    files.push((name, digest));
                }
            }
        }
        files.sort();
        files
    }

    fn tiny_corpus() -> Corpus {
        Corpus::from_texts(&["ab".to_string()], "\n").unwrap()
    }

    fn ngram_setup(dir: &Path) -> (CacheHandle, Corpus, NgramModel) {
        let cfg = abc_config(&write_abc_corpus(dir));
        let handle = ArtifactCache::new(dir.join("cache")).open(&cfg).unwrap();
        let corpus = Corpus::load(&cfg.corpus).unwrap();
        let model = NgramModel::from_config(&cfg, corpus.vocab_size()).unwrap();
        (handle, corpus, model)
    }

    #[test]
    fn test_zero_epochs_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ArtifactCache::new(dir.path()).open(&abc_config("c")).unwrap();
        let err = train(&handle, &CountingModel::healthy(), &tiny_corpus(), &mut RuntimeContext::new(0), 0)
            .unwrap_err();
        assert!(err.downcast_ref::<CacheError>().is_some_and(|e| e.is_config_error()));
    }

    #[test]
    fn test_train_writes_one_checkpoint_and_row_per_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ArtifactCache::new(dir.path()).open(&abc_config("c")).unwrap();
        let model = CountingModel::healthy();

        let outcome = train(&handle, &model, &tiny_corpus(), &mut RuntimeContext::new(0), 3).unwrap();
        assert_eq!(outcome.trained_epochs, 3);
        assert_eq!(outcome.latest_epoch, Some(2));
        assert_eq!(handle.checkpoints().list().unwrap(), vec![0, 1, 2]);

        let rows = handle.training_telemetry().unwrap();
        assert_eq!(rows.iter().map(|r| r.epoch).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(rows.iter().map(|r| r.step).collect::<Vec<_>>(), vec![3, 6, 9]);
        assert!(rows.iter().all(|r| !r.pending));
    }

    #[test]
    fn test_second_call_changes_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ArtifactCache::new(dir.path()).open(&abc_config("c")).unwrap();
        let model = CountingModel::healthy();
        train(&handle, &model, &tiny_corpus(), &mut RuntimeContext::new(0), 2).unwrap();
        let before = snapshot(handle.path());
        assert!(before.iter().any(|(name, _)| name.ends_with("META")));
        assert!(before.iter().any(|(name, _)| name.ends_with("telemetry.csv")));
        assert_eq!(before.iter().filter(|(name, _)| name.starts_with("checkpoints")).count(), 2);

        let again = train(&handle, &model, &tiny_corpus(), &mut RuntimeContext::new(0), 2).unwrap();
        assert_eq!(again.trained_epochs, 0);
        assert_eq!(snapshot(handle.path()), before);

        // fewer epochs than already trained: still nothing to do
        let fewer = train(&handle, &model, &tiny_corpus(), &mut RuntimeContext::new(0), 1).unwrap();
        assert_eq!(fewer.trained_epochs, 0);
        assert_eq!(fewer.latest_epoch, Some(1));
        assert_eq!(snapshot(handle.path()), before);
    }

    #[test]
    fn test_unconfirmed_epoch_is_confirmed_on_next_call() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ArtifactCache::new(dir.path()).open(&abc_config("c")).unwrap();
        let model = CountingModel::healthy();
        train(&handle, &model, &tiny_corpus(), &mut RuntimeContext::new(0), 2).unwrap();

        // crash after publishing epoch 1, before its confirming row
        let csv = handle.telemetry_path();
        let text = fs::read_to_string(&csv).unwrap();
        let kept: Vec<&str> = text.lines().collect();
        fs::write(&csv, format!("{}\n", kept[..kept.len() - 1].join("\n"))).unwrap();
        assert!(handle.training_telemetry().unwrap()[1].pending);

        train(&handle, &model, &tiny_corpus(), &mut RuntimeContext::new(0), 3).unwrap();
        let rows = handle.training_telemetry().unwrap();
        assert_eq!(rows.iter().map(|r| r.epoch).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(rows.iter().all(|r| !r.pending));
        assert_eq!(rows.iter().map(|r| r.step).collect::<Vec<_>>(), vec![3, 6, 9]);
    }

    #[test]
    fn test_missing_row_is_rebuilt_for_published_epoch() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ArtifactCache::new(dir.path()).open(&abc_config("c")).unwrap();
        let model = CountingModel::healthy();
        train(&handle, &model, &tiny_corpus(), &mut RuntimeContext::new(0), 2).unwrap();

        // drop both rows of epoch 1
        let csv = handle.telemetry_path();
        let text = fs::read_to_string(&csv).unwrap();
        let kept: Vec<&str> = text.lines().filter(|l| l.split(',').nth(1) != Some("1")).collect();
        fs::write(&csv, format!("{}\n", kept.join("\n"))).unwrap();

        train(&handle, &model, &tiny_corpus(), &mut RuntimeContext::new(0), 3).unwrap();
        let rows = handle.training_telemetry().unwrap();
        assert_eq!(handle.checkpoints().list().unwrap(), vec![0, 1, 2]);
        assert_eq!(rows.iter().map(|r| r.epoch).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert!(rows.iter().all(|r| !r.pending));
        assert!(rows[1].loss.is_nan());
        assert_eq!(rows[2].step, 6);
    }

    #[test]
    fn test_failure_keeps_previous_epoch_latest() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ArtifactCache::new(dir.path()).open(&abc_config("c")).unwrap();

        let failing = CountingModel { fail_at: Some(2), cancel_at: None };
        let err = train(&handle, &failing, &tiny_corpus(), &mut RuntimeContext::new(0), 4).unwrap_err();
        assert!(format!("{err:#}").contains("epoch 2"));
        assert_eq!(handle.checkpoints().latest().unwrap(), Some(1));
        assert_eq!(handle.training_telemetry().unwrap().len(), 2);

        // a healthy model resumes from epoch 1's state
        let healthy = CountingModel::healthy();
        let outcome = train(&handle, &healthy, &tiny_corpus(), &mut RuntimeContext::new(0), 4).unwrap();
        assert_eq!(outcome.trained_epochs, 2);
        assert_eq!(fs::read_to_string(handle.checkpoints().path(3)).unwrap(), "4");
        assert_eq!(handle.training_telemetry().unwrap().last().unwrap().step, 12);
    }

    #[test]
    fn test_cancelled_before_start_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ArtifactCache::new(dir.path()).open(&abc_config("c")).unwrap();
        let mut ctx = RuntimeContext::new(0);
        ctx.cancel();

        let outcome = train(&handle, &CountingModel::healthy(), &tiny_corpus(), &mut ctx, 3).unwrap();
        assert!(outcome.interrupted);
        assert_eq!(outcome.latest_epoch, None);
        assert_eq!(handle.checkpoints().latest().unwrap(), None);
    }

    #[test]
    fn test_cancellation_error_interrupts() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ArtifactCache::new(dir.path()).open(&abc_config("c")).unwrap();
        let model = CountingModel { fail_at: None, cancel_at: Some(1) };

        let outcome = train(&handle, &model, &tiny_corpus(), &mut RuntimeContext::new(0), 3).unwrap();
        assert!(outcome.interrupted);
        assert_eq!(outcome.latest_epoch, Some(0));
        assert_eq!(handle.checkpoints().list().unwrap(), vec![0]);
    }

    #[test]
    fn test_model_error_not_hidden_by_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ArtifactCache::new(dir.path()).open(&abc_config("c")).unwrap();
        let model = CountingModel { fail_at: Some(1), cancel_at: Some(1) };

        let err = train(&handle, &model, &tiny_corpus(), &mut RuntimeContext::new(0), 3).unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("epoch 1"));
        assert!(message.contains("simulated failure"));
        assert_eq!(handle.checkpoints().latest().unwrap(), Some(0));
    }

    #[test]
    fn test_retraining_reproduces_checkpoint_bytes() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        let (ha, ca, ma) = ngram_setup(a.path());
        let (hb, cb, mb) = ngram_setup(b.path());

        train(&ha, &ma, &ca, &mut RuntimeContext::new(42), 2).unwrap();
        train(&hb, &mb, &cb, &mut RuntimeContext::new(42), 2).unwrap();
        for epoch in 0..2 {
            assert_eq!(
                fs::read(ha.checkpoints().path(epoch)).unwrap(),
                fs::read(hb.checkpoints().path(epoch)).unwrap()
            );
        }
    }

    #[test]
    fn test_resumed_training_matches_straight_run() {
        let straight = tempfile::tempdir().unwrap();
        let resumed = tempfile::tempdir().unwrap();
        let (hs, cs, ms) = ngram_setup(straight.path());
        let (hr, cr, mr) = ngram_setup(resumed.path());

        train(&hs, &ms, &cs, &mut RuntimeContext::new(42), 5).unwrap();
        train(&hr, &mr, &cr, &mut RuntimeContext::new(42), 2).unwrap();
        let outcome = train(&hr, &mr, &cr, &mut RuntimeContext::new(42), 5).unwrap();

        assert_eq!(outcome.trained_epochs, 3);
        assert_eq!(hr.checkpoints().list().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(
            fs::read(hs.checkpoints().path(4)).unwrap(),
            fs::read(hr.checkpoints().path(4)).unwrap()
        );
    }
}
