// ============================================================
// Layer 4 — Corpus
// ============================================================
// Loads, cleans and encodes the content files named by a
// CorpusConfig:
//
//   ContentFileLoader → Preprocessor (per file) → drop empty files
//     → join with contentfile_separator → Atomizer → token ids
//
// The result implements CorpusReader, which is all a Trainable
// gets to see.

use anyhow::{Context, Result};

use crate::data::{atomizer::Atomizer, loader::ContentFileLoader, preprocessor::Preprocessor};
use crate::domain::{config::CorpusConfig, traits::CorpusReader};

pub struct Corpus {
    atomizer:          Atomizer,
    encoded:           Vec<u32>,
    num_content_files: usize,
}

impl Corpus {
    pub fn load(config: &CorpusConfig) -> Result<Self> {
        let files = ContentFileLoader::new(&config.path).load_all()?;
        let preprocessor = Preprocessor::new(&config.preprocessors);

        let mut texts = Vec::with_capacity(files.len());
        for file in &files {
            let text = preprocessor.apply(&file.text);
            if text.trim().is_empty() {
                tracing::debug!("Skipping '{}': empty after preprocessing", file.source);
                continue;
            }
            texts.push(text);
        }

        if texts.is_empty() {
            anyhow::bail!("Corpus '{}' has no content after preprocessing", config.path);
        }

        let corpus = Self::from_texts(&texts, &config.contentfile_separator)
            .with_context(|| format!("Cannot encode corpus '{}'", config.path))?;
        tracing::info!(
            "Corpus ready: {} files, {} tokens, vocab size {}",
            corpus.num_content_files,
            corpus.encoded.len(),
            corpus.atomizer.vocab_size()
        );
        Ok(corpus)
    }

    /// Build a corpus from already-cleaned content files.
    pub fn from_texts(texts: &[String], separator: &str) -> Result<Self> {
        let joined = texts.join(separator);
        let atomizer = Atomizer::from_text(&joined);
        let encoded = atomizer.encode(&joined)?;
        Ok(Self {
            atomizer,
            encoded,
            num_content_files: texts.len(),
        })
    }

    pub fn atomizer(&self) -> &Atomizer {
        &self.atomizer
    }
}

impl CorpusReader for Corpus {
    fn vocab_size(&self) -> usize {
        self.atomizer.vocab_size()
    }

    fn encoded(&self) -> &[u32] {
        &self.encoded
    }
}
