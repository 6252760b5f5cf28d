// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From files on disk to token windows:
//
//   corpus path
//       │
//       ▼
//   ContentFileLoader → reads files (recursive, sorted)
//       │
//       ▼
//   Preprocessor      → strips comments / whitespace per file
//       │
//       ▼
//   Atomizer          → characters to token ids
//       │
//       ▼
//   Corpus            → one encoded stream (CorpusReader)
//       │
//       ▼
//   SequenceBatcher   → windows grouped into batches per epoch

pub mod atomizer;
pub mod batcher;
pub mod corpus;
pub mod loader;
pub mod preprocessor;
