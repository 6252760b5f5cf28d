// ============================================================
// Layer 3 — Content File
// ============================================================
// One source file of the corpus, after it has been read from disk.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentFile {
    /// Path relative to the corpus root, kept for traceability.
    pub source: String,
    pub text:   String,
}

impl ContentFile {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text:   text.into(),
        }
    }
}
