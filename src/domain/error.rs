// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Typed failures that callers may want to tell apart.
//
// Everything in this crate returns anyhow::Result. The variants
// below are raised *inside* an anyhow::Error so a caller can
// recover the kind with `err.downcast_ref::<CacheError>()`.
//
//   InvalidConfig  — a ModelConfig failed structural validation.
//                    Raised before any cache I/O happens.
//   InvalidRequest — a sampling request (or train call) is malformed.
//   Corrupt        — an existing cache entry does not look like
//                    one this crate created. Never auto-repaired.
//   Cancelled      — work stopped because the run's cancellation
//                    flag was raised.
//
// Failures of the trainable model and plain I/O errors are not
// listed here: they flow through anyhow with added context.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid model config: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("corrupt cache entry '{}': {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("cancelled during epoch {epoch}")]
    Cancelled { epoch: usize },
}

impl CacheError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path:   path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    #[cfg(test)]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }

    /// True if `err` is, or wraps, a `Cancelled` error.
    pub fn is_cancellation(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<Self>(), Some(Self::Cancelled { .. }))
    }
}
