// ============================================================
// Layer 6 — Identity Hasher
// ============================================================
// Turns a ModelConfig into the name of its cache entry.
//
//   1. validate the config (invalid configs are never hashed)
//   2. serialise to a serde_json::Value; object keys come out
//      sorted, so field order in the source file is irrelevant
//   3. delete the NON_SEMANTIC_FIELDS
//   4. SHA-256 over the compact JSON bytes, hex encoded
//
// Floats are written by serde_json's shortest round-trip
// formatter, so one f64 value always has one spelling. Non-finite
// floats cannot reach this point: validation rejects them.
//
// The result depends on the config alone, never on the host.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::config::{ModelConfig, NON_SEMANTIC_FIELDS};

/// Hex SHA-256 digest naming one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(String);

impl Identity {
    pub const HEX_LEN: usize = 64;

    /// Accepts only a well-formed lowercase hex digest.
    pub fn parse(hex: &str) -> Option<Self> {
        let ok = hex.len() == Self::HEX_LEN
            && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        ok.then(|| Self(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the semantic part of `config`.
pub fn identity(config: &ModelConfig) -> Result<Identity> {
    config.validate()?;
    let mut value = serde_json::to_value(config).context("Cannot serialise model config")?;
    for pointer in NON_SEMANTIC_FIELDS {
        remove_pointer(&mut value, pointer);
    }
    Ok(Identity(hash_value(&value)?))
}

/// Hex SHA-256 of any serialisable value, canonicalised the same way.
/// Used for secondary keys such as a sample request.
pub fn digest_of<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value).context("Cannot serialise value for hashing")?;
    hash_value(&value)
}

fn hash_value(value: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(value).context("Cannot serialise canonical JSON")?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn remove_pointer(value: &mut Value, pointer: &str) {
    let Some((parent, key)) = pointer.rsplit_once('/') else {
        return;
    };
    let parent = if parent.is_empty() {
        Some(value)
    } else {
        value.pointer_mut(parent)
    };
    if let Some(Value::Object(map)) = parent {
        map.remove(key);
    }
}
