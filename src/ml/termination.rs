// ============================================================
// Layer 5 — Termination
// ============================================================
// Turns the TerminationCriterion list of a SampleRequest into a
// CompletionPredicate over token ids.
//
// Criteria are resolved against the corpus vocabulary once, up
// front, so a brace that the corpus never contained is reported
// as a request error instead of silently never matching.
//
//   MaxTokenLength        — sequence.len() >= maximum
//   SymmetricalTokenDepth — depth = #open − #close over the whole
//                           sequence; complete when depth < 0, or
//                           depth == 0 after at least one open

use anyhow::Result;

use crate::data::atomizer::Atomizer;
use crate::domain::{
    error::CacheError,
    sample::TerminationCriterion,
    traits::CompletionPredicate,
};

#[derive(Debug, Clone, PartialEq)]
enum Rule {
    MaxLength(usize),
    Depth { open: u32, close: u32 },
}

/// A request's termination criteria, bound to one vocabulary.
#[derive(Debug, Clone)]
pub struct Termination {
    rules: Vec<Rule>,
}

impl Termination {
    pub fn specialize(criteria: &[TerminationCriterion], atomizer: &Atomizer) -> Result<Self> {
        let mut rules = Vec::with_capacity(criteria.len());
        for criterion in criteria {
            let rule = match criterion {
                TerminationCriterion::MaxTokenLength { maximum } => Rule::MaxLength(*maximum),
                TerminationCriterion::SymmetricalTokenDepth { open, close } => {
                    if open == close {
                        return Err(CacheError::invalid_request(format!(
                            "depth criterion needs distinct open and close symbols, got '{open}' twice"
                        ))
                        .into());
                    }
                    Rule::Depth {
                        open:  atomizer.encode_symbol(open)?,
                        close: atomizer.encode_symbol(close)?,
                    }
                }
            };
            rules.push(rule);
        }
        Ok(Self { rules })
    }
}

fn depth_complete(sequence: &[u32], open: u32, close: u32) -> bool {
    let mut depth = 0i64;
    let mut opened = false;
    for &token in sequence {
        if token == open {
            depth += 1;
            opened = true;
        } else if token == close {
            depth -= 1;
        }
    }
    depth < 0 || (opened && depth == 0)
}

impl CompletionPredicate for Termination {
    fn is_complete(&self, sequence: &[u32]) -> bool {
        self.rules.iter().any(|rule| match rule {
            Rule::MaxLength(maximum) => sequence.len() >= *maximum,
            Rule::Depth { open, close } => depth_complete(sequence, *open, *close),
        })
    }
}
