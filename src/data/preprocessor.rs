// ============================================================
// Layer 4 — Content File Preprocessor
// ============================================================
// Cleans each source file before it joins the corpus. The steps
// come from CorpusConfig::preprocessors and run in that order:
//
//   normalize_line_endings    — \r\n and \r become \n
//   strip_comments            — C-family // and /* */ comments each
//                               become a single space; string and
//                               char literals are left alone
//   strip_trailing_whitespace — per line
//   collapse_blank_lines      — at most one empty line in a row
//
// Every step is a pure &str -> String function, so the same
// corpus and the same step list always yield the same text.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::domain::config::PreprocessorKind;

// Comments and literals are matched by one alternation so that a
// "//" inside a string literal is consumed as part of the literal.
static COMMENT_OR_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)//.*?$|/\*[\s\S]*?\*/|'(?:\\.|[^\\'])*'|"(?:\\.|[^\\"])*""#)
        .expect("comment pattern is valid")
});

pub struct Preprocessor {
    steps: Vec<PreprocessorKind>,
}

impl Preprocessor {
    pub fn new(steps: &[PreprocessorKind]) -> Self {
        Self { steps: steps.to_vec() }
    }

    /// Run every configured step over one content file.
    pub fn apply(&self, text: &str) -> String {
        self.steps
            .iter()
            .fold(text.to_string(), |acc, step| apply_step(*step, &acc))
    }
}

fn apply_step(step: PreprocessorKind, text: &str) -> String {
    match step {
        PreprocessorKind::NormalizeLineEndings    => normalize_line_endings(text),
        PreprocessorKind::StripComments           => strip_comments(text),
        PreprocessorKind::StripTrailingWhitespace => strip_trailing_whitespace(text),
        PreprocessorKind::CollapseBlankLines      => collapse_blank_lines(text),
    }
}

pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

pub fn strip_comments(text: &str) -> String {
    COMMENT_OR_LITERAL
        .replace_all(text, |caps: &Captures| {
            let matched = &caps[0];
            if matched.starts_with('/') {
                " ".to_string()
            } else {
                matched.to_string()
            }
        })
        .into_owned()
}

pub fn strip_trailing_whitespace(text: &str) -> String {
    text.split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn collapse_blank_lines(text: &str) -> String {
    let mut result        = String::with_capacity(text.len());
    let mut newline_count = 0usize;

    for c in text.chars() {
        if c == '\n' {
            newline_count += 1;
            if newline_count <= 2 {
                result.push(c);
            }
        } else {
            newline_count = 0;
            result.push(c);
        }
    }
    result
}
