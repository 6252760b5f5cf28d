// ============================================================
// Layer 4 — Sequence Batcher
// ============================================================
// Cuts the encoded corpus into training windows and groups them
// into batches.
//
// Window i covers tokens [i*L, i*L + L] (inclusive), i.e. L inputs
// plus the target of the last input, so consecutive windows share
// one token and every transition in the corpus is seen once:
//
//   L = 3, corpus = a b c d e f g
//   windows: [a b c d] [d e f g]
//
// A trailing window with fewer than two tokens carries no
// transition and is dropped. A corpus shorter than L becomes a
// single window.
//
// With shuffling enabled the window order is permuted with the
// caller's RNG (Fisher-Yates via rand::seq::SliceRandom).

use rand::{seq::SliceRandom, Rng};

pub struct SequenceBatcher {
    sequence_length: usize,
    batch_size:      usize,
}

impl SequenceBatcher {
    pub fn new(sequence_length: usize, batch_size: usize) -> Self {
        Self {
            sequence_length: sequence_length.max(1),
            batch_size:      batch_size.max(1),
        }
    }

    pub fn windows<'a>(&self, encoded: &'a [u32]) -> Vec<&'a [u32]> {
        let step = self.sequence_length;
        (0..encoded.len())
            .step_by(step)
            .map(|start| &encoded[start..(start + step + 1).min(encoded.len())])
            .filter(|w| w.len() >= 2)
            .collect()
    }

    /// All batches for one epoch. Only the last batch may be short.
    pub fn batches<'a, R: Rng>(
        &self,
        encoded: &'a [u32],
        shuffle: bool,
        rng:     &mut R,
    ) -> Vec<Vec<&'a [u32]>> {
        let mut windows = self.windows(encoded);
        if shuffle {
            windows.shuffle(rng);
        }
        windows
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}
