// ============================================================
// Layer 5 — Weighted Choice
// ============================================================
// Picks one index from a score vector:
//
//   p_i = exp(s_i / T) / Σ_j exp(s_j / T)
//   draw i with probability p_i
//
// The maximum scaled score is subtracted before exponentiating so
// large logits cannot overflow. Low T sharpens the distribution
// toward the arg-max, high T flattens it toward uniform.
//
// Reference: rand::distributions::WeightedIndex

use anyhow::Result;
use rand::{distributions::WeightedIndex, prelude::Distribution, Rng};

use crate::domain::error::CacheError;

/// Temperature-scaled softmax, as probabilities summing to 1.
pub fn softmax(scores: &[f64], temperature: f64) -> Result<Vec<f64>> {
    if !temperature.is_finite() || temperature <= 0.0 {
        return Err(CacheError::invalid_request(format!(
            "temperature must be a finite value > 0, got {temperature}"
        ))
        .into());
    }
    if scores.is_empty() {
        return Err(CacheError::invalid_request("cannot choose from an empty score vector").into());
    }
    if scores.iter().any(|s| s.is_nan() || *s == f64::INFINITY) {
        return Err(CacheError::invalid_request("scores must not be NaN or +inf").into());
    }

    let scaled: Vec<f64> = scores.iter().map(|s| s / temperature).collect();
    let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return Err(CacheError::invalid_request("every score is -inf").into());
    }

    let exps: Vec<f64> = scaled.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    Ok(exps.into_iter().map(|e| e / sum).collect())
}

/// Draw one index from `softmax(scores, temperature)`.
/// A single score always yields 0 without consuming randomness.
pub fn choose<R: Rng + ?Sized>(scores: &[f64], temperature: f64, rng: &mut R) -> Result<usize> {
    let probabilities = softmax(scores, temperature)?;
    if probabilities.len() == 1 {
        return Ok(0);
    }
    let dist = WeightedIndex::new(&probabilities)
        .map_err(|e| anyhow::anyhow!("Cannot build weighted distribution: {e}"))?;
    Ok(dist.sample(rng))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_output_in_range() {
        let mut rng = StdRng::seed_from_u64(0);
        let scores = [1.0, 2.0, 3.0, 4.0];
        for _ in 0..1000 {
            let i = choose(&scores, 1.0, &mut rng).unwrap();
            assert!(i < scores.len());
        }
    }

    #[test]
    fn test_single_element_is_zero() {
        let mut rng = StdRng::seed_from_u64(0);
        for t in [0.01, 1.0, 100.0] {
            assert_eq!(choose(&[-3.5], t, &mut rng).unwrap(), 0);
        }
    }

    #[test]
    fn test_temperature_must_be_positive() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(choose(&[1.0, 2.0], 0.0, &mut rng).is_err());
        assert!(choose(&[1.0, 2.0], -1.0, &mut rng).is_err());
        assert!(choose(&[1.0, 2.0], f64::NAN, &mut rng).is_err());
    }

    #[test]
    fn test_empty_scores_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(choose(&[], 1.0, &mut rng).is_err());
    }

    #[test]
    fn test_softmax_sums_to_one_with_large_logits() {
        let p = softmax(&[1000.0, 1001.0, 999.0], 1.0).unwrap();
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[1] > p[0] && p[0] > p[2]);
    }

    #[test]
    fn test_negative_infinity_score_never_drawn() {
        let mut rng = StdRng::seed_from_u64(5);
        let scores = [0.0, f64::NEG_INFINITY, 0.0];
        for _ in 0..500 {
            assert_ne!(choose(&scores, 1.0, &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_draws_converge_to_distribution() {
        let mut rng = StdRng::seed_from_u64(1234);
        // ln-probabilities of [0.1, 0.2, 0.7]
        let scores = [0.1f64.ln(), 0.2f64.ln(), 0.7f64.ln()];
        let trials = 20_000;
        let mut counts = [0usize; 3];
        for _ in 0..trials {
            counts[choose(&scores, 1.0, &mut rng).unwrap()] += 1;
        }
        for (count, expected) in counts.iter().zip([0.1, 0.2, 0.7]) {
            let observed = *count as f64 / trials as f64;
            assert!((observed - expected).abs() < 0.02, "{observed} vs {expected}");
        }
    }

    #[test]
    fn test_low_temperature_approaches_argmax() {
        let mut rng = StdRng::seed_from_u64(9);
        let scores = [1.0, 3.0, 2.0];
        for _ in 0..200 {
            assert_eq!(choose(&scores, 0.01, &mut rng).unwrap(), 1);
        }
    }
}
