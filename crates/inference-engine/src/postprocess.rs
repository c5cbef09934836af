//! Logit post-processing

use crate::InferenceError;

/// Convert logits into a probability distribution
///
/// Scores are shifted by their maximum before exponentiation so large
/// logits do not overflow.
pub fn softmax(logits: &[f32]) -> Result<Vec<f64>, InferenceError> {
    if logits.iter().any(|v| !v.is_finite()) {
        return Err(InferenceError::NonFiniteOutput);
    }

    let max = logits
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, |acc, v| acc.max(v as f64));
    let exps: Vec<f64> = logits.iter().map(|&v| (v as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();

    Ok(exps.into_iter().map(|e| e / sum).collect())
}

/// Index of the largest probability, the lowest index on ties
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Probability as a percentage with two decimals
pub fn round_percentage(probability: f64) -> f64 {
    (probability * 100.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_softmax_known_values() {
        let probs = softmax(&[1.0, 2.0, 3.0]).unwrap();
        assert!((probs[0] - 0.090_030_57).abs() < 1e-6);
        assert!((probs[1] - 0.244_728_47).abs() < 1e-6);
        assert!((probs[2] - 0.665_240_96).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_large_logits() {
        let probs = softmax(&[1000.0, 1000.0]).unwrap();
        assert_eq!(probs, vec![0.5, 0.5]);
    }

    #[test]
    fn test_softmax_rejects_nan() {
        assert!(matches!(
            softmax(&[0.0, f32::NAN]),
            Err(InferenceError::NonFiniteOutput)
        ));
        assert!(softmax(&[f32::INFINITY, 0.0]).is_err());
    }

    #[test]
    fn test_argmax_first_on_tie() {
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_round_percentage() {
        assert_eq!(round_percentage(0.987_654), 98.77);
        assert_eq!(round_percentage(1.0), 100.0);
        assert_eq!(round_percentage(0.0), 0.0);
    }

    proptest! {
        #[test]
        fn prop_softmax_is_distribution(logits in prop::collection::vec(-50.0f32..50.0, 1..128)) {
            let probs = softmax(&logits).unwrap();
            let sum: f64 = probs.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-9);
            prop_assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        }

        #[test]
        fn prop_argmax_matches_largest_logit(logits in prop::collection::vec(-50.0f32..50.0, 1..128)) {
            let probs = softmax(&logits).unwrap();
            let idx = argmax(&probs).unwrap();
            prop_assert!(logits.iter().all(|&l| l <= logits[idx]));

            let pct = round_percentage(probs[idx]);
            prop_assert!((0.0..=100.0).contains(&pct));
        }
    }
}
