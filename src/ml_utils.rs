// src/ml_utils.rs

//! Score helpers shared by the network and the decoders: softmax
//! normalisation and top-1 / top-2 selection, optionally restricted to a
//! subset of label indices.

/// Normalises raw scores in place into a probability distribution.
///
/// The maximum is subtracted before exponentiation, so the result is
/// invariant under a constant offset and never overflows for finite input.
pub fn softmax(scores: &mut [f32]) {
    if scores.is_empty() {
        return;
    }

    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;

    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }

    for s in scores.iter_mut() {
        *s /= sum;
    }
}

/// Index of the highest score. Ties resolve to the lowest index.
///
/// Returns 0 for an empty slice.
pub fn argmax(scores: &[f32]) -> usize {
    argmax_n(scores, scores.len())
}

/// Index of the highest score among the first `size` entries.
pub fn argmax_n(scores: &[f32], size: usize) -> usize {
    let size = size.min(scores.len());
    let mut max_index = 0;

    for i in 1..size {
        if scores[max_index] < scores[i] {
            max_index = i;
        }
    }

    max_index
}

/// Index of the highest score restricted to `labels`.
///
/// An empty label set searches every score.
pub fn argmax_in(scores: &[f32], labels: &[usize]) -> usize {
    if labels.is_empty() {
        return argmax(scores);
    }

    let mut max_index = labels[0];
    for &i in &labels[1..] {
        if scores[max_index] < scores[i] {
            max_index = i;
        }
    }

    max_index
}

/// Indices of the best and second-best scores.
///
/// With fewer than two scores the second index is `None`.
pub fn argmax2(scores: &[f32]) -> (usize, Option<usize>) {
    argmax2_n(scores, scores.len())
}

/// Top-2 over the first `size` entries.
pub fn argmax2_n(scores: &[f32], size: usize) -> (usize, Option<usize>) {
    let size = size.min(scores.len());
    if size < 2 {
        return (0, None);
    }

    let (mut first, mut second) = if scores[0] < scores[1] { (1, 0) } else { (0, 1) };

    for i in 2..size {
        if scores[first] < scores[i] {
            second = first;
            first = i;
        } else if scores[second] < scores[i] {
            second = i;
        }
    }

    (first, Some(second))
}

/// Top-2 restricted to `labels`. An empty label set searches every score.
pub fn argmax2_in(scores: &[f32], labels: &[usize]) -> (usize, Option<usize>) {
    match labels {
        [] => argmax2(scores),
        [only] => (*only, None),
        [a, b, rest @ ..] => {
            let (mut first, mut second) = if scores[*a] < scores[*b] { (*b, *a) } else { (*a, *b) };

            for &i in rest {
                if scores[first] < scores[i] {
                    second = first;
                    first = i;
                } else if scores[second] < scores[i] {
                    second = i;
                }
            }

            (first, Some(second))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_scores(rng: &mut StdRng, len: usize) -> Vec<f32> {
        // Coarse values so ties actually occur.
        (0..len).map(|_| rng.gen_range(-5..5) as f32).collect()
    }

    fn max_of(scores: &[f32], labels: &[usize]) -> f32 {
        labels.iter().map(|&i| scores[i]).fold(f32::NEG_INFINITY, f32::max)
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let mut scores = vec![1.0, 2.0, 3.0, -4.0];
        softmax(&mut scores);
        let sum: f32 = scores.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(scores[2] > scores[1] && scores[1] > scores[0]);
    }

    #[test]
    fn test_softmax_large_magnitude() {
        let mut scores = vec![1000.0, 999.0, -1000.0];
        softmax(&mut scores);
        let sum: f32 = scores.iter().sum();
        assert!(scores.iter().all(|s| s.is_finite()));
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_shift_invariant() {
        let mut a = vec![0.5, -1.25, 2.0];
        let mut b: Vec<f32> = a.iter().map(|x| x + 300.0).collect();
        softmax(&mut a);
        softmax(&mut b);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_argmax_random() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let len = rng.gen_range(1..12);
            let scores = random_scores(&mut rng, len);
            let best = argmax(&scores);
            let all: Vec<usize> = (0..len).collect();
            assert_eq!(scores[best], max_of(&scores, &all));
        }
    }

    #[test]
    fn test_argmax2_random() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let len = rng.gen_range(2..12);
            let scores = random_scores(&mut rng, len);
            let (first, second) = argmax2(&scores);
            let second = second.unwrap();
            assert_ne!(first, second);

            let mut sorted = scores.clone();
            sorted.sort_by(|a, b| b.total_cmp(a));
            assert_eq!(scores[first], sorted[0]);
            assert_eq!(scores[second], sorted[1]);
        }
    }

    #[test]
    fn test_argmax_restricted_subset() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..200 {
            let scores = random_scores(&mut rng, 10);
            let labels: Vec<usize> = (0..10).filter(|_| rng.gen_bool(0.5)).collect();
            if labels.len() < 2 {
                continue;
            }

            let best = argmax_in(&scores, &labels);
            assert!(labels.contains(&best));
            assert_eq!(scores[best], max_of(&scores, &labels));

            let (first, second) = argmax2_in(&scores, &labels);
            let second = second.unwrap();
            assert!(labels.contains(&first) && labels.contains(&second));
            assert_ne!(first, second);

            let mut sorted: Vec<f32> = labels.iter().map(|&i| scores[i]).collect();
            sorted.sort_by(|a, b| b.total_cmp(a));
            assert_eq!(scores[first], sorted[0]);
            assert_eq!(scores[second], sorted[1]);
        }
    }

    #[test]
    fn test_small_inputs() {
        assert_eq!(argmax2(&[3.0]), (0, None));
        assert_eq!(argmax2_in(&[1.0, 5.0], &[1]), (1, None));
        assert_eq!(argmax_in(&[1.0, 5.0, 2.0], &[]), 1);
        assert_eq!(argmax_n(&[1.0, 5.0, 9.0], 2), 1);
    }
}
