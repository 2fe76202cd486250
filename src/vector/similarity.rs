//! Similarity metrics for embedding vectors.

/// Computes cosine similarity between two vectors.
///
/// Returns a value in `[-1, 1]`, or `0.0` when either vector has zero norm or
/// a non-finite component. Vectors of different length are compared over
/// their common prefix; the stores reject mismatched dimensions before
/// calling this.
///
/// Sums are accumulated in `f64` so that squaring very large or very small
/// `f32` components neither overflows nor flushes to zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().min(b.len());
    let (a, b) = (&a[..len], &b[..len]);

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    if !dot.is_finite() || !norm_a.is_finite() || !norm_b.is_finite() {
        return 0.0;
    }

    // Rounding can push identical vectors slightly past 1.0
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orthogonal_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_identical_and_opposite() {
        let v = [0.3, -1.2, 4.5, 0.01];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);

        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        assert!((cosine_similarity(&v, &neg) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_is_zero_not_nan() {
        let zero = [0.0; 3];
        assert_eq!(cosine_similarity(&zero, &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_bounds_hold_for_arbitrary_vectors() {
        let samples: [[f32; 3]; 5] = [
            [1.0, 2.0, 3.0],
            [-7.5, 0.25, 1e-3],
            [1e6, -1e6, 3.0],
            [0.1, 0.1, 0.1],
            [-1.0, -1.0, 2.0],
        ];
        for a in &samples {
            for b in &samples {
                let s = cosine_similarity(a, b);
                assert!((-1.0..=1.0).contains(&s), "{s} out of bounds");
            }
        }
    }

    #[test]
    fn test_extreme_magnitudes_stay_exact() {
        for scale in [1e20f32, 1e-25, f32::MAX, 1e-40] {
            let v = [scale, 0.0];
            assert_eq!(cosine_similarity(&v, &v), 1.0, "scale {scale}");

            let w = [scale, scale];
            assert!((cosine_similarity(&v, &w) - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        }
    }

    #[test]
    fn test_non_finite_components_are_zero() {
        assert_eq!(cosine_similarity(&[f32::INFINITY, 1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_mismatched_lengths_use_common_prefix() {
        assert_eq!(cosine_similarity(&[1.0, 0.0, 5.0], &[1.0, 0.0]), 1.0);
        assert_eq!(cosine_similarity(&[0.0, 1.0], &[1.0]), 0.0);
    }
}
