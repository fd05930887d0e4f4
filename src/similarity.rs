//! Pairwise cosine similarity within a bucket.

use rayon::prelude::*;

use crate::models::SimilarityMatrix;

/// Cosine similarity of two vectors, the shorter one zero-padded.
///
/// Padding adds nothing to the dot product or the norms, so only the common
/// prefix contributes to the numerator. A zero vector has similarity 0 with
/// everything, itself included.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    cosine_with_norms(a, b, norm(a), norm(b))
}

fn norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt()
}

fn cosine_with_norms(a: &[f32], b: &[f32], norm_a: f64, norm_b: f64) -> f64 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(&x, &y)| x as f64 * y as f64).sum();
    dot / (norm_a * norm_b)
}

/// Symmetric matrix of pairwise similarities. The diagonal is 1 for any
/// non-zero vector.
pub fn similarity_matrix(vectors: &[&[f32]]) -> SimilarityMatrix {
    let n = vectors.len();
    let norms: Vec<f64> = vectors.iter().map(|v| norm(v)).collect();

    let upper: Vec<(usize, usize, f64)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| {
            let norms = &norms;
            (i..n).map(move |j| {
                let value = if i == j && norms[i] != 0.0 {
                    1.0
                } else {
                    cosine_with_norms(vectors[i], vectors[j], norms[i], norms[j])
                };
                (i, j, value)
            })
        })
        .collect();

    let mut matrix = SimilarityMatrix::zeros(n);
    for (i, j, value) in upper {
        matrix.set_symmetric(i, j, value);
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-12);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-12);
        assert!((cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_vector_has_zero_similarity() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_padding_is_implicit() {
        let a = [1.0f32, 2.0];
        let padded = [1.0f32, 2.0, 0.0, 0.0];
        let b = [2.0f32, 1.0, 3.0];
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&padded, &b)).abs() < 1e-12);
        assert!((cosine_similarity(&a, &padded) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_matrix_diagonal_and_symmetry() {
        let a = [1.0f32, 0.0, 1.0];
        let b = [0.5f32, 0.5];
        let zero = [0.0f32; 3];
        let m = similarity_matrix(&[&a, &b, &zero]);

        assert_eq!(m.size(), 3);
        assert_eq!(m.get(0, 0), 1.0);
        assert_eq!(m.get(1, 1), 1.0);
        assert_eq!(m.get(2, 2), 0.0);
        assert_eq!(m.get(0, 1), m.get(1, 0));
        assert!((m.get(0, 1) - cosine_similarity(&a, &b)).abs() < 1e-12);
        assert_eq!(m.get(0, 2), 0.0);
    }

    #[test]
    fn test_matrix_matches_pairwise_cosine() {
        let vectors: Vec<Vec<f32>> = vec![
            vec![0.3, -1.2, 4.0, 0.5],
            vec![1.0, 2.0],
            vec![-0.7, 0.1, 3.3],
            vec![2.5, -2.5, 0.0, 1.0, 1.0],
        ];
        let views: Vec<&[f32]> = vectors.iter().map(|v| v.as_slice()).collect();
        let m = similarity_matrix(&views);
        for i in 0..views.len() {
            for j in 0..views.len() {
                if i != j {
                    assert!((m.get(i, j) - cosine_similarity(views[i], views[j])).abs() < 1e-12);
                }
            }
        }
    }

    proptest! {
        #[test]
        fn prop_matrix_is_symmetric_and_bounded(
            data in prop::collection::vec(prop::collection::vec(-5.0f32..5.0, 1..8), 1..10),
        ) {
            let views: Vec<&[f32]> = data.iter().map(|v| v.as_slice()).collect();
            let m = similarity_matrix(&views);
            for i in 0..views.len() {
                for j in 0..views.len() {
                    prop_assert_eq!(m.get(i, j), m.get(j, i));
                    prop_assert!(m.get(i, j).abs() <= 1.0 + 1e-9);
                }
            }
        }
    }
}
