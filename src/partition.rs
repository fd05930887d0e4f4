//! Coarse partitioning of the library into buckets of acoustically close tracks.
//!
//! Vectors have different lengths; shorter ones are treated as zero-padded to
//! the longest without materializing the padding.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::Bucket;

/// `max(1, n / per_bucket)` buckets, never more than `n`.
pub fn bucket_count(n: usize, per_bucket: usize) -> usize {
    if n == 0 {
        return 0;
    }
    (n / per_bucket.max(1)).clamp(1, n)
}

/// Squared distance between a vector and a centroid of dimension >= its length.
fn padded_distance_sq(x: &[f32], centroid: &[f64]) -> f64 {
    let (head, tail) = centroid.split_at(x.len().min(centroid.len()));
    let near: f64 = x
        .iter()
        .zip(head)
        .map(|(&a, &c)| {
            let d = a as f64 - c;
            d * d
        })
        .sum();
    let far: f64 = tail.iter().map(|c| c * c).sum();
    near + far
}

fn padded_copy(x: &[f32], dim: usize) -> Vec<f64> {
    let mut out = vec![0.0; dim];
    for (o, &v) in out.iter_mut().zip(x) {
        *o = v as f64;
    }
    out
}

/// Index of the nearest centroid; ties go to the lower index.
fn nearest(x: &[f32], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (c, centroid) in centroids.iter().enumerate() {
        let d = padded_distance_sq(x, centroid);
        if d < best_dist {
            best = c;
            best_dist = d;
        }
    }
    best
}

/// k-means++ seeding.
fn initial_centroids(vectors: &[&[f32]], k: usize, dim: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = vectors.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(padded_copy(vectors[rng.gen_range(0..n)], dim));

    let mut min_dist: Vec<f64> = vectors
        .iter()
        .map(|x| padded_distance_sq(x, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = min_dist.iter().sum();
        let chosen = if total > 0.0 && total.is_finite() {
            let mut target = rng.gen::<f64>() * total;
            let mut pick = n - 1;
            for (i, &d) in min_dist.iter().enumerate() {
                if target < d {
                    pick = i;
                    break;
                }
                target -= d;
            }
            pick
        } else {
            // Every point already sits on a centroid
            rng.gen_range(0..n)
        };

        let centroid = padded_copy(vectors[chosen], dim);
        for (d, x) in min_dist.iter_mut().zip(vectors) {
            *d = d.min(padded_distance_sq(x, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

/// Split `vectors` into at most `k` non-empty buckets with seeded k-means.
///
/// Bucket members are indices into `vectors`, ascending. Buckets are ordered
/// by their first member. The same input and seed always give the same
/// buckets.
pub fn partition(vectors: &[&[f32]], k: usize, seed: u64, max_iterations: usize) -> Vec<Bucket> {
    let n = vectors.len();
    if n == 0 {
        return Vec::new();
    }
    let k = k.clamp(1, n);
    let assignments = if k == 1 {
        vec![0; n]
    } else {
        lloyd(vectors, k, seed, max_iterations)
    };

    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (i, &c) in assignments.iter().enumerate() {
        groups[c].push(i);
    }
    let mut groups: Vec<Vec<usize>> = groups.into_iter().filter(|g| !g.is_empty()).collect();
    groups.sort_by_key(|g| g[0]);

    groups
        .into_iter()
        .enumerate()
        .map(|(id, members)| Bucket { id, members })
        .collect()
}

fn lloyd(vectors: &[&[f32]], k: usize, seed: u64, max_iterations: usize) -> Vec<usize> {
    let dim = vectors.iter().map(|v| v.len()).max().unwrap_or(0);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = initial_centroids(vectors, k, dim, &mut rng);
    let mut assignments: Vec<usize> = vectors.iter().map(|x| nearest(x, &centroids)).collect();

    for iteration in 0..max_iterations {
        let mut sums = vec![vec![0.0f64; dim]; k];
        let mut counts = vec![0usize; k];
        for (x, &c) in vectors.iter().zip(&assignments) {
            counts[c] += 1;
            for (s, &v) in sums[c].iter_mut().zip(x.iter()) {
                *s += v as f64;
            }
        }
        for (c, (sum, count)) in sums.into_iter().zip(counts).enumerate() {
            // An empty cluster keeps its previous centroid
            if count > 0 {
                centroids[c] = sum.into_iter().map(|s| s / count as f64).collect();
            }
        }

        let next: Vec<usize> = vectors.iter().map(|x| nearest(x, &centroids)).collect();
        if next == assignments {
            tracing::debug!("k-means converged after {} iterations", iteration + 1);
            break;
        }
        assignments = next;
    }
    assignments
}
