//! Fine clustering inside one bucket.
//!
//! Each row of the similarity matrix is treated as an observation in
//! `n`-dimensional space. Rows are merged agglomeratively with centroid
//! linkage (Euclidean distance between cluster centroids), and the resulting
//! tree is cut so that every flat cluster has a cophenetic distance of at most
//! the threshold.

use crate::models::SimilarityMatrix;

/// One merge of the agglomerative tree. Node ids below `n` are leaves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub height: f64,
    pub size: usize,
}

fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Centroid-linkage tree over the rows of `matrix`; `n - 1` merges in order.
///
/// Squared distances are updated with the Lance-Williams recurrence. When two
/// pairs are equally close the one found first in active-cluster order wins.
pub fn centroid_linkage(matrix: &SimilarityMatrix) -> Vec<Merge> {
    let n = matrix.size();
    if n < 2 {
        return Vec::new();
    }

    // Pairwise squared distances between active clusters, indexed by slot
    let mut dist = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = squared_euclidean(matrix.row(i), matrix.row(j));
            dist[i][j] = d;
            dist[j][i] = d;
        }
    }

    // slot -> (node id, size); None once merged away
    let mut active: Vec<Option<(usize, usize)>> = (0..n).map(|i| Some((i, 1))).collect();
    let mut merges = Vec::with_capacity(n - 1);

    for step in 0..n - 1 {
        let mut best: Option<(usize, usize, f64)> = None;
        for i in 0..n {
            if active[i].is_none() {
                continue;
            }
            for j in (i + 1)..n {
                if active[j].is_none() {
                    continue;
                }
                if best.map_or(true, |(_, _, d)| dist[i][j] < d) {
                    best = Some((i, j, dist[i][j]));
                }
            }
        }
        let Some((i, j, d_ij)) = best else {
            break;
        };
        let (Some((node_i, size_i)), Some((node_j, size_j))) = (active[i], active[j]) else {
            break;
        };

        let (ni, nj) = (size_i as f64, size_j as f64);
        let total = ni + nj;
        for k in 0..n {
            if k == i || k == j || active[k].is_none() {
                continue;
            }
            let updated =
                (ni * dist[k][i] + nj * dist[k][j]) / total - ni * nj * d_ij / (total * total);
            let updated = updated.max(0.0);
            dist[k][i] = updated;
            dist[i][k] = updated;
        }

        merges.push(Merge {
            left: node_i,
            right: node_j,
            height: d_ij.max(0.0).sqrt(),
            size: size_i + size_j,
        });
        active[i] = Some((n + step, size_i + size_j));
        active[j] = None;
    }
    merges
}

/// Flat clusters whose cophenetic distance is at most `threshold`.
///
/// A node's cophenetic bound is the largest merge height anywhere below it,
/// which keeps the cut well defined when centroid linkage produces inversions.
pub fn cut_tree(n: usize, merges: &[Merge], threshold: f64) -> Vec<Vec<usize>> {
    if n == 0 {
        return Vec::new();
    }

    let mut max_dist = vec![0.0f64; n + merges.len()];
    for (m, merge) in merges.iter().enumerate() {
        max_dist[n + m] = merge
            .height
            .max(max_dist[merge.left])
            .max(max_dist[merge.right]);
    }

    let mut clusters = Vec::new();
    if merges.len() + 1 != n {
        // Incomplete tree: every leaf stands alone
        return (0..n).map(|i| vec![i]).collect();
    }

    let root = n + merges.len() - 1;
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if max_dist[node] <= threshold || node < n {
            let mut members = Vec::new();
            collect_leaves(node, n, merges, &mut members);
            members.sort_unstable();
            clusters.push(members);
        } else {
            let merge = &merges[node - n];
            stack.push(merge.right);
            stack.push(merge.left);
        }
    }

    clusters.sort_by_key(|c| c[0]);
    clusters
}

fn collect_leaves(node: usize, n: usize, merges: &[Merge], out: &mut Vec<usize>) {
    let mut stack = vec![node];
    while let Some(node) = stack.pop() {
        if node < n {
            out.push(node);
        } else {
            let merge = &merges[node - n];
            stack.push(merge.left);
            stack.push(merge.right);
        }
    }
}

/// Group the members of one bucket; indices refer to matrix rows.
pub fn fine_cluster(matrix: &SimilarityMatrix, threshold: f64) -> Vec<Vec<usize>> {
    let merges = centroid_linkage(matrix);
    cut_tree(matrix.size(), &merges, threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(values: &[&[f64]]) -> SimilarityMatrix {
        let mut m = SimilarityMatrix::zeros(values.len());
        for (i, row) in values.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                m.set_symmetric(i, j, v);
            }
        }
        m
    }

    #[test]
    fn test_empty_and_single() {
        assert!(fine_cluster(&SimilarityMatrix::zeros(0), 0.12).is_empty());
        let one = matrix(&[&[1.0]]);
        assert_eq!(fine_cluster(&one, 0.12), vec![vec![0]]);
    }

    #[test]
    fn test_two_groups() {
        let m = matrix(&[
            &[1.0, 0.1, 0.99, 0.1],
            &[0.1, 1.0, 0.1, 0.99],
            &[0.99, 0.1, 1.0, 0.1],
            &[0.1, 0.99, 0.1, 1.0],
        ]);
        assert_eq!(fine_cluster(&m, 0.12), vec![vec![0, 2], vec![1, 3]]);
    }

    #[test]
    fn test_identical_rows_merge_at_zero() {
        let m = matrix(&[&[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0]]);
        let merges = centroid_linkage(&m);
        assert_eq!(merges.len(), 2);
        assert!(merges.iter().all(|mg| mg.height == 0.0));
        assert_eq!(fine_cluster(&m, 0.0), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_zero_threshold_keeps_distinct_rows_apart() {
        let m = matrix(&[&[1.0, 0.5], &[0.5, 1.0]]);
        assert_eq!(fine_cluster(&m, 0.0), vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_large_threshold_gives_one_cluster() {
        let m = matrix(&[
            &[1.0, 0.2, 0.3],
            &[0.2, 1.0, 0.4],
            &[0.3, 0.4, 1.0],
        ]);
        assert_eq!(fine_cluster(&m, 10.0), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_centroid_update_matches_direct_distance() {
        // Rows (0,0,1), (0,1,0), (1,0,5)
        let m = matrix(&[&[0.0, 0.0, 1.0], &[0.0, 1.0, 0.0], &[1.0, 0.0, 5.0]]);
        let merges = centroid_linkage(&m);

        // Rows 0 and 1 merge first at sqrt(2), centroid (0, 0.5, 0.5)
        assert_eq!((merges[0].left, merges[0].right), (0, 1));
        assert!((merges[0].height - 2.0f64.sqrt()).abs() < 1e-9);
        let expected = (1.0f64 + 0.25 + 20.25).sqrt();
        assert!((merges[1].height - expected).abs() < 1e-9, "{}", merges[1].height);
        assert_eq!(merges[1].size, 3);
    }

    #[test]
    fn test_cut_respects_inversions() {
        // Second merge lower than the first: the cut uses the max height below
        let merges = [
            Merge { left: 0, right: 1, height: 0.5, size: 2 },
            Merge { left: 2, right: 3, height: 0.3, size: 3 },
        ];
        assert_eq!(cut_tree(3, &merges, 0.4), vec![vec![0], vec![1], vec![2]]);
        assert_eq!(cut_tree(3, &merges, 0.5), vec![vec![0, 1, 2]]);
    }
}
