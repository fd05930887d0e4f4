use crate::models::{DedupReport, DuplicateCluster, FailureRecord, RunStats};

/// Flatten every bucket's sub-clusters into the final report.
///
/// Strict mode keeps only clusters with at least two members; debug mode
/// keeps singletons too, which helps when tuning the threshold.
pub fn assemble(
    sub_clusters: Vec<Vec<DuplicateCluster>>,
    failures: Vec<FailureRecord>,
    debug: bool,
) -> DedupReport {
    let clusters: Vec<DuplicateCluster> = sub_clusters
        .into_iter()
        .flatten()
        .filter(|c| !c.is_empty() && (debug || c.len() > 1))
        .collect();

    DedupReport {
        clusters,
        failures,
        stats: RunStats::default(),
    }
}
