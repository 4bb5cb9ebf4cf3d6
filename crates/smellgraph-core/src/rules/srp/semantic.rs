//! Density-based clustering of method signatures in embedding space.

use std::collections::VecDeque;

use tracing::warn;

use crate::embedding::{cosine_distance, Embedder};

pub const CLUSTER_EPS: f32 = 0.5;
pub const CLUSTER_MIN_SAMPLES: usize = 2;

/// Outcome of clustering one type's methods.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SemanticClusters {
    pub cluster_count: usize,
    pub diversity: f64,
}

/// DBSCAN over cosine distance. A point's neighbourhood includes itself.
/// Returns a cluster label per point, `None` for noise.
pub fn dbscan(points: &[Vec<f32>], eps: f32, min_samples: usize) -> Vec<Option<usize>> {
    let neighbours: Vec<Vec<usize>> = (0..points.len())
        .map(|i| {
            (0..points.len())
                .filter(|&j| cosine_distance(&points[i], &points[j]) <= eps)
                .collect()
        })
        .collect();

    let mut labels: Vec<Option<usize>> = vec![None; points.len()];
    let mut visited = vec![false; points.len()];
    let mut next_label = 0;

    for seed in 0..points.len() {
        if visited[seed] || neighbours[seed].len() < min_samples {
            continue;
        }
        let label = next_label;
        next_label += 1;

        let mut queue = VecDeque::from([seed]);
        visited[seed] = true;
        while let Some(point) = queue.pop_front() {
            labels[point] = Some(label);
            if neighbours[point].len() < min_samples {
                // Border point: joins the cluster but does not extend it.
                continue;
            }
            for &next in &neighbours[point] {
                if !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                } else if labels[next].is_none() {
                    labels[next] = Some(label);
                }
            }
        }
    }
    labels
}

pub fn cluster_diversity(cluster_count: usize) -> f64 {
    if cluster_count <= 1 {
        0.0
    } else {
        (0.3 * cluster_count as f64).min(1.0)
    }
}

/// Cluster method names by their synthesized signatures. Embedding failures
/// degrade to zero diversity.
pub fn analyze_methods(embedder: &dyn Embedder, method_names: &[String]) -> SemanticClusters {
    if method_names.len() < 2 {
        return SemanticClusters::default();
    }
    let signatures: Vec<String> = method_names.iter().map(|n| format!("def {n}()")).collect();
    let vectors = match embedder.embed_batch(&signatures) {
        Ok(vectors) => vectors,
        Err(e) => {
            warn!("Semantic signal unavailable: {e}");
            return SemanticClusters::default();
        }
    };
    let labels = dbscan(&vectors, CLUSTER_EPS, CLUSTER_MIN_SAMPLES);
    let cluster_count = labels.iter().flatten().max().map(|max| max + 1).unwrap_or(0);
    SemanticClusters {
        cluster_count,
        diversity: cluster_diversity(cluster_count),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::{SmellError, SmellResult};

    /// Embeds a signature by its leading verb onto a fixed axis.
    pub(crate) struct AxisEmbedder;

    impl Embedder for AxisEmbedder {
        fn dimension(&self) -> usize {
            4
        }

        fn embed(&self, text: &str) -> SmellResult<Vec<f32>> {
            let name = text.trim_start_matches("def ");
            let axis = if name.starts_with("save") || name.starts_with("load") {
                0
            } else if name.starts_with("send") || name.starts_with("notify") {
                1
            } else if name.starts_with("validate") || name.starts_with("check") {
                2
            } else {
                3
            };
            let mut v = vec![0.0; 4];
            v[axis] = 1.0;
            Ok(v)
        }
    }

    struct DownEmbedder;

    impl Embedder for DownEmbedder {
        fn dimension(&self) -> usize {
            4
        }

        fn embed(&self, _text: &str) -> SmellResult<Vec<f32>> {
            Err(SmellError::Embedding("service unreachable".to_string()))
        }
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dbscan_separates_groups_and_noise() {
        let points = vec![
            vec![1.0, 0.0],
            vec![0.95, 0.05],
            vec![0.0, 1.0],
            vec![0.05, 0.95],
            vec![-1.0, 0.0],
        ];
        let labels = dbscan(&points, 0.5, 2);
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[2], labels[3]);
        assert_ne!(labels[0], labels[2]);
        assert_eq!(labels[4], None);
    }

    #[test]
    fn three_concerns_give_three_clusters() {
        let result = analyze_methods(
            &AxisEmbedder,
            &names(&[
                "save_user",
                "load_user",
                "send_email",
                "notify_admin",
                "validate_email",
                "check_quota",
            ]),
        );
        assert_eq!(result.cluster_count, 3);
        assert!((result.diversity - 0.9).abs() < 1e-9);
    }

    #[test]
    fn cohesive_or_tiny_types_score_zero() {
        let cohesive = analyze_methods(&AxisEmbedder, &names(&["save_a", "load_b", "save_c"]));
        assert_eq!(cohesive.cluster_count, 1);
        assert_eq!(cohesive.diversity, 0.0);
        assert_eq!(
            analyze_methods(&AxisEmbedder, &names(&["save_a"])),
            SemanticClusters::default()
        );
    }

    #[test]
    fn embedding_failure_degrades_to_zero() {
        let result = analyze_methods(&DownEmbedder, &names(&["save_a", "send_b"]));
        assert_eq!(result, SemanticClusters::default());
    }
}
