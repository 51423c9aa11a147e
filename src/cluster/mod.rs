//! Cluster Assignment
//!
//! Density-based grouping (DBSCAN) of embeddings under cosine distance.
//!
//! The output is deterministic for a fixed input order. It is NOT invariant
//! under reordering: a border point reachable from two clusters joins
//! whichever cluster is expanded first, and expansion follows input order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::models::{Assignments, ClusterId, NOISE_CLUSTER};
use crate::vector::cosine_distance;

/// Tunable DBSCAN parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterParams {
    /// Maximum cosine distance between neighbours
    pub epsilon: f32,
    /// Neighbourhood size (the point included) needed to seed a cluster
    pub min_samples: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            epsilon: 0.5,
            min_samples: 2,
        }
    }
}

/// Stateless cluster assigner
#[derive(Debug, Clone, Default)]
pub struct ClusterAssigner {
    params: ClusterParams,
}

impl ClusterAssigner {
    pub fn new(params: ClusterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> ClusterParams {
        self.params
    }

    /// Assign every identifier to a cluster id (`-1` for noise)
    ///
    /// A single embedding always forms cluster `0`.
    pub fn assign(&self, entries: &[(&Path, &[f32])]) -> Assignments {
        match entries.len() {
            0 => Assignments::new(),
            1 => {
                let mut assignments = Assignments::new();
                assignments.insert(entries[0].0.to_path_buf(), 0);
                assignments
            }
            _ => {
                let vectors: Vec<&[f32]> = entries.iter().map(|(_, v)| *v).collect();
                let labels = dbscan(&vectors, self.params);
                log_distribution(&labels);

                entries
                    .iter()
                    .zip(labels)
                    .map(|((id, _), label)| (id.to_path_buf(), label))
                    .collect()
            }
        }
    }
}

/// Label each vector; clusters are numbered in order of discovery
fn dbscan(vectors: &[&[f32]], params: ClusterParams) -> Vec<ClusterId> {
    let n = vectors.len();

    // Neighbourhoods include the point itself
    let neighborhoods: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| i == j || cosine_distance(vectors[i], vectors[j]) <= params.epsilon)
                .collect()
        })
        .collect();

    let is_core: Vec<bool> = neighborhoods
        .iter()
        .map(|neighbors| neighbors.len() >= params.min_samples)
        .collect();

    let mut labels = vec![NOISE_CLUSTER; n];
    let mut next_label: ClusterId = 0;

    for seed in 0..n {
        if labels[seed] != NOISE_CLUSTER || !is_core[seed] {
            continue;
        }

        let mut stack = vec![seed];
        while let Some(point) = stack.pop() {
            if labels[point] != NOISE_CLUSTER {
                continue;
            }
            labels[point] = next_label;

            if is_core[point] {
                stack.extend(
                    neighborhoods[point]
                        .iter()
                        .copied()
                        .filter(|&neighbor| labels[neighbor] == NOISE_CLUSTER),
                );
            }
        }

        next_label += 1;
    }

    labels
}

fn log_distribution(labels: &[ClusterId]) {
    let mut counts: BTreeMap<ClusterId, usize> = BTreeMap::new();
    for label in labels {
        *counts.entry(*label).or_default() += 1;
    }

    tracing::info!(clusters = counts.len(), "Clustering complete");
    for (cluster_id, count) in &counts {
        tracing::info!(cluster_id, count, "  cluster size");
    }
}
