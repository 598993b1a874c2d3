//! Density clustering with an adaptive radius.

use std::collections::VecDeque;

use ndarray::ArrayView2;

use crate::error::PipelineResult;
use crate::segmenter::{Clusterer, NOISE};

/// DBSCAN-style clustering whose radius adapts to the data.
///
/// A point's core distance is the distance to its `min_cluster_size`-th
/// nearest neighbour. The radius is the median core distance; points whose
/// core distance is within it seed clusters. Clusters smaller than
/// `min_cluster_size` are dissolved into noise. Cluster labels are numbered
/// by first appearance in row order.
#[derive(Debug, Clone, Default)]
pub struct DensityClusterer;

impl DensityClusterer {
    pub fn new() -> Self {
        Self
    }
}

impl Clusterer for DensityClusterer {
    fn cluster(&self, points: ArrayView2<'_, f32>, min_cluster_size: usize) -> PipelineResult<Vec<i64>> {
        let n = points.nrows();
        if n == 0 {
            return Ok(Vec::new());
        }
        let min_cluster_size = min_cluster_size.max(1);
        if n < 2 {
            return Ok(vec![if min_cluster_size <= 1 { 0 } else { NOISE }]);
        }

        let distances = pairwise_distances(points);
        let k = min_cluster_size.min(n - 1);

        let core: Vec<f32> = distances
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut others: Vec<f32> = row
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, d)| *d)
                    .collect();
                others.sort_by(f32::total_cmp);
                others[k - 1]
            })
            .collect();

        let mut sorted_core = core.clone();
        sorted_core.sort_by(f32::total_cmp);
        let eps = sorted_core[n / 2];
        let is_core: Vec<bool> = core.iter().map(|c| *c <= eps).collect();

        let mut labels = vec![NOISE; n];
        let mut next_label = 0i64;

        for seed in 0..n {
            if !is_core[seed] || labels[seed] != NOISE {
                continue;
            }

            labels[seed] = next_label;
            let mut queue = VecDeque::from([seed]);
            while let Some(p) = queue.pop_front() {
                if !is_core[p] {
                    continue;
                }
                for q in 0..n {
                    if labels[q] == NOISE && distances[p][q] <= eps {
                        labels[q] = next_label;
                        queue.push_back(q);
                    }
                }
            }
            next_label += 1;
        }

        Ok(dissolve_small_clusters(labels, min_cluster_size))
    }
}

fn pairwise_distances(points: ArrayView2<'_, f32>) -> Vec<Vec<f32>> {
    let n = points.nrows();
    let mut distances = vec![vec![0f32; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let d = points
                .row(i)
                .iter()
                .zip(points.row(j).iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt();
            distances[i][j] = d;
            distances[j][i] = d;
        }
    }
    distances
}

/// Turn undersized clusters into noise and renumber the rest by first appearance.
fn dissolve_small_clusters(labels: Vec<i64>, min_cluster_size: usize) -> Vec<i64> {
    let mut sizes = std::collections::HashMap::new();
    for label in labels.iter().filter(|l| **l != NOISE) {
        *sizes.entry(*label).or_insert(0usize) += 1;
    }

    let mut renumber = std::collections::HashMap::new();
    labels
        .into_iter()
        .map(|label| {
            if label == NOISE || sizes[&label] < min_cluster_size {
                return NOISE;
            }
            let next = renumber.len() as i64;
            *renumber.entry(label).or_insert(next)
        })
        .collect()
}
