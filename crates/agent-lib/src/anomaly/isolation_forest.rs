//! Isolation forest over two-dimensional feature vectors
//!
//! Points that can be separated from the rest with few random axis-aligned
//! splits have short average path lengths and therefore high anomaly scores.
//! The forest is fitted from scratch on every call to `fit`; it keeps no
//! state between windows.

use crate::error::{DetectorError, Result};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};

/// Number of features per point (latency, memory)
pub const N_FEATURES: usize = 2;

/// Euler–Mascheroni constant, used for the harmonic number approximation
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Forest hyper-parameters
#[derive(Debug, Clone)]
pub struct ForestParams {
    /// Number of isolation trees
    pub n_trees: usize,
    /// Maximum subsample size per tree
    pub max_samples: usize,
    /// RNG seed; identical data and seed give identical forests
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// A fitted isolation forest
#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    /// Fit a forest on `data`
    ///
    /// Fails with `DetectorError::ModelFit` when the input is empty, holds
    /// non-finite values, or every feature is constant (nothing to isolate).
    pub fn fit(data: &[[f64; N_FEATURES]], params: &ForestParams) -> Result<Self> {
        if data.is_empty() {
            return Err(DetectorError::ModelFit("empty feature matrix".into()));
        }
        if params.n_trees == 0 {
            return Err(DetectorError::invalid_config("n_trees", "must be at least 1"));
        }
        if params.max_samples < 2 {
            return Err(DetectorError::invalid_config("max_samples", "must be at least 2"));
        }
        if data.iter().flatten().any(|v| !v.is_finite()) {
            return Err(DetectorError::ModelFit("non-finite feature value".into()));
        }

        let all: Vec<usize> = (0..data.len()).collect();
        if splittable_features(data, &all).is_empty() {
            return Err(DetectorError::ModelFit(
                "all features are constant across the window".into(),
            ));
        }

        let sample_size = params.max_samples.min(data.len());
        let height_limit = (sample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.n_trees)
            .map(|_| {
                let subsample = index::sample(&mut rng, data.len(), sample_size).into_vec();
                grow(data, subsample, 0, height_limit, &mut rng)
            })
            .collect();

        Ok(Self { trees, sample_size })
    }

    /// Anomaly score in `(0, 1]`; values close to 1 are outliers, values well
    /// below 0.5 are inliers
    pub fn score(&self, point: &[f64; N_FEATURES]) -> f64 {
        let norm = average_path_length(self.sample_size);
        if norm <= 0.0 {
            return 0.5;
        }

        let mean_depth = self
            .trees
            .iter()
            .map(|tree| path_length(tree, point, 0))
            .sum::<f64>()
            / self.trees.len() as f64;

        2f64.powf(-mean_depth / norm)
    }

    /// Score every point
    pub fn score_samples(&self, data: &[[f64; N_FEATURES]]) -> Vec<f64> {
        data.iter().map(|p| self.score(p)).collect()
    }

    /// Number of trees in the forest
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }
}

/// Recursively build one isolation tree over the given row indices
fn grow(
    data: &[[f64; N_FEATURES]],
    rows: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= height_limit || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    let candidates = splittable_features(data, &rows);
    if candidates.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    // threshold in [min, max): the minimum always goes left, the maximum right
    let threshold = rng.gen_range(min..max);

    let (left, right): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&i| data[i][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(data, left, depth + 1, height_limit, rng)),
        right: Box::new(grow(data, right, depth + 1, height_limit, rng)),
    }
}

/// Features whose values are not constant over `rows`, with their range
fn splittable_features(data: &[[f64; N_FEATURES]], rows: &[usize]) -> Vec<(usize, f64, f64)> {
    (0..N_FEATURES)
        .filter_map(|feature| {
            let (min, max) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                let v = data[i][feature];
                (lo.min(v), hi.max(v))
            });
            (min < max).then_some((feature, min, max))
        })
        .collect()
}

fn path_length(node: &Node, point: &[f64; N_FEATURES], depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if point[*feature] <= *threshold {
                path_length(left, point, depth + 1)
            } else {
                path_length(right, point, depth + 1)
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}
