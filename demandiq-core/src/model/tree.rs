//! Regression trees grown on first/second-order loss statistics.
//!
//! Split search is exact and greedy: every midpoint between consecutive
//! distinct feature values is scored with
//!
//! ```text
//! gain = ½ · ( G_L²/(H_L+λ) + G_R²/(H_R+λ) − G²/(H+λ) )
//! ```
//!
//! and a node becomes a leaf with weight `−G/(H+λ) · η` when no split clears
//! `min_split_gain`, the depth limit is reached, or a child would fall under
//! `min_child_weight`.

use crate::forecast::ForecastError;

/// Dense row-major feature matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    data: Vec<f64>,
    n_rows: usize,
    n_cols: usize,
}

impl FeatureMatrix {
    /// Build from rows; every row must have the same width.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, ForecastError> {
        let n_cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * n_cols);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != n_cols {
                return Err(ForecastError::FeatureMismatch(format!(
                    "row {i} has {} features, expected {n_cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            n_rows: rows.len(),
            n_cols,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_cols..(i + 1) * self.n_cols]
    }

    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.n_cols + col]
    }
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub l2_regularization: f64,
    pub min_child_weight: f64,
    pub min_split_gain: f64,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Binary regression tree stored as an arena; node 0 is the root.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Grow a tree over `rows`, considering only `features`.
    ///
    /// `grad` and `hess` are indexed by row of `x`.
    pub fn grow(
        x: &FeatureMatrix,
        grad: &[f64],
        hess: &[f64],
        rows: &[usize],
        features: &[usize],
        params: &TreeParams,
    ) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build(x, grad, hess, rows.to_vec(), features, params, 0);
        tree
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &mut self,
        x: &FeatureMatrix,
        grad: &[f64],
        hess: &[f64],
        rows: Vec<usize>,
        features: &[usize],
        params: &TreeParams,
        depth: usize,
    ) -> usize {
        let index = self.nodes.len();
        let g: f64 = rows.iter().map(|&r| grad[r]).sum();
        let h: f64 = rows.iter().map(|&r| hess[r]).sum();
        let weight = -g / (h + params.l2_regularization) * params.learning_rate;
        self.nodes.push(Node::Leaf { weight });

        if depth >= params.max_depth {
            return index;
        }
        let Some(split) = best_split(x, grad, hess, &rows, features, params, g, h) else {
            return index;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| x.value(r, split.feature) < split.threshold);
        let left = self.build(x, grad, hess, left_rows, features, params, depth + 1);
        let right = self.build(x, grad, hess, right_rows, features, params, depth + 1);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    pub fn predict_row(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf { weight } => return weight,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[feature] < threshold { left } else { right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

#[allow(clippy::too_many_arguments)]
fn best_split(
    x: &FeatureMatrix,
    grad: &[f64],
    hess: &[f64],
    rows: &[usize],
    features: &[usize],
    params: &TreeParams,
    g_total: f64,
    h_total: f64,
) -> Option<SplitCandidate> {
    let lambda = params.l2_regularization;
    let parent_score = g_total * g_total / (h_total + lambda);
    let mut best: Option<SplitCandidate> = None;
    let mut sorted = rows.to_vec();

    for &feature in features {
        sorted.sort_by(|&a, &b| x.value(a, feature).total_cmp(&x.value(b, feature)));

        let mut g_left = 0.0;
        let mut h_left = 0.0;
        for pair in sorted.windows(2) {
            let (current, next) = (pair[0], pair[1]);
            g_left += grad[current];
            h_left += hess[current];

            let (lo, hi) = (x.value(current, feature), x.value(next, feature));
            if lo == hi {
                continue;
            }
            let g_right = g_total - g_left;
            let h_right = h_total - h_left;
            if h_left < params.min_child_weight || h_right < params.min_child_weight {
                continue;
            }

            let gain = 0.5
                * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                    - parent_score);
            if gain > params.min_split_gain && best.map_or(true, |b| gain > b.gain) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: 0.5 * (lo + hi),
                    gain,
                });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TreeParams {
        TreeParams {
            max_depth: 4,
            l2_regularization: 0.0,
            min_child_weight: 1.0,
            min_split_gain: 1e-6,
            learning_rate: 1.0,
        }
    }

    /// Squared-error statistics at prediction 0: g = -y, h = 1.
    fn stats(y: &[f64]) -> (Vec<f64>, Vec<f64>) {
        (y.iter().map(|v| -v).collect(), vec![1.0; y.len()])
    }

    #[test]
    fn ragged_rows_are_a_feature_mismatch() {
        let rows: Vec<Vec<f64>> = vec![vec![1.0, 2.0], vec![3.0]];
        let err = FeatureMatrix::from_rows(&rows).unwrap_err();
        assert!(matches!(err, ForecastError::FeatureMismatch(_)));
    }

    #[test]
    fn step_function_is_split_at_midpoint() {
        let rows: Vec<[f64; 1]> = (0..10).map(|i| [i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| if i < 5 { 1.0 } else { 3.0 }).collect();
        let x = FeatureMatrix::from_rows(&rows).unwrap();
        let (g, h) = stats(&y);
        let all: Vec<usize> = (0..10).collect();

        let tree = RegressionTree::grow(&x, &g, &h, &all, &[0], &params());
        assert_eq!(tree.nodes[0], Node::Split { feature: 0, threshold: 4.5, left: 1, right: 2 });
        assert_eq!(tree.predict_row(&[2.0]), 1.0);
        assert_eq!(tree.predict_row(&[7.0]), 3.0);
        assert_eq!(tree.n_leaves(), 2);
    }

    #[test]
    fn constant_target_stays_a_leaf() {
        let rows: Vec<[f64; 2]> = (0..20).map(|i| [i as f64, (i % 3) as f64]).collect();
        let x = FeatureMatrix::from_rows(&rows).unwrap();
        let (g, h) = stats(&[5.0; 20]);
        let all: Vec<usize> = (0..20).collect();

        let tree = RegressionTree::grow(&x, &g, &h, &all, &[0, 1], &params());
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict_row(&[100.0, 0.0]), 5.0);
    }

    #[test]
    fn depth_limit_is_respected() {
        let rows: Vec<[f64; 1]> = (0..64).map(|i| [i as f64]).collect();
        let y: Vec<f64> = (0..64).map(|i| (i * i) as f64).collect();
        let x = FeatureMatrix::from_rows(&rows).unwrap();
        let (g, h) = stats(&y);
        let all: Vec<usize> = (0..64).collect();

        let mut p = params();
        p.max_depth = 2;
        let tree = RegressionTree::grow(&x, &g, &h, &all, &[0], &p);
        assert_eq!(tree.depth(), 2);
        assert!(tree.n_leaves() <= 4);
    }

    #[test]
    fn leaf_weight_is_shrunk_by_regularization_and_learning_rate() {
        let rows: Vec<[f64; 1]> = vec![[0.0]; 4];
        let x = FeatureMatrix::from_rows(&rows).unwrap();
        let (g, h) = stats(&[2.0; 4]);
        let mut p = params();
        p.l2_regularization = 4.0;
        p.learning_rate = 0.5;

        let tree = RegressionTree::grow(&x, &g, &h, &[0, 1, 2, 3], &[0], &p);
        // -G/(H+λ)·η = 8/8 · 0.5
        assert!((tree.predict_row(&[0.0]) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn unlisted_features_are_ignored() {
        let rows: Vec<[f64; 2]> = (0..10).map(|i| [i as f64, 0.0]).collect();
        let y: Vec<f64> = (0..10).map(|i| if i < 5 { 0.0 } else { 10.0 }).collect();
        let x = FeatureMatrix::from_rows(&rows).unwrap();
        let (g, h) = stats(&y);
        let all: Vec<usize> = (0..10).collect();

        let tree = RegressionTree::grow(&x, &g, &h, &all, &[1], &params());
        assert_eq!(tree.n_leaves(), 1);
    }
}
