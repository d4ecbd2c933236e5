//! CART regression tree with squared-error splits

use super::Regressor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Minimum squared-error reduction for a split to be kept
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        value: f64,
        samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Growth limits shared by single trees and forests
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered per split, all when `None`
    pub max_features: Option<usize>,
}

/// Nodes are stored in a flat arena; children always follow their parent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    pub n_features: usize,
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Grow a tree on the rows selected by `indices` (duplicates allowed)
    pub fn fit(
        rows: &[&[f64]],
        labels: &[f64],
        indices: Vec<usize>,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let n_features = rows.first().map_or(0, |r| r.len());
        let mut builder = Builder {
            rows,
            labels,
            params,
            rng,
            n_features,
            nodes: Vec::new(),
        };
        builder.grow(indices, 0);
        Self {
            n_features,
            nodes: builder.nodes,
        }
    }

    /// Longest root-to-leaf path counted in splits
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            if let Some(TreeNode::Split { left, right, .. }) = self.nodes.get(idx) {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            } else {
                deepest = deepest.max(depth);
            }
        }
        deepest
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }
}

impl Regressor for DecisionTree {
    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value, .. }) => return *value,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let x = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if x <= *threshold { *left } else { *right };
                }
                // Unreachable for checked trees
                None => return 0.0,
            }
        }
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Leaf { value, .. } if !value.is_finite() => {
                    return Err(format!("leaf {} value is not finite", idx));
                }
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= self.n_features {
                        return Err(format!("node {} splits on unknown feature {}", idx, feature));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {} threshold is not finite", idx));
                    }
                    // Forward-only links rule out cycles
                    let len = self.nodes.len();
                    if *left <= idx || *right <= idx || *left >= len || *right >= len {
                        return Err(format!("node {} has invalid children", idx));
                    }
                }
                TreeNode::Leaf { .. } => {}
            }
        }
        Ok(())
    }
}

struct Builder<'a, 'r> {
    rows: &'a [&'a [f64]],
    labels: &'a [f64],
    params: &'a TreeParams,
    rng: &'r mut StdRng,
    n_features: usize,
    nodes: Vec<TreeNode>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl Builder<'_, '_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let n = indices.len();
        let sum: f64 = indices.iter().map(|&i| self.labels[i]).sum();
        let value = if n == 0 { 0.0 } else { sum / n as f64 };
        let idx = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { value, samples: n });

        let pure = indices.iter().all(|&i| self.labels[i] == self.labels[indices[0]]);
        if depth >= self.params.max_depth || n < self.params.min_samples_split || pure {
            return idx;
        }

        let Some(best) = self.best_split(&indices) else {
            return idx;
        };
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.rows[i][best.feature] <= best.threshold);

        let left = self.grow(left_idx, depth + 1);
        let right = self.grow(right_idx, depth + 1);
        self.nodes[idx] = TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        idx
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        if let Some(k) = self.params.max_features {
            if k < self.n_features {
                features.shuffle(&mut *self.rng);
                features.truncate(k.max(1));
                features.sort_unstable();
            }
        }
        features
    }

    /// Sampled features first; the rest only when none of them can split
    fn best_split(&mut self, indices: &[usize]) -> Option<BestSplit> {
        let candidates = self.candidate_features();
        if let Some(best) = self.scan(indices, &candidates) {
            return Some(best);
        }
        let rest: Vec<usize> = (0..self.n_features)
            .filter(|f| !candidates.contains(f))
            .collect();
        self.scan(indices, &rest)
    }

    fn scan(&self, indices: &[usize], features: &[usize]) -> Option<BestSplit> {
        let n = indices.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total: f64 = indices.iter().map(|&i| self.labels[i]).sum();
        let parent_score = total * total / n as f64;

        let mut best: Option<BestSplit> = None;
        for &feature in features {
            let mut order = indices.to_vec();
            order.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));

            let mut left_sum = 0.0;
            for pos in 0..n - 1 {
                left_sum += self.labels[order[pos]];
                let left_n = pos + 1;
                let right_n = n - left_n;
                let here = self.rows[order[pos]][feature];
                let next = self.rows[order[pos + 1]][feature];
                if left_n < min_leaf || right_n < min_leaf || here == next {
                    continue;
                }
                let right_sum = total - left_sum;
                // Maximizing this is minimizing the children's squared error
                let score =
                    left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64;
                let gain = score - parent_score;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        gain,
                    });
                }
            }
        }
        best
    }
}
