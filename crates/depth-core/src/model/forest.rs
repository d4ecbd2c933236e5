//! Bagged ensemble of regression trees

use super::tree::{DecisionTree, TreeParams};
use super::Regressor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Each tree sees a bootstrap sample and a random feature subset per split
    pub fn fit(
        rows: &[&[f64]],
        labels: &[f64],
        n_trees: usize,
        params: &TreeParams,
        seed: u64,
    ) -> Self {
        let n = rows.len();
        let n_features = rows.first().map_or(0, |r| r.len());
        let params = TreeParams {
            max_features: Some(
                params
                    .max_features
                    .unwrap_or_else(|| default_max_features(n_features)),
            ),
            ..*params
        };

        let mut rng = StdRng::seed_from_u64(seed);
        let trees = (0..n_trees)
            .map(|_| {
                let sample: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                DecisionTree::fit(rows, labels, sample, &params, &mut rng)
            })
            .collect();

        Self { n_features, trees }
    }
}

/// One third of the features, at least one
pub fn default_max_features(n_features: usize) -> usize {
    (n_features / 3).max(1)
}

impl Regressor for RandomForest {
    fn predict_row(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / self.trees.len() as f64
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            if tree.n_features != self.n_features {
                return Err(format!("tree {} expects {} features", i, tree.n_features));
            }
            tree.check().map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }
}
