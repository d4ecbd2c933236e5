//! Regression model families and the persisted model artifact

mod artifact;
mod forest;
mod linear;
mod tree;

pub use artifact::{
    compute_checksum, ModelArtifact, ModelSummary, ARTIFACT_FORMAT, ARTIFACT_FORMAT_VERSION,
};
pub use forest::{default_max_features, RandomForest};
pub use linear::LinearModel;
pub use tree::{DecisionTree, TreeNode, TreeParams};

use crate::error::{DepthError, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on forest size accepted from configuration
pub const MAX_TREES: usize = 1000;

/// Common interface of the fitted model families
pub trait Regressor {
    /// Raw prediction for one feature row in schema order
    fn predict_row(&self, row: &[f64]) -> f64;

    /// Number of features the model was fitted on
    fn n_features(&self) -> usize;

    /// Structural validation of deserialized parameters
    fn check(&self) -> std::result::Result<(), String>;
}

/// Which regression family to fit, with its hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    Linear {
        #[serde(default = "default_l2")]
        l2: f64,
    },
    DecisionTree {
        #[serde(default = "default_tree_depth")]
        max_depth: usize,
        #[serde(default = "default_min_samples_split")]
        min_samples_split: usize,
        #[serde(default = "default_min_samples_leaf")]
        min_samples_leaf: usize,
    },
    RandomForest {
        #[serde(default = "default_n_trees")]
        n_trees: usize,
        #[serde(default = "default_forest_depth")]
        max_depth: usize,
        #[serde(default = "default_forest_min_samples_leaf")]
        min_samples_leaf: usize,
        /// Features considered per split, a third of them when unset
        #[serde(default)]
        max_features: Option<usize>,
    },
}

fn default_l2() -> f64 {
    0.01
}

fn default_tree_depth() -> usize {
    8
}

fn default_min_samples_split() -> usize {
    4
}

fn default_min_samples_leaf() -> usize {
    2
}

fn default_n_trees() -> usize {
    50
}

fn default_forest_depth() -> usize {
    10
}

fn default_forest_min_samples_leaf() -> usize {
    1
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        AlgorithmConfig::linear()
    }
}

impl AlgorithmConfig {
    pub fn linear() -> Self {
        AlgorithmConfig::Linear { l2: default_l2() }
    }

    pub fn decision_tree() -> Self {
        AlgorithmConfig::DecisionTree {
            max_depth: default_tree_depth(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
        }
    }

    pub fn random_forest() -> Self {
        AlgorithmConfig::RandomForest {
            n_trees: default_n_trees(),
            max_depth: default_forest_depth(),
            min_samples_leaf: default_forest_min_samples_leaf(),
            max_features: None,
        }
    }

    /// Every family with default hyperparameters, for model comparison
    pub fn all_defaults() -> Vec<Self> {
        vec![Self::linear(), Self::decision_tree(), Self::random_forest()]
    }

    /// Look up a family by name with default hyperparameters
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "linear" => Some(Self::linear()),
            "decision_tree" | "tree" => Some(Self::decision_tree()),
            "random_forest" | "forest" => Some(Self::random_forest()),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmConfig::Linear { .. } => "linear",
            AlgorithmConfig::DecisionTree { .. } => "decision_tree",
            AlgorithmConfig::RandomForest { .. } => "random_forest",
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(DepthError::InvalidConfig(msg));
        match *self {
            AlgorithmConfig::Linear { l2 } => {
                if !l2.is_finite() || l2 < 0.0 {
                    return invalid(format!("l2 must be a non-negative number, got {}", l2));
                }
            }
            AlgorithmConfig::DecisionTree {
                max_depth,
                min_samples_split,
                min_samples_leaf,
            } => {
                if max_depth == 0 {
                    return invalid("max_depth must be at least 1".to_string());
                }
                if min_samples_split < 2 {
                    return invalid("min_samples_split must be at least 2".to_string());
                }
                if min_samples_leaf == 0 {
                    return invalid("min_samples_leaf must be at least 1".to_string());
                }
            }
            AlgorithmConfig::RandomForest {
                n_trees,
                max_depth,
                min_samples_leaf,
                max_features,
            } => {
                if n_trees == 0 || n_trees > MAX_TREES {
                    return invalid(format!("n_trees must be between 1 and {}", MAX_TREES));
                }
                if max_depth == 0 {
                    return invalid("max_depth must be at least 1".to_string());
                }
                if min_samples_leaf == 0 {
                    return invalid("min_samples_leaf must be at least 1".to_string());
                }
                if max_features == Some(0) {
                    return invalid("max_features must be at least 1".to_string());
                }
            }
        }
        Ok(())
    }

    /// Fit this family on `rows`; `seed` drives every random choice
    pub fn fit(&self, rows: &[&[f64]], labels: &[f64], seed: u64) -> Result<ModelParams> {
        self.validate()?;
        if rows.is_empty() {
            return Err(DepthError::EmptyDataset("training rows".to_string()));
        }
        let params = match *self {
            AlgorithmConfig::Linear { l2 } => {
                ModelParams::Linear(LinearModel::fit(rows, labels, l2)?)
            }
            AlgorithmConfig::DecisionTree {
                max_depth,
                min_samples_split,
                min_samples_leaf,
            } => {
                let params = TreeParams {
                    max_depth,
                    min_samples_split,
                    min_samples_leaf,
                    max_features: None,
                };
                let mut rng = StdRng::seed_from_u64(seed);
                let indices = (0..rows.len()).collect();
                let tree = DecisionTree::fit(rows, labels, indices, &params, &mut rng);
                debug!(depth = tree.depth(), leaves = tree.leaf_count(), "Fitted decision tree");
                ModelParams::DecisionTree(tree)
            }
            AlgorithmConfig::RandomForest {
                n_trees,
                max_depth,
                min_samples_leaf,
                max_features,
            } => {
                let params = TreeParams {
                    max_depth,
                    min_samples_split: (2 * min_samples_leaf).max(2),
                    min_samples_leaf,
                    max_features,
                };
                let forest = RandomForest::fit(rows, labels, n_trees, &params, seed);
                debug!(
                    trees = forest.trees.len(),
                    max_depth = forest.trees.iter().map(DecisionTree::depth).max().unwrap_or(0),
                    leaves = forest.trees.iter().map(DecisionTree::leaf_count).sum::<usize>(),
                    "Fitted random forest"
                );
                ModelParams::RandomForest(forest)
            }
        };
        Ok(params)
    }
}

/// Fitted parameters of one model family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelParams {
    Linear(LinearModel),
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
}

impl ModelParams {
    fn regressor(&self) -> &dyn Regressor {
        match self {
            ModelParams::Linear(m) => m,
            ModelParams::DecisionTree(m) => m,
            ModelParams::RandomForest(m) => m,
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            ModelParams::Linear(_) => "linear",
            ModelParams::DecisionTree(_) => "decision_tree",
            ModelParams::RandomForest(_) => "random_forest",
        }
    }
}

impl Regressor for ModelParams {
    fn predict_row(&self, row: &[f64]) -> f64 {
        self.regressor().predict_row(row)
    }

    fn n_features(&self) -> usize {
        self.regressor().n_features()
    }

    fn check(&self) -> std::result::Result<(), String> {
        self.regressor().check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde_uses_algorithm_tag() {
        let cfg: AlgorithmConfig =
            serde_json::from_str(r#"{"algorithm":"random_forest","n_trees":5}"#).unwrap();
        match cfg {
            AlgorithmConfig::RandomForest {
                n_trees, max_depth, ..
            } => {
                assert_eq!(n_trees, 5);
                assert_eq!(max_depth, default_forest_depth());
            }
            other => panic!("unexpected config {:?}", other),
        }

        let json = serde_json::to_value(AlgorithmConfig::linear()).unwrap();
        assert_eq!(json["algorithm"], "linear");
    }

    #[test]
    fn test_validation_rejects_bad_hyperparameters() {
        assert!(AlgorithmConfig::Linear { l2: -1.0 }.validate().is_err());
        assert!(AlgorithmConfig::Linear { l2: f64::NAN }.validate().is_err());
        let tree = AlgorithmConfig::DecisionTree {
            max_depth: 0,
            min_samples_split: 2,
            min_samples_leaf: 1,
        };
        assert_eq!(tree.validate().unwrap_err().kind(), "invalid_config");
        let forest = AlgorithmConfig::RandomForest {
            n_trees: 0,
            max_depth: 3,
            min_samples_leaf: 1,
            max_features: None,
        };
        assert!(forest.validate().is_err());
    }

    #[test]
    fn test_from_name() {
        assert_eq!(AlgorithmConfig::from_name("forest").unwrap().name(), "random_forest");
        assert!(AlgorithmConfig::from_name("svm").is_none());
    }

    #[test]
    fn test_every_family_fits_and_predicts() {
        let data: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let rows: Vec<&[f64]> = data.iter().map(Vec::as_slice).collect();
        let labels: Vec<f64> = data.iter().map(|r| r[0] / 4.0).collect();

        for cfg in AlgorithmConfig::all_defaults() {
            let params = cfg.fit(&rows, &labels, 1).unwrap();
            assert_eq!(params.family(), cfg.name());
            assert_eq!(params.n_features(), 2);
            assert!(params.check().is_ok());
            assert!(params.predict_row(&[20.0, 1.0]).is_finite());
        }
    }

    #[test]
    fn test_params_serde_round_trip_predicts_identically() {
        let data: Vec<Vec<f64>> = (0..25).map(|i| vec![(i * 3 % 7) as f64, i as f64]).collect();
        let rows: Vec<&[f64]> = data.iter().map(Vec::as_slice).collect();
        let labels: Vec<f64> = data.iter().map(|r| r[0] + r[1] / 3.0).collect();

        let params = AlgorithmConfig::random_forest().fit(&rows, &labels, 9).unwrap();
        let json = serde_json::to_string(&params).unwrap();
        let back: ModelParams = serde_json::from_str(&json).unwrap();
        for row in &rows {
            assert_eq!(params.predict_row(row), back.predict_row(row));
        }
    }
}
