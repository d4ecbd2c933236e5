//! Model training, held-out evaluation and model comparison
//!
//! The trainer only computes: it returns the fitted artifact together with
//! its metrics and diagnostics, and leaves persistence to the caller.

mod metrics;

pub use metrics::evaluate;

use crate::dataset::Dataset;
use crate::error::{DepthError, Result};
use crate::model::{AlgorithmConfig, ModelArtifact, Regressor};
use crate::models::{EvaluationSet, Metrics};
use crate::observability::{DepthMetrics, StructuredLogger};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Instant;
use tracing::debug;

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// Explicit training options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub model: AlgorithmConfig,
    /// Drives the train/test split and every random choice of the fit
    pub seed: u64,
    /// Share of rows held out when no test dataset is supplied
    pub test_fraction: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model: AlgorithmConfig::default(),
            seed: DEFAULT_SEED,
            test_fraction: DEFAULT_TEST_FRACTION,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(DepthError::InvalidConfig(format!(
                "test_fraction must be strictly between 0 and 1, got {}",
                self.test_fraction
            )));
        }
        self.model.validate()
    }
}

/// One test row as (true depth, predicted depth)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionPair {
    pub actual: f64,
    pub predicted: f64,
}

/// Structured data behind the test-set plots and tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingDiagnostics {
    pub predictions: Vec<PredictionPair>,
    pub duration_ms: u64,
    pub train_samples: usize,
    pub test_samples: usize,
    pub evaluated_on: EvaluationSet,
}

impl TrainingDiagnostics {
    /// Test-set predictions table with columns `actual,predicted,abs_error`
    pub fn write_predictions_csv(&self, mut writer: impl Write) -> std::io::Result<()> {
        writeln!(writer, "actual,predicted,abs_error")?;
        for pair in &self.predictions {
            writeln!(
                writer,
                "{},{},{}",
                pair.actual,
                pair.predicted,
                (pair.actual - pair.predicted).abs()
            )?;
        }
        writer.flush()
    }
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: ModelArtifact,
    pub metrics: Metrics,
    pub diagnostics: TrainingDiagnostics,
}

/// One row of a model comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub algorithm: AlgorithmConfig,
    pub model_id: String,
    pub metrics: Metrics,
    pub duration_ms: u64,
}

/// Families trained on one split, best first
#[derive(Debug, Clone)]
pub struct ComparisonReport {
    pub ranking: Vec<ComparisonEntry>,
    pub best: TrainingOutcome,
}

/// Rows the model is fitted on and rows it is scored on
struct Split {
    train: Dataset,
    test: Dataset,
    evaluated_on: EvaluationSet,
}

pub struct Trainer {
    config: TrainConfig,
    logger: StructuredLogger,
    metrics: DepthMetrics,
}

impl Trainer {
    pub fn new(config: TrainConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            logger: StructuredLogger::new("trainer"),
            metrics: DepthMetrics::new(),
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Fit the configured family and score it on held-out rows
    ///
    /// Without `test` the dataset is split with the configured seed and
    /// fraction. Test rows never reach the fit.
    pub fn train(&self, dataset: &Dataset, test: Option<&Dataset>) -> Result<TrainingOutcome> {
        let result = self
            .prepare(dataset, test)
            .and_then(|split| self.fit_on(&self.config.model, &split));
        match result {
            Ok(outcome) => {
                self.record(&outcome);
                Ok(outcome)
            }
            Err(e) => Err(self.fail("train", e)),
        }
    }

    /// Train every family in `algorithms` on the same split and rank them
    ///
    /// Ranked by test MAE, ties broken by RMSE and then listing order.
    pub fn compare(
        &self,
        dataset: &Dataset,
        test: Option<&Dataset>,
        algorithms: &[AlgorithmConfig],
    ) -> Result<ComparisonReport> {
        self.compare_inner(dataset, test, algorithms)
            .map_err(|e| self.fail("compare", e))
    }

    fn compare_inner(
        &self,
        dataset: &Dataset,
        test: Option<&Dataset>,
        algorithms: &[AlgorithmConfig],
    ) -> Result<ComparisonReport> {
        if algorithms.is_empty() {
            return Err(DepthError::InvalidConfig(
                "at least one algorithm is required for comparison".to_string(),
            ));
        }
        for algorithm in algorithms {
            algorithm.validate()?;
        }

        let split = self.prepare(dataset, test)?;
        let mut outcomes = algorithms
            .iter()
            .map(|algorithm| self.fit_on(algorithm, &split))
            .collect::<Result<Vec<_>>>()?;
        for outcome in &outcomes {
            self.record(outcome);
        }

        let mut order: Vec<usize> = (0..outcomes.len()).collect();
        order.sort_by(|&a, &b| {
            let (ma, mb) = (&outcomes[a].metrics, &outcomes[b].metrics);
            ma.mae
                .total_cmp(&mb.mae)
                .then(ma.rmse.total_cmp(&mb.rmse))
                .then(a.cmp(&b))
        });

        let ranking = order
            .iter()
            .map(|&i| {
                let outcome = &outcomes[i];
                ComparisonEntry {
                    algorithm: outcome.artifact.algorithm().clone(),
                    model_id: outcome.artifact.model_id().to_string(),
                    metrics: outcome.metrics.clone(),
                    duration_ms: outcome.diagnostics.duration_ms,
                }
            })
            .collect();
        let best = outcomes.swap_remove(order[0]);

        debug!(
            candidates = algorithms.len(),
            best = %best.artifact.algorithm().name(),
            mae = best.metrics.mae,
            "Model comparison finished"
        );
        Ok(ComparisonReport { ranking, best })
    }

    fn prepare(&self, dataset: &Dataset, test: Option<&Dataset>) -> Result<Split> {
        if dataset.is_empty() {
            return Err(DepthError::EmptyDataset(dataset.name().to_string()));
        }
        match test {
            Some(test) => {
                if test.schema() != dataset.schema() {
                    return Err(DepthError::SchemaMismatch {
                        expected: (**dataset.schema()).clone(),
                        actual: (**test.schema()).clone(),
                    });
                }
                if test.is_empty() {
                    return Err(DepthError::EmptyDataset(test.name().to_string()));
                }
                Ok(Split {
                    train: dataset.clone(),
                    test: test.clone(),
                    evaluated_on: EvaluationSet::HeldOut,
                })
            }
            None if dataset.len() < 2 => Ok(Split {
                train: dataset.clone(),
                test: dataset.clone(),
                evaluated_on: EvaluationSet::Training,
            }),
            None => {
                let (train, test) = dataset.split(self.config.test_fraction, self.config.seed);
                Ok(Split {
                    train,
                    test,
                    evaluated_on: EvaluationSet::HeldOut,
                })
            }
        }
    }

    fn fit_on(&self, algorithm: &AlgorithmConfig, split: &Split) -> Result<TrainingOutcome> {
        let started = Instant::now();
        let rows = split.train.rows();
        let labels = split.train.labels();
        let params = algorithm.fit(&rows, &labels, self.config.seed)?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let actual = split.test.labels();
        let predicted: Vec<f64> = split
            .test
            .rows()
            .iter()
            .map(|row| params.predict_row(row).max(0.0))
            .collect();
        let metrics = evaluate(&actual, &predicted, split.evaluated_on);

        let artifact = ModelArtifact::new(
            algorithm.clone(),
            split.train.schema().clone(),
            params,
            metrics.clone(),
            duration_ms,
            self.config.seed,
        );
        let diagnostics = TrainingDiagnostics {
            predictions: actual
                .iter()
                .zip(&predicted)
                .map(|(&actual, &predicted)| PredictionPair { actual, predicted })
                .collect(),
            duration_ms,
            train_samples: split.train.len(),
            test_samples: split.test.len(),
            evaluated_on: split.evaluated_on,
        };

        Ok(TrainingOutcome {
            artifact,
            metrics,
            diagnostics,
        })
    }

    fn record(&self, outcome: &TrainingOutcome) {
        let d = &outcome.diagnostics;
        self.metrics
            .observe_training_duration(d.duration_ms as f64 / 1000.0);
        self.logger.log_training_completed(
            outcome.artifact.model_id(),
            outcome.artifact.algorithm().name(),
            d.train_samples,
            d.test_samples,
            outcome.metrics.mae,
            outcome.metrics.rmse,
            outcome.metrics.r2,
            d.duration_ms,
        );
    }

    fn fail(&self, operation: &str, error: DepthError) -> DepthError {
        self.metrics.inc_errors(error.kind());
        self.logger
            .log_failure(operation, error.kind(), &error.to_string());
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureSchema, FeatureVector, TrainingExample};
    use std::sync::Arc;

    fn schema() -> Arc<FeatureSchema> {
        Arc::new(FeatureSchema::new(
            0,
            vec!["fan_in".to_string(), "noise".to_string()],
        ))
    }

    /// depth = 2 * fan_in + 3, with an unrelated second column
    fn linear_dataset(name: &str, xs: impl Iterator<Item = u32>) -> Dataset {
        let schema = schema();
        let examples = xs
            .map(|x| TrainingExample {
                features: FeatureVector::new(
                    schema.clone(),
                    vec![x as f64, ((x * 7) % 5) as f64],
                ),
                depth: 2 * x + 3,
            })
            .collect();
        Dataset::new(name, schema, examples).unwrap()
    }

    #[test]
    fn test_linear_relation_on_held_out_set() {
        let train = linear_dataset("train", 0..100);
        let test = linear_dataset("test", (0..40).map(|i| i * 3 + 1));
        let trainer = Trainer::new(TrainConfig::default()).unwrap();

        let outcome = trainer.train(&train, Some(&test)).unwrap();
        assert_eq!(outcome.metrics.evaluated_on, EvaluationSet::HeldOut);
        assert_eq!(outcome.metrics.samples, 40);
        assert!(outcome.metrics.mae < 0.25, "mae {}", outcome.metrics.mae);
        assert!(outcome.metrics.r2 > 0.99);
        assert_eq!(outcome.diagnostics.train_samples, 100);
        assert_eq!(outcome.diagnostics.predictions.len(), 40);
        assert_eq!(outcome.artifact.metrics(), &outcome.metrics);
    }

    #[test]
    fn test_internal_split_never_trains_on_test_rows() {
        let data = linear_dataset("all", 0..50);
        let trainer = Trainer::new(TrainConfig::default()).unwrap();

        let outcome = trainer.train(&data, None).unwrap();
        let d = &outcome.diagnostics;
        assert_eq!(d.test_samples, 10);
        assert_eq!(d.train_samples + d.test_samples, 50);
        assert_eq!(d.evaluated_on, EvaluationSet::HeldOut);
    }

    #[test]
    fn test_same_seed_same_model() {
        let data = linear_dataset("all", 0..60);
        let config = TrainConfig {
            model: AlgorithmConfig::random_forest(),
            ..TrainConfig::default()
        };
        let a = Trainer::new(config.clone()).unwrap().train(&data, None).unwrap();
        let b = Trainer::new(config).unwrap().train(&data, None).unwrap();
        assert_eq!(a.artifact.model_id(), b.artifact.model_id());
        assert_eq!(a.metrics, b.metrics);
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let data = Dataset::empty("empty", schema());
        let err = Trainer::new(TrainConfig::default())
            .unwrap()
            .train(&data, None)
            .unwrap_err();
        assert!(matches!(err, DepthError::EmptyDataset(name) if name == "empty"));
    }

    #[test]
    fn test_test_schema_must_match() {
        let train = linear_dataset("train", 0..10);
        let other = Arc::new(FeatureSchema::new(0, vec!["fan_in".to_string()]));
        let test = Dataset::new(
            "test",
            other.clone(),
            vec![TrainingExample {
                features: FeatureVector::new(other, vec![1.0]),
                depth: 5,
            }],
        )
        .unwrap();

        let err = Trainer::new(TrainConfig::default())
            .unwrap()
            .train(&train, Some(&test))
            .unwrap_err();
        assert_eq!(err.kind(), "schema_mismatch");
    }

    #[test]
    fn test_single_example_scores_on_training_rows() {
        let data = linear_dataset("one", 4..5);
        let outcome = Trainer::new(TrainConfig::default())
            .unwrap()
            .train(&data, None)
            .unwrap();
        assert_eq!(outcome.metrics.evaluated_on, EvaluationSet::Training);
        assert_eq!(outcome.metrics.samples, 1);
    }

    #[test]
    fn test_invalid_config() {
        let config = TrainConfig {
            test_fraction: 1.0,
            ..TrainConfig::default()
        };
        assert!(matches!(Trainer::new(config), Err(DepthError::InvalidConfig(_))));
    }

    #[test]
    fn test_compare_ranks_by_mae() {
        let data = linear_dataset("all", 0..80);
        let trainer = Trainer::new(TrainConfig::default()).unwrap();

        let report = trainer
            .compare(&data, None, &AlgorithmConfig::all_defaults())
            .unwrap();
        assert_eq!(report.ranking.len(), 3);
        for pair in report.ranking.windows(2) {
            assert!(pair[0].metrics.mae <= pair[1].metrics.mae);
        }
        assert_eq!(report.ranking[0].model_id, report.best.artifact.model_id());
        assert_eq!(report.best.artifact.algorithm().name(), "linear");
    }

    #[test]
    fn test_predictions_csv() {
        let diagnostics = TrainingDiagnostics {
            predictions: vec![
                PredictionPair {
                    actual: 4.0,
                    predicted: 3.5,
                },
                PredictionPair {
                    actual: 2.0,
                    predicted: 2.0,
                },
            ],
            duration_ms: 3,
            train_samples: 8,
            test_samples: 2,
            evaluated_on: EvaluationSet::HeldOut,
        };
        let mut out = Vec::new();
        diagnostics.write_predictions_csv(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "actual,predicted,abs_error\n4,3.5,0.5\n2,2,0\n"
        );
    }
}
