//! `rtl-depth train`

use anyhow::{bail, Context, Result};
use colored::Colorize;
use depth_core::model::AlgorithmConfig;
use depth_core::trainer::ComparisonEntry;
use depth_core::{Dataset, DatasetConfig, Metrics, TrainConfig, Trainer};
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tabled::Tabled;

use crate::config::Settings;
use crate::output::{
    color_r2, format_metric, print_info, print_json, print_success, print_table, OutputFormat,
};

pub struct TrainOptions {
    pub data: PathBuf,
    pub test_data: Option<PathBuf>,
    pub algorithm: String,
    /// JSON object of hyperparameters overriding the algorithm defaults
    pub params: Option<String>,
    pub seed: u64,
    pub test_fraction: f64,
    pub compare: bool,
    pub predictions_out: Option<PathBuf>,
}

#[derive(Tabled)]
pub(crate) struct MetricRow {
    #[tabled(rename = "Metric")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct RankingRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Algorithm")]
    algorithm: String,
    #[tabled(rename = "MAE")]
    mae: String,
    #[tabled(rename = "RMSE")]
    rmse: String,
    #[tabled(rename = "R²")]
    r2: String,
    #[tabled(rename = "Model ID")]
    model_id: String,
}

pub fn run(settings: &Settings, options: TrainOptions) -> Result<()> {
    let model = algorithm_config(&options.algorithm, options.params.as_deref())?;
    let trainer = Trainer::new(TrainConfig {
        model,
        seed: options.seed,
        test_fraction: options.test_fraction,
    })?;

    let dataset_config = DatasetConfig::default();
    let dataset = Dataset::from_csv(&options.data, &dataset_config)?;
    let test = options
        .test_data
        .as_ref()
        .map(|path| Dataset::from_csv(path, &dataset_config))
        .transpose()?;

    let (outcome, ranking) = if options.compare {
        let report = trainer.compare(&dataset, test.as_ref(), &AlgorithmConfig::all_defaults())?;
        (report.best, Some(report.ranking))
    } else {
        (trainer.train(&dataset, test.as_ref())?, None)
    };

    // The artifact is written last so a failed run never replaces the model
    if let Some(path) = &options.predictions_out {
        let file = File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        outcome
            .diagnostics
            .write_predictions_csv(BufWriter::new(file))
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    outcome
        .artifact
        .save(&settings.model_path)
        .with_context(|| format!("Failed to save model to {}", settings.model_path.display()))?;

    let artifact = &outcome.artifact;
    match settings.format {
        OutputFormat::Json => print_json(&json!({
            "model_id": artifact.model_id(),
            "algorithm": artifact.algorithm(),
            "artifact_path": settings.model_path,
            "metrics": outcome.metrics,
            "train_samples": outcome.diagnostics.train_samples,
            "test_samples": outcome.diagnostics.test_samples,
            "duration_ms": outcome.diagnostics.duration_ms,
            "comparison": ranking,
        }))?,
        OutputFormat::Table => {
            print_success(&format!(
                "Trained {} model {} on {} rows ({} ms)",
                artifact.algorithm().name().cyan(),
                artifact.model_id().bold(),
                outcome.diagnostics.train_samples,
                outcome.diagnostics.duration_ms
            ));
            print_table(&metric_rows(&outcome.metrics));
            if let Some(ranking) = &ranking {
                println!("\n{}", "Model comparison".bold());
                print_table(&ranking_rows(ranking));
            }
            print_info(&format!("Saved model to {}", settings.model_path.display()));
            if let Some(path) = &options.predictions_out {
                print_info(&format!("Wrote test predictions to {}", path.display()));
            }
        }
    }
    Ok(())
}

/// Defaults of `name` with the `--params` object merged over them
fn algorithm_config(name: &str, params: Option<&str>) -> Result<AlgorithmConfig> {
    let model = AlgorithmConfig::from_name(name).with_context(|| {
        format!(
            "Unknown algorithm '{}' (expected linear, decision_tree or random_forest)",
            name
        )
    })?;
    let Some(params) = params else {
        return Ok(model);
    };

    let overrides: Map<String, Value> =
        serde_json::from_str(params).context("--params must be a JSON object")?;
    let Value::Object(mut fields) = serde_json::to_value(&model)? else {
        bail!("Algorithm '{}' has no hyperparameters", name);
    };
    for (key, value) in overrides {
        if key == "algorithm" || !fields.contains_key(&key) {
            bail!("Unknown parameter '{}' for algorithm '{}'", key, name);
        }
        fields.insert(key, value);
    }
    serde_json::from_value(Value::Object(fields))
        .with_context(|| format!("Invalid --params for algorithm '{}'", name))
}

pub(crate) fn metric_rows(metrics: &Metrics) -> Vec<MetricRow> {
    let evaluated_on = serde_json::to_value(metrics.evaluated_on)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    vec![
        MetricRow {
            name: "MAE",
            value: format_metric(metrics.mae),
        },
        MetricRow {
            name: "RMSE",
            value: format_metric(metrics.rmse),
        },
        MetricRow {
            name: "R²",
            value: color_r2(metrics.r2),
        },
        MetricRow {
            name: "Max error",
            value: format_metric(metrics.max_error),
        },
        MetricRow {
            name: "Samples",
            value: metrics.samples.to_string(),
        },
        MetricRow {
            name: "Evaluated on",
            value: evaluated_on,
        },
    ]
}

fn ranking_rows(ranking: &[ComparisonEntry]) -> Vec<RankingRow> {
    ranking
        .iter()
        .enumerate()
        .map(|(i, entry)| RankingRow {
            rank: i + 1,
            algorithm: entry.algorithm.name().to_string(),
            mae: format_metric(entry.metrics.mae),
            rmse: format_metric(entry.metrics.rmse),
            r2: color_r2(entry.metrics.r2),
            model_id: entry.model_id.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_override_defaults() {
        let config = algorithm_config("random_forest", Some(r#"{"n_trees": 5}"#)).unwrap();
        match config {
            AlgorithmConfig::RandomForest {
                n_trees, max_depth, ..
            } => {
                assert_eq!(n_trees, 5);
                assert_eq!(max_depth, 10);
            }
            other => panic!("unexpected config {:?}", other),
        }
        assert_eq!(
            algorithm_config("linear", None).unwrap(),
            AlgorithmConfig::from_name("linear").unwrap()
        );
    }

    #[test]
    fn test_params_reject_unknown_and_mistyped_fields() {
        let err = algorithm_config("linear", Some(r#"{"depth": 3}"#)).unwrap_err();
        assert!(err.to_string().contains("Unknown parameter 'depth'"));

        let err = algorithm_config("linear", Some(r#"{"algorithm": "random_forest"}"#));
        assert!(err.is_err());

        let err = algorithm_config("decision_tree", Some(r#"{"max_depth": "deep"}"#));
        assert!(format!("{:#}", err.unwrap_err()).contains("Invalid --params"));

        assert!(algorithm_config("linear", Some("[1, 2]")).is_err());
    }
}
