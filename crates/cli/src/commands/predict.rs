//! `rtl-depth predict`

use anyhow::{Context, Result};
use depth_core::{DepthPredictor, PredictionResult, SignalRef};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::read_rtl;
use crate::config::Settings;
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Serialize)]
struct SignalPrediction {
    #[serde(flatten)]
    target: SignalRef,
    #[serde(flatten)]
    result: PredictionResult,
}

#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "Signal")]
    signal: String,
    #[tabled(rename = "Depth")]
    depth: String,
    #[tabled(rename = "Rounded")]
    rounded: u32,
    #[tabled(rename = "95% Interval")]
    interval: String,
    #[tabled(rename = "Model")]
    model: String,
}

pub fn run(settings: &Settings, rtl: &Path, signals: &[String]) -> Result<()> {
    let predictor = DepthPredictor::load(&settings.model_path)
        .with_context(|| format!("Failed to load model from {}", settings.model_path.display()))?;
    let source = read_rtl(rtl)?;

    let predictions = signals
        .iter()
        .map(|signal| {
            predictor
                .predict_signal(&source, signal)
                .map(|result| SignalPrediction {
                    target: SignalRef::new(rtl.display().to_string(), signal.as_str()),
                    result,
                })
                .with_context(|| format!("Failed to predict '{}' in {}", signal, rtl.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    match settings.format {
        OutputFormat::Json => print_json(&predictions)?,
        OutputFormat::Table => {
            let rows: Vec<PredictionRow> = predictions
                .iter()
                .map(|p| PredictionRow {
                    signal: p.target.signal.clone(),
                    depth: format!("{:.2}", p.result.depth),
                    rounded: p.result.rounded_depth,
                    interval: p
                        .result
                        .interval
                        .map(|i| format!("[{:.2}, {:.2}]", i.lower, i.upper))
                        .unwrap_or_else(|| "-".to_string()),
                    model: p.result.model_id.clone(),
                })
                .collect();
            print_table(&rows);
        }
    }
    Ok(())
}
