//! `rtl-depth extract`

use anyhow::{bail, Context, Result};
use depth_core::dataset::split_csv_row;
use depth_core::{Dataset, FeatureExtractor, FeatureVector, TrainingExample};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tabled::Tabled;

use super::read_rtl;
use crate::config::Settings;
use crate::output::{
    format_metric, print_json, print_success, print_table, print_warning, yes_no, OutputFormat,
};

#[derive(Tabled)]
struct FeatureRow {
    #[tabled(rename = "Feature")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct SignalRow {
    #[tabled(rename = "Signal")]
    signal: String,
    #[tabled(rename = "Width")]
    width: f64,
    #[tabled(rename = "Reg")]
    register: String,
    #[tabled(rename = "Fan-in")]
    fan_in: f64,
    #[tabled(rename = "Fan-out")]
    fan_out: f64,
    #[tabled(rename = "Cone")]
    cone_size: f64,
    #[tabled(rename = "Depth")]
    structural_depth: f64,
    #[tabled(rename = "Weighted")]
    weighted_depth: f64,
    #[tabled(rename = "Loop")]
    has_comb_loop: String,
}

pub fn run(
    settings: &Settings,
    rtl: &Path,
    signal: Option<&str>,
    labels: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let source = read_rtl(rtl)?;
    let extractor = FeatureExtractor::new();

    if let Some(signal) = signal {
        let features = extractor
            .extract(&source, signal)
            .with_context(|| format!("Failed to extract '{}' from {}", signal, rtl.display()))?;
        return match settings.format {
            OutputFormat::Json => print_json(&json!({
                "signal": signal,
                "schema_version": features.schema.version,
                "features": feature_map(&features),
            })),
            OutputFormat::Table => {
                let rows: Vec<FeatureRow> = features
                    .iter()
                    .map(|(name, value)| FeatureRow {
                        name: name.to_string(),
                        value: format_metric(value),
                    })
                    .collect();
                print_table(&rows);
                Ok(())
            }
        };
    }

    let all = extractor
        .extract_all(&source)
        .with_context(|| format!("Failed to extract features from {}", rtl.display()))?;

    if let Some(labels) = labels {
        let labels = read_labels(labels)?;
        let dataset = labeled_dataset(&extractor, rtl, &all, &labels)?;
        match output {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?;
                dataset
                    .write_csv(BufWriter::new(file))
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                print_success(&format!(
                    "Wrote {} labeled rows to {}",
                    dataset.len(),
                    path.display()
                ));
            }
            None => {
                let stdout = std::io::stdout();
                let mut lock = stdout.lock();
                dataset.write_csv(&mut lock)?;
                lock.flush()?;
            }
        }
        return Ok(());
    }

    match settings.format {
        OutputFormat::Json => {
            let signals: Map<String, Value> = all
                .iter()
                .map(|(name, features)| (name.clone(), Value::Object(feature_map(features))))
                .collect();
            print_json(&signals)
        }
        OutputFormat::Table => {
            let rows: Vec<SignalRow> = all.iter().map(|(name, f)| signal_row(name, f)).collect();
            print_table(&rows);
            Ok(())
        }
    }
}

fn feature_map(features: &FeatureVector) -> Map<String, Value> {
    features
        .iter()
        .map(|(name, value)| (name.to_string(), json!(value)))
        .collect()
}

fn signal_row(name: &str, f: &FeatureVector) -> SignalRow {
    let get = |feature: &str| f.get(feature).unwrap_or(0.0);
    SignalRow {
        signal: name.to_string(),
        width: get("bit_width"),
        register: yes_no(get("is_register") > 0.0),
        fan_in: get("fan_in"),
        fan_out: get("fan_out"),
        cone_size: get("cone_size"),
        structural_depth: get("structural_depth"),
        weighted_depth: get("weighted_depth"),
        has_comb_loop: yes_no(get("has_comb_loop") > 0.0),
    }
}

/// Pair extracted signals with their labels; unlabeled signals are left out
fn labeled_dataset(
    extractor: &FeatureExtractor,
    rtl: &Path,
    all: &[(String, FeatureVector)],
    labels: &BTreeMap<String, u32>,
) -> Result<Dataset> {
    let mut dataset = Dataset::empty(rtl.display().to_string(), extractor.schema().clone());
    for (name, features) in all {
        if let Some(depth) = labels.get(name) {
            dataset.push(TrainingExample {
                features: features.clone(),
                depth: *depth,
            })?;
        }
    }

    let unknown: Vec<&str> = labels
        .keys()
        .filter(|label| !all.iter().any(|(name, _)| name == *label))
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        print_warning(&format!(
            "Labels for signals not in the top module were ignored: {}",
            unknown.join(", ")
        ));
    }
    Ok(dataset)
}

/// Read `signal,depth` rows; a header row is allowed
fn read_labels(path: &Path) -> Result<BTreeMap<String, u32>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read labels {}", path.display()))?;

    let mut labels = BTreeMap::new();
    let mut first = true;
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let cells = split_csv_row(line)
            .map_err(|message| anyhow::anyhow!("{}:{}: {}", path.display(), idx + 1, message))?;
        if cells.len() != 2 {
            bail!("{}:{}: expected 'signal,depth'", path.display(), idx + 1);
        }
        let is_header = first && cells[1].parse::<u32>().is_err();
        first = false;
        if is_header {
            continue;
        }
        let depth = cells[1].parse::<u32>().with_context(|| {
            format!("{}:{}: invalid depth '{}'", path.display(), idx + 1, cells[1])
        })?;
        labels.insert(cells[0].to_string(), depth);
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_labels_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        std::fs::write(&path, "signal,depth\nsum,3\n# note\n\nq, 0\n").unwrap();

        let labels = read_labels(&path).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["sum"], 3);
        assert_eq!(labels["q"], 0);
    }

    #[test]
    fn test_read_labels_rejects_bad_depth() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        std::fs::write(&path, "sum,3\nq,deep\n").unwrap();

        let err = read_labels(&path).unwrap_err();
        assert!(format!("{:#}", err).contains(":2:"));
    }

    #[test]
    fn test_read_labels_rejects_quoted_signal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        std::fs::write(&path, "signal,depth\n\"u0.sum,carry\",3\n").unwrap();

        let err = format!("{:#}", read_labels(&path).unwrap_err());
        assert!(err.contains(":2:"));
        assert!(err.contains("quoted"));
    }
}
