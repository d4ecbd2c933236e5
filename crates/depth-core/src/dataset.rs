//! Labeled training data
//!
//! A dataset is an ordered list of examples that all share one feature
//! schema. Datasets are loaded from CSV tables with a header row: one label
//! column holding the true depth and any number of numeric feature columns.

use crate::error::{DepthError, Result};
use crate::features::{FEATURE_NAMES, FEATURE_SCHEMA_VERSION};
use crate::models::{FeatureSchema, FeatureVector, TrainingExample};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Schema version given to tables whose columns are not the extractor's
pub const CUSTOM_SCHEMA_VERSION: u32 = 0;

/// How CSV columns map onto features and labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub label_column: String,
    /// Identity columns that are neither features nor labels
    pub ignore_columns: Vec<String>,
    /// Schema version to record; inferred from the column names when unset
    pub schema_version: Option<u32>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            label_column: "depth".to_string(),
            ignore_columns: vec!["file".to_string(), "signal".to_string(), "module".to_string()],
            schema_version: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    name: String,
    schema: Arc<FeatureSchema>,
    examples: Vec<TrainingExample>,
}

impl Dataset {
    pub fn new(
        name: impl Into<String>,
        schema: Arc<FeatureSchema>,
        examples: Vec<TrainingExample>,
    ) -> Result<Self> {
        let mut dataset = Self::empty(name, schema);
        for example in examples {
            dataset.push(example)?;
        }
        Ok(dataset)
    }

    pub fn empty(name: impl Into<String>, schema: Arc<FeatureSchema>) -> Self {
        Self {
            name: name.into(),
            schema,
            examples: Vec::new(),
        }
    }

    /// Append an example, rejecting rows whose schema differs
    pub fn push(&mut self, example: TrainingExample) -> Result<()> {
        let features = &example.features;
        if *features.schema != *self.schema || features.values.len() != self.schema.len() {
            return Err(DepthError::SchemaMismatch {
                expected: (*self.schema).clone(),
                actual: (*features.schema).clone(),
            });
        }
        self.examples.push(example);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub fn examples(&self) -> &[TrainingExample] {
        &self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Feature rows in example order
    pub fn rows(&self) -> Vec<&[f64]> {
        self.examples
            .iter()
            .map(|e| e.features.values.as_slice())
            .collect()
    }

    pub fn labels(&self) -> Vec<f64> {
        self.examples.iter().map(|e| e.depth as f64).collect()
    }

    pub fn from_csv(path: impl AsRef<Path>, config: &DatasetConfig) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| DepthError::io(path, e))?;
        let name = path.display().to_string();
        let dataset = Self::from_csv_reader(BufReader::new(file), &name, config)
            .map_err(|e| match e {
                DepthError::Io { source, .. } => DepthError::io(path, source),
                other => other,
            })?;
        debug!(
            path = %path.display(),
            rows = dataset.len(),
            features = dataset.schema.len(),
            "Loaded dataset"
        );
        Ok(dataset)
    }

    pub fn from_csv_reader(
        reader: impl BufRead,
        name: &str,
        config: &DatasetConfig,
    ) -> Result<Self> {
        let invalid = |line: usize, message: String| DepthError::InvalidDataset {
            source_name: name.to_string(),
            line,
            message,
        };

        let mut lines = reader
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line))
            .filter(|(_, line)| {
                line.as_ref()
                    .map(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
                    .unwrap_or(true)
            });

        let (header_line, header) = match lines.next() {
            Some((n, line)) => (n, line.map_err(|e| DepthError::io(name, e))?),
            None => {
                let schema = FeatureSchema::new(CUSTOM_SCHEMA_VERSION, Vec::new());
                return Ok(Self::empty(name, Arc::new(schema)));
            }
        };
        let columns: Vec<String> = split_csv_row(&header)
            .map_err(|message| invalid(header_line, message))?
            .into_iter()
            .map(str::to_string)
            .collect();

        for (i, column) in columns.iter().enumerate() {
            if column.is_empty() {
                return Err(invalid(header_line, format!("column {} has an empty name", i + 1)));
            }
            if columns[..i].contains(column) {
                return Err(invalid(header_line, format!("duplicate column '{}'", column)));
            }
        }
        let label_idx = columns
            .iter()
            .position(|c| *c == config.label_column)
            .ok_or_else(|| {
                invalid(
                    header_line,
                    format!("missing label column '{}'", config.label_column),
                )
            })?;
        let feature_idx: Vec<usize> = (0..columns.len())
            .filter(|i| *i != label_idx && !config.ignore_columns.contains(&columns[*i]))
            .collect();
        if feature_idx.is_empty() {
            return Err(invalid(header_line, "no feature columns".to_string()));
        }

        let names: Vec<String> = feature_idx.iter().map(|i| columns[*i].clone()).collect();
        let version = config.schema_version.unwrap_or_else(|| {
            if names.iter().map(String::as_str).eq(FEATURE_NAMES.iter().copied()) {
                FEATURE_SCHEMA_VERSION
            } else {
                CUSTOM_SCHEMA_VERSION
            }
        });
        let schema = Arc::new(FeatureSchema::new(version, names));
        let mut dataset = Self::empty(name, schema.clone());

        for (line_no, line) in lines {
            let line = line.map_err(|e| DepthError::io(name, e))?;
            let cells = split_csv_row(&line).map_err(|message| invalid(line_no, message))?;
            if cells.len() != columns.len() {
                return Err(DepthError::SchemaMismatch {
                    expected: FeatureSchema::new(version, columns.clone()),
                    actual: FeatureSchema::new(version, row_columns(&columns, cells.len())),
                });
            }

            let mut values = Vec::with_capacity(feature_idx.len());
            for &i in &feature_idx {
                let value: f64 = cells[i].parse().map_err(|_| {
                    let message = format!(
                        "column '{}': cannot parse '{}' as a number",
                        columns[i], cells[i]
                    );
                    invalid(line_no, message)
                })?;
                if !value.is_finite() {
                    let message = format!("column '{}': value is not finite", columns[i]);
                    return Err(invalid(line_no, message));
                }
                values.push(value);
            }

            let depth = parse_depth(cells[label_idx]).ok_or_else(|| {
                invalid(
                    line_no,
                    format!("label '{}' is not a non-negative integer", cells[label_idx]),
                )
            })?;
            dataset.examples.push(TrainingExample {
                features: FeatureVector::new(schema.clone(), values),
                depth,
            });
        }

        Ok(dataset)
    }

    /// Write features and labels as CSV, readable by [`Dataset::from_csv`]
    pub fn write_csv(&self, mut writer: impl Write) -> std::io::Result<()> {
        let mut header = self.schema.names.clone();
        header.push("depth".to_string());
        writeln!(writer, "{}", header.join(","))?;
        for example in &self.examples {
            let mut cells: Vec<String> =
                example.features.values.iter().map(|v| v.to_string()).collect();
            cells.push(example.depth.to_string());
            writeln!(writer, "{}", cells.join(","))?;
        }
        writer.flush()
    }

    /// Seeded shuffle split into (train, test)
    ///
    /// With two or more examples both halves are non-empty. A single
    /// example stays in the training half.
    pub fn split(&self, test_fraction: f64, seed: u64) -> (Dataset, Dataset) {
        let n = self.examples.len();
        let n_test = if n < 2 {
            0
        } else {
            ((n as f64 * test_fraction.clamp(0.0, 1.0)).round() as usize).clamp(1, n - 1)
        };

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
        let mut test_idx = indices[..n_test].to_vec();
        let mut train_idx = indices[n_test..].to_vec();
        test_idx.sort_unstable();
        train_idx.sort_unstable();

        let pick = |idx: &[usize], suffix: &str| Dataset {
            name: format!("{}#{}", self.name, suffix),
            schema: self.schema.clone(),
            examples: idx.iter().map(|i| self.examples[*i].clone()).collect(),
        };
        (pick(&train_idx, "train"), pick(&test_idx, "test"))
    }
}

/// Split one line of a plain comma separated table into trimmed cells
///
/// Quoting is not supported, so a cell containing `"` is rejected rather
/// than silently split at an embedded comma.
pub fn split_csv_row(line: &str) -> std::result::Result<Vec<&str>, String> {
    let cells: Vec<&str> = line.split(',').map(str::trim).collect();
    match cells.iter().position(|cell| cell.contains('"')) {
        Some(i) => Err(format!(
            "cell {} is quoted; quoted CSV cells are not supported",
            i + 1
        )),
        None => Ok(cells),
    }
}

fn row_columns(columns: &[String], len: usize) -> Vec<String> {
    (0..len)
        .map(|i| columns.get(i).cloned().unwrap_or_else(|| format!("column_{}", i + 1)))
        .collect()
}

fn parse_depth(cell: &str) -> Option<u32> {
    if let Ok(depth) = cell.parse::<u32>() {
        return Some(depth);
    }
    // Tools often emit integral floats such as "7.0"
    let value: f64 = cell.parse().ok()?;
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn load(text: &str) -> Result<Dataset> {
        Dataset::from_csv_reader(Cursor::new(text), "test.csv", &DatasetConfig::default())
    }

    #[test]
    fn test_loads_features_in_header_order() {
        let ds = load("signal,fan_in,cone_size,depth\nsum,2,0,3\n\ncarry,4,1,5.0\n").unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.schema().names, vec!["fan_in", "cone_size"]);
        assert_eq!(ds.schema().version, CUSTOM_SCHEMA_VERSION);
        assert_eq!(ds.examples()[1].features.values, vec![4.0, 1.0]);
        assert_eq!(ds.labels(), vec![3.0, 5.0]);
    }

    #[test]
    fn test_extractor_columns_get_extractor_version() {
        let header = format!("{},depth", FEATURE_NAMES.join(","));
        let row = format!("{},2", vec!["1"; FEATURE_NAMES.len()].join(","));
        let ds = load(&format!("{}\n{}\n", header, row)).unwrap();
        assert_eq!(ds.schema().version, FEATURE_SCHEMA_VERSION);
    }

    #[test]
    fn test_ragged_row_is_schema_mismatch() {
        let err = load("a,b,depth\n1,2,3\n1,2\n").unwrap_err();
        assert_eq!(err.kind(), "schema_mismatch");
    }

    #[test]
    fn test_bad_cell_reports_line() {
        match load("a,depth\n1,2\nx,3\n").unwrap_err() {
            DepthError::InvalidDataset { line, message, .. } => {
                assert_eq!(line, 3);
                assert!(message.contains("'a'"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_quoted_cell_rejected() {
        let text = "signal,width,depth\n\"top.a,b\",8,2\n";
        match load(text).unwrap_err() {
            DepthError::InvalidDataset { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("quoted"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(load("\"signal\",width,depth\n").is_err());
    }

    #[test]
    fn test_negative_or_fractional_label_rejected() {
        assert!(load("a,depth\n1,-1\n").is_err());
        assert!(load("a,depth\n1,2.5\n").is_err());
    }

    #[test]
    fn test_missing_label_column() {
        let err = load("a,b\n1,2\n").unwrap_err();
        assert!(err.to_string().contains("depth"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err =
            Dataset::from_csv("/nonexistent/data.csv", &DatasetConfig::default()).unwrap_err();
        assert_eq!(err.kind(), "io_error");
    }

    #[test]
    fn test_push_rejects_other_schema() {
        let schema = Arc::new(FeatureSchema::new(0, vec!["a".to_string()]));
        let other = Arc::new(FeatureSchema::new(0, vec!["b".to_string()]));
        let mut ds = Dataset::empty("d", schema);
        let err = ds
            .push(TrainingExample {
                features: FeatureVector::new(other, vec![1.0]),
                depth: 1,
            })
            .unwrap_err();
        assert_eq!(err.kind(), "schema_mismatch");
    }

    #[test]
    fn test_split_is_seeded_and_disjoint() {
        let text: String = std::iter::once("x,depth\n".to_string())
            .chain((0..20).map(|i| format!("{},{}\n", i, i)))
            .collect();
        let ds = load(&text).unwrap();
        let (train_a, test_a) = ds.split(0.25, 7);
        let (train_b, test_b) = ds.split(0.25, 7);
        assert_eq!(test_a, test_b);
        assert_eq!(train_a, train_b);
        assert_eq!(test_a.len(), 5);
        assert_eq!(train_a.len(), 15);
        for example in test_a.examples() {
            assert!(!train_a.examples().contains(example));
        }
    }

    #[test]
    fn test_split_keeps_one_test_row() {
        let ds = load("x,depth\n1,1\n2,2\n").unwrap();
        let (train, test) = ds.split(0.01, 1);
        assert_eq!((train.len(), test.len()), (1, 1));

        let single = load("x,depth\n1,1\n").unwrap();
        let (train, test) = single.split(0.5, 1);
        assert_eq!((train.len(), test.len()), (1, 0));
    }

    #[test]
    fn test_write_csv_reloads() {
        let ds = load("a,b,depth\n1.5,2,3\n4,5,6\n").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        ds.write_csv(std::fs::File::create(&path).unwrap()).unwrap();
        let reloaded = Dataset::from_csv(&path, &DatasetConfig::default()).unwrap();
        assert_eq!(reloaded.rows(), ds.rows());
        assert_eq!(reloaded.labels(), ds.labels());
    }
}
