//! CLI integration tests

use depth_core::FEATURE_NAMES;
use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};

const ADDER: &str = r#"
module adder(input [7:0] a, input [7:0] b, input sel, output [8:0] y);
  wire [8:0] sum = a + b;
  assign y = sel ? sum : 9'd0;
endmodule
"#;

/// Run the binary in `dir` with a private HOME and no inherited settings
fn rtl_depth(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rtl-depth"))
        .args(args)
        .current_dir(dir)
        .env("HOME", dir)
        .env("NO_COLOR", "1")
        .env_remove("RTL_DEPTH_MODEL_PATH")
        .env_remove("RTL_DEPTH_DATA_PATH")
        .env_remove("RTL_DEPTH_TEST_DATA_PATH")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute command")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn write_training_csv(path: &Path, rows: u32) {
    let depth_col = FEATURE_NAMES
        .iter()
        .position(|n| *n == "structural_depth")
        .unwrap();
    let mut text = format!("signal,{},depth\n", FEATURE_NAMES.join(","));
    for i in 0..rows {
        let depth = i % 6;
        let cells: Vec<String> = (0..FEATURE_NAMES.len())
            .map(|j| {
                if j == depth_col {
                    depth.to_string()
                } else {
                    ((i as usize + j) % 5).to_string()
                }
            })
            .collect();
        text.push_str(&format!("s{},{},{}\n", i, cells.join(","), depth));
    }
    std::fs::write(path, text).unwrap();
}

fn train(dir: &Path) -> Value {
    write_training_csv(&dir.join("train.csv"), 50);
    stdout_json(&rtl_depth(
        dir,
        &["train", "--data", "train.csv", "--model-path", "model.json", "--format", "json"],
    ))
}

#[test]
fn test_cli_help() {
    let dir = tempfile::tempdir().unwrap();
    let output = rtl_depth(dir.path(), &["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    for command in ["train", "predict", "extract", "inspect", "signals"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

#[test]
fn test_cli_version() {
    let dir = tempfile::tempdir().unwrap();
    let output = rtl_depth(dir.path(), &["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("rtl-depth"), "Should show binary name");
}

#[test]
fn test_train_predict_inspect() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("adder.v"), ADDER).unwrap();

    let trained = train(dir.path());
    assert_eq!(trained["algorithm"]["algorithm"], "linear");
    assert_eq!(trained["train_samples"], 40);
    assert_eq!(trained["test_samples"], 10);
    assert!(dir.path().join("model.json").exists());
    let model_id = trained["model_id"].as_str().unwrap().to_string();

    let predictions = stdout_json(&rtl_depth(
        dir.path(),
        &["predict", "adder.v", "-s", "y", "-s", "sum", "--model-path", "model.json", "-f", "json"],
    ));
    let predictions = predictions.as_array().unwrap();
    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0]["signal"], "y");
    assert_eq!(predictions[0]["file"], "adder.v");
    assert_eq!(predictions[0]["model_id"], model_id.as_str());
    assert!(predictions[1]["depth"].as_f64().unwrap() >= 0.0);

    let summary = stdout_json(&rtl_depth(
        dir.path(),
        &["inspect", "--model-path", "model.json", "--format", "json"],
    ));
    assert_eq!(summary["model_id"], model_id.as_str());
    assert_eq!(summary["schema"]["version"], 1);
}

#[test]
fn test_train_writes_predictions_table() {
    let dir = tempfile::tempdir().unwrap();
    write_training_csv(&dir.path().join("train.csv"), 30);

    let output = rtl_depth(
        dir.path(),
        &[
            "train",
            "--data",
            "train.csv",
            "--algorithm",
            "decision_tree",
            "--predictions-out",
            "preds.csv",
            "--model-path",
            "model.json",
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("decision_tree"));

    let preds = std::fs::read_to_string(dir.path().join("preds.csv")).unwrap();
    let mut lines = preds.lines();
    assert_eq!(lines.next(), Some("actual,predicted,abs_error"));
    assert_eq!(lines.count(), 6);
}

#[test]
fn test_train_with_params() {
    let dir = tempfile::tempdir().unwrap();
    write_training_csv(&dir.path().join("train.csv"), 30);

    let trained = stdout_json(&rtl_depth(
        dir.path(),
        &[
            "train",
            "--data",
            "train.csv",
            "--algorithm",
            "decision_tree",
            "--params",
            r#"{"max_depth": 3, "min_samples_leaf": 1}"#,
            "--model-path",
            "model.json",
            "--format",
            "json",
        ],
    ));
    assert_eq!(trained["algorithm"]["algorithm"], "decision_tree");
    assert_eq!(trained["algorithm"]["max_depth"], 3);
    assert_eq!(trained["algorithm"]["min_samples_leaf"], 1);

    let output = rtl_depth(
        dir.path(),
        &["train", "--data", "train.csv", "--params", r#"{"n_trees": 4}"#],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Unknown parameter 'n_trees'"), "{}", stderr);
}

#[test]
fn test_failed_predictions_write_keeps_model() {
    let dir = tempfile::tempdir().unwrap();
    write_training_csv(&dir.path().join("train.csv"), 30);
    std::fs::create_dir(dir.path().join("preds")).unwrap();

    let output = rtl_depth(
        dir.path(),
        &[
            "train",
            "--data",
            "train.csv",
            "--predictions-out",
            "preds",
            "--model-path",
            "model.json",
        ],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to create preds"));
    assert!(!dir.path().join("model.json").exists());
}

#[test]
fn test_unknown_algorithm_fails() {
    let dir = tempfile::tempdir().unwrap();
    write_training_csv(&dir.path().join("train.csv"), 10);

    let output = rtl_depth(
        dir.path(),
        &["train", "--data", "train.csv", "--algorithm", "svm"],
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown algorithm 'svm'"));
}

#[test]
fn test_extract_single_signal() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("adder.v"), ADDER).unwrap();

    let extracted = stdout_json(&rtl_depth(
        dir.path(),
        &["extract", "adder.v", "--signal", "sum", "--format", "json"],
    ));
    assert_eq!(extracted["signal"], "sum");
    assert_eq!(extracted["schema_version"], 1);
    let features = extracted["features"].as_object().unwrap();
    assert_eq!(features.len(), FEATURE_NAMES.len());
    assert_eq!(features["bit_width"], 9.0);
}

#[test]
fn test_extract_labeled_table() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("adder.v"), ADDER).unwrap();
    std::fs::write(dir.path().join("labels.csv"), "signal,depth\nsum,4\ny,5\n").unwrap();

    let output = rtl_depth(
        dir.path(),
        &["extract", "adder.v", "--all", "--labels", "labels.csv", "-o", "table.csv"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let table = std::fs::read_to_string(dir.path().join("table.csv")).unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], format!("{},depth", FEATURE_NAMES.join(",")));
    assert!(lines[1..].iter().any(|l| l.ends_with(",4")));
    assert!(lines[1..].iter().any(|l| l.ends_with(",5")));
}

#[test]
fn test_signals_lists_top_module() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("adder.v"), ADDER).unwrap();

    let listing = stdout_json(&rtl_depth(dir.path(), &["signals", "adder.v", "-f", "json"]));
    assert_eq!(listing["top"], "adder");
    assert_eq!(listing["modules"], serde_json::json!(["adder"]));
    let signals = listing["signals"].as_array().unwrap();
    let sum = signals.iter().find(|s| s["name"] == "sum").unwrap();
    assert_eq!(sum["width"], 9);
    assert_eq!(sum["direction"], "internal");
    assert_eq!(sum["drivers"], 1);
    let a = signals.iter().find(|s| s["name"] == "a").unwrap();
    assert_eq!(a["direction"], "input");
}

#[test]
fn test_predict_without_model_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("adder.v"), ADDER).unwrap();

    let output = rtl_depth(dir.path(), &["predict", "adder.v", "--signal", "y"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load model"));
}

#[test]
fn test_predict_unknown_signal_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("adder.v"), ADDER).unwrap();
    train(dir.path());

    let output = rtl_depth(
        dir.path(),
        &["predict", "adder.v", "--signal", "carry_out", "--model-path", "model.json"],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("carry_out"), "{}", stderr);
}
