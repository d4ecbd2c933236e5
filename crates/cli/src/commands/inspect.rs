//! `rtl-depth inspect`

use anyhow::{Context, Result};
use colored::Colorize;
use depth_core::ModelArtifact;

use super::train::metric_rows;
use crate::config::Settings;
use crate::output::{print_json, print_table, OutputFormat};

pub fn run(settings: &Settings) -> Result<()> {
    let artifact = ModelArtifact::load(&settings.model_path)
        .with_context(|| format!("Failed to load model from {}", settings.model_path.display()))?;
    let summary = artifact.summary();

    match settings.format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            println!("{}", "Model Artifact".bold());
            println!("{}", "=".repeat(60));
            println!("Path:        {}", settings.model_path.display().to_string().cyan());
            println!("Model ID:    {}", summary.model_id.cyan());
            println!("Algorithm:   {}", serde_json::to_string(&summary.algorithm)?);
            println!("Trained at:  {}", summary.trained_at.format("%Y-%m-%d %H:%M:%S UTC"));
            println!("Duration:    {} ms", summary.training_duration_ms);
            println!("Seed:        {}", summary.seed);
            println!(
                "Schema:      v{} ({} features)",
                summary.schema.version,
                summary.schema.len()
            );
            println!("Features:    {}", summary.schema.names.join(", "));
            println!();
            print_table(&metric_rows(&summary.metrics));
        }
    }
    Ok(())
}
