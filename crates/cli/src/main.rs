//! RTL Depth Predictor CLI
//!
//! Trains depth models from feature tables, predicts combinational depth
//! for signals in RTL files and inspects model artifacts, all in-process.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{extract, inspect, predict, signals, train};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// RTL Depth Predictor CLI
#[derive(Parser)]
#[command(name = "rtl-depth")]
#[command(
    author,
    version,
    about = "Predict combinational logic depth of RTL signals",
    long_about = None
)]
pub struct Cli {
    /// Model artifact path (can also be set via RTL_DEPTH_MODEL_PATH env var)
    #[arg(long, global = true, env = "RTL_DEPTH_MODEL_PATH")]
    pub model_path: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a model on a feature table and save the artifact
    Train {
        /// Training table (can also be set via RTL_DEPTH_DATA_PATH env var)
        #[arg(long, env = "RTL_DEPTH_DATA_PATH")]
        data: Option<PathBuf>,

        /// Held-out table; the training table is split when omitted
        #[arg(long, env = "RTL_DEPTH_TEST_DATA_PATH")]
        test_data: Option<PathBuf>,

        /// Regression family (linear, decision_tree, random_forest)
        #[arg(long, short, default_value = "linear")]
        algorithm: String,

        /// Hyperparameters as a JSON object, e.g. '{"max_depth": 6}'
        #[arg(long)]
        params: Option<String>,

        /// Seed for the split and the fit
        #[arg(long, default_value_t = depth_core::trainer::DEFAULT_SEED)]
        seed: u64,

        /// Share of rows held out when no test table is given
        #[arg(long, default_value_t = depth_core::trainer::DEFAULT_TEST_FRACTION)]
        test_fraction: f64,

        /// Train every family and keep the one with the lowest test MAE
        #[arg(long)]
        compare: bool,

        /// Write the test-set predictions table to this CSV file
        #[arg(long)]
        predictions_out: Option<PathBuf>,
    },

    /// Predict the combinational depth of signals in an RTL file
    Predict {
        /// RTL source file
        rtl: PathBuf,

        /// Signal name, plain or hierarchical (u_core.sum); repeatable
        #[arg(long, short, required = true)]
        signal: Vec<String>,
    },

    /// Extract features for signals of an RTL file
    Extract {
        /// RTL source file
        rtl: PathBuf,

        /// Single signal to extract
        #[arg(long, short, conflicts_with = "all")]
        signal: Option<String>,

        /// Every signal of the top module
        #[arg(long, required_unless_present = "signal")]
        all: bool,

        /// CSV of `signal,depth` labels; turns the output into a training table
        #[arg(long, requires = "all")]
        labels: Option<PathBuf>,

        /// Write the training table here instead of stdout
        #[arg(long, short, requires = "labels")]
        output: Option<PathBuf>,
    },

    /// Show metadata and metrics of a model artifact
    Inspect,

    /// List the signals and instances of the top module
    Signals {
        /// RTL source file
        rtl: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = config::Settings::resolve(cli.model_path, cli.format)?;

    match cli.command {
        Commands::Train {
            data,
            test_data,
            algorithm,
            params,
            seed,
            test_fraction,
            compare,
            predictions_out,
        } => {
            let options = train::TrainOptions {
                data: settings.data_path(data),
                test_data: settings.test_data_path(test_data),
                algorithm,
                params,
                seed,
                test_fraction,
                compare,
                predictions_out,
            };
            train::run(&settings, options)?;
        }
        Commands::Predict { rtl, signal } => {
            predict::run(&settings, &rtl, &signal)?;
        }
        Commands::Extract {
            rtl,
            signal,
            all: _,
            labels,
            output,
        } => {
            extract::run(&settings, &rtl, signal.as_deref(), labels.as_deref(), output.as_deref())?;
        }
        Commands::Inspect => {
            inspect::run(&settings)?;
        }
        Commands::Signals { rtl } => {
            signals::run(&settings, &rtl)?;
        }
    }

    Ok(())
}
